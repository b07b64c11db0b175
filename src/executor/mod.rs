//! A module for running map/reduce tasks over the chunks of a dataset.
//!
//! A [`Task`] is both the request that is shipped to every chunk and the
//! code that runs there: `map` turns one chunk into a partial result and
//! `reduce` merges two partial results. The [`Executor`] serializes the
//! task once, runs `map` for every chunk of a dataset in parallel across the
//! units of a [`WorkerPool`], and folds the partial results into one.
//!
//! Each chunk is first sent to the unit its `Key` is homed on. If that unit
//! is unavailable the invocation is retried on the next unit, up to
//! `max_attempts` times in total. Any other failure fails the whole run
//! with a `LiquidError::Task` naming the chunk; the executor never returns
//! a result computed from a subset of the chunks.
use crate::config::ExecutorConfig;
use crate::dataset::{Chunk, Dataset};
use crate::error::LiquidError;
use crate::store::DatasetStore;
use bincode::{deserialize, serialize};
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, error, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod pool;
pub use pool::{ExecutionUnit, WorkerPool};

/// A computation over the chunks of a dataset.
///
/// The implementing type is the request: everything `map` needs besides the
/// chunk itself. It is serialized once per run and every chunk invocation
/// gets its own deserialized copy, so `map` can never observe state shared
/// with another invocation. Only the `Output` of `map` travels back.
///
/// `reduce` must be associative and commutative in its numeric effect; the
/// order in which partial results are merged is not part of the contract.
pub trait Task: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The partial result produced for a chunk
    type Output: Serialize + DeserializeOwned + Send + 'static;

    /// Computes the partial result for a single chunk. Only the rows of
    /// `chunk` are visible.
    fn map(&self, chunk: &Chunk) -> Result<Self::Output, LiquidError>;

    /// Merges two partial results into one.
    fn reduce(&self, a: Self::Output, b: Self::Output) -> Self::Output;
}

/// Runs `Task`s over datasets held in a `DatasetStore`.
#[derive(Debug, Clone)]
pub struct Executor {
    store: Arc<DatasetStore>,
    pool: Arc<WorkerPool>,
    max_attempts: usize,
}

impl Executor {
    pub fn new(store: Arc<DatasetStore>, config: &ExecutorConfig) -> Self {
        Executor {
            store,
            pool: Arc::new(WorkerPool::new(config)),
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// The execution units of this `Executor`.
    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Runs `task` over every chunk of the dataset `name` and returns the
    /// reduction of all the partial results.
    ///
    /// Partial results are folded as a balanced tree in chunk order, so for
    /// a given chunk count the order of `reduce` calls never depends on the
    /// order in which chunks finished.
    ///
    /// # Errors
    /// - `LiquidError::NotFound` if no dataset is called `name`
    /// - `LiquidError::EmptyDataset` if the dataset has no chunks
    /// - `LiquidError::Task` for the first chunk whose invocation failed
    pub async fn run<T: Task>(
        &self,
        name: &str,
        task: T,
    ) -> Result<T::Output, LiquidError> {
        let dataset = self.store.resolve(name).await?;
        let n_chunks = dataset.chunk_count();
        if n_chunks == 0 {
            return Err(LiquidError::EmptyDataset(name.to_string()));
        }
        let request = Arc::new(serialize(&task)?);
        debug!(
            "Running task over {} chunks of {:?} ({} byte request)",
            n_chunks,
            name,
            request.len()
        );

        let token = CancellationToken::new();
        let mut invocations = FuturesUnordered::new();
        for index in 0..n_chunks {
            let invocation = Invocation {
                store: self.store.clone(),
                pool: self.pool.clone(),
                dataset: dataset.clone(),
                index,
                request: request.clone(),
                token: token.clone(),
                max_attempts: self.max_attempts,
            };
            invocations.push(tokio::spawn(invocation.run::<T>()));
        }

        let mut partials: Vec<Option<T::Output>> =
            (0..n_chunks).map(|_| None).collect();
        let mut failure: Option<LiquidError> = None;
        while let Some(joined) = invocations.next().await {
            let result = joined.unwrap_or_else(|e| {
                Err(LiquidError::Panicked(format!("running a chunk: {}", e)))
            });
            if failure.is_some() {
                // drain the remaining invocations, discarding their results
                continue;
            }
            let partial = result.and_then(|(index, blob)| {
                Ok((index, deserialize::<T::Output>(&blob[..])?))
            });
            match partial {
                Ok((index, partial)) => partials[index] = Some(partial),
                Err(e) => {
                    error!("Task over {:?} failed: {}", name, e);
                    token.cancel();
                    failure = Some(e);
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        let partials = partials
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                LiquidError::Panicked("collecting partial results".to_string())
            })?;
        tree_reduce(&task, partials).ok_or_else(|| {
            LiquidError::EmptyDataset(name.to_string())
        })
    }
}

/// Everything needed to run `map` for a single chunk, owned so it can be
/// spawned.
struct Invocation {
    store: Arc<DatasetStore>,
    pool: Arc<WorkerPool>,
    dataset: Arc<Dataset>,
    index: usize,
    request: Arc<Vec<u8>>,
    token: CancellationToken,
    max_attempts: usize,
}

impl Invocation {
    /// Runs the chunk's invocation, retrying transient failures on the next
    /// unit. Returns the chunk index with the serialized output.
    async fn run<T: Task>(self) -> Result<(usize, Vec<u8>), LiquidError> {
        let key = self.dataset.chunk_key(self.index)?;
        let mut unit = key.home % self.pool.len();
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.attempt::<T>(unit).await {
                Ok(blob) => return Ok((self.index, blob)),
                Err(e) if e.is_transient() && attempts < self.max_attempts => {
                    let next = (unit + 1) % self.pool.len();
                    warn!(
                        "Chunk {} of {:?} failed on unit {} ({}), retrying on \
                         unit {}",
                        self.index,
                        self.dataset.name(),
                        unit,
                        e,
                        next
                    );
                    unit = next;
                }
                Err(e) => {
                    return Err(LiquidError::Task {
                        dataset: self.dataset.name().to_string(),
                        chunk: self.index,
                        attempts,
                        source: Box::new(e),
                    })
                }
            }
        }
    }

    async fn attempt<T: Task>(&self, unit_id: usize) -> Result<Vec<u8>, LiquidError> {
        if self.token.is_cancelled() {
            return Err(LiquidError::Cancelled);
        }
        let unit = self
            .pool
            .unit(unit_id)
            .ok_or(LiquidError::UnitUnavailable(unit_id))?;
        let _permit = unit.acquire().await?;
        if self.token.is_cancelled() {
            return Err(LiquidError::Cancelled);
        }
        let chunk = self.store.chunk_at(&self.dataset, self.index).await?;
        unit.record_invocation();
        debug!(
            "Mapping chunk {} ({} rows) on unit {}",
            self.index,
            chunk.n_rows(),
            unit_id
        );

        let request = self.request.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<u8>, LiquidError> {
            let task: T = deserialize(&request[..])?;
            let output = task.map(&chunk)?;
            Ok(serialize(&output)?)
        })
        .await
        .map_err(|e| LiquidError::Panicked(format!("mapping a chunk: {}", e)))?
    }
}

/// Folds `partials` pairwise, neighbour with neighbour, until one remains.
/// Returns `None` if `partials` is empty.
fn tree_reduce<T: Task>(task: &T, mut partials: Vec<T::Output>) -> Option<T::Output> {
    while partials.len() > 1 {
        let mut next = Vec::with_capacity((partials.len() + 1) / 2);
        let mut iter = partials.into_iter();
        while let Some(a) = iter.next() {
            match iter.next() {
                Some(b) => next.push(task.reduce(a, b)),
                None => next.push(a),
            }
        }
        partials = next;
    }
    partials.pop()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    /// Records the order in which partial results were merged.
    #[derive(Serialize, Deserialize)]
    struct Trace;

    impl Task for Trace {
        type Output = String;

        fn map(&self, chunk: &Chunk) -> Result<String, LiquidError> {
            Ok(chunk.index().to_string())
        }

        fn reduce(&self, a: String, b: String) -> String {
            format!("({} {})", a, b)
        }
    }

    #[test]
    fn test_tree_reduce_shape() {
        let parts = |n: usize| (0..n).map(|i| i.to_string()).collect::<Vec<_>>();
        assert_eq!(tree_reduce(&Trace, parts(0)), None);
        assert_eq!(tree_reduce(&Trace, parts(1)).unwrap(), "0");
        assert_eq!(tree_reduce(&Trace, parts(4)).unwrap(), "((0 1) (2 3))");
        assert_eq!(tree_reduce(&Trace, parts(5)).unwrap(), "(((0 1) (2 3)) 4)");
    }
}
