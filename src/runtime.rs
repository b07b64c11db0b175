//! This module defines the highest level component of a `liquid_kmeans`
//! system.
use crate::config::LiquidConfig;
use crate::dataset::{read_csv, Dataset, RawColumn};
use crate::error::LiquidError;
use crate::executor::{Executor, Task, WorkerPool};
use crate::store::DatasetStore;
use std::path::Path;
use std::sync::Arc;

/// Represents a `liquid_kmeans` application: a [`DatasetStore`] holding
/// chunked datasets and an [`Executor`] that runs tasks over them on a pool
/// of execution units.
///
/// For most uses, nothing besides a `Runtime` and your own implementation of
/// a [`Task`] is needed.
///
/// [`DatasetStore`]: store/struct.DatasetStore.html
/// [`Executor`]: executor/struct.Executor.html
/// [`Task`]: executor/trait.Task.html
#[derive(Debug)]
pub struct Runtime {
    /// The store holding every dataset of this application
    store: Arc<DatasetStore>,
    executor: Executor,
}

impl Runtime {
    pub fn new(config: LiquidConfig) -> Self {
        let store = Arc::new(DatasetStore::new(
            config.store.clone(),
            config.executor.n_units,
        ));
        let executor = Executor::new(store.clone(), &config.executor);
        Runtime { store, executor }
    }

    /// Create a new dataset called `name` from the CSV file at `path`.
    pub async fn df_from_csv<P: AsRef<Path>>(
        &self,
        name: &str,
        path: P,
        has_headers: bool,
    ) -> Result<Arc<Dataset>, LiquidError> {
        let columns = read_csv(path, has_headers)?;
        self.store.put_columns(name, columns).await
    }

    /// Create a new dataset called `name` holding `columns`.
    pub async fn df_from_columns(
        &self,
        name: &str,
        columns: Vec<RawColumn>,
    ) -> Result<Arc<Dataset>, LiquidError> {
        self.store.put_columns(name, columns).await
    }

    /// Runs `task` over every chunk of the dataset `name`, returning the
    /// reduced result.
    pub async fn run<T: Task>(
        &self,
        name: &str,
        task: T,
    ) -> Result<T::Output, LiquidError> {
        self.executor.run(name, task).await
    }

    /// Drops the dataset `name` and its chunks.
    pub async fn remove(&self, name: &str) -> Option<Arc<Dataset>> {
        self.store.remove(name).await
    }

    pub fn store(&self) -> &Arc<DatasetStore> {
        &self.store
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        self.executor.pool()
    }
}
