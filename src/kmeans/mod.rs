//! A distributed k-means client built on the `Executor`.
//!
//! Every iteration ships the current centroids to each chunk of a dataset
//! as a [`KMeansTask`]. Each chunk assigns its rows to their closest
//! centroid and returns per-cluster sums and counts ([`KMeansPartial`]),
//! which are reduced into one and turned into the next centroids.
//!
//! The [`KMeans`] driver moves through the states of [`KMeansState`]:
//! it starts `Initializing`, seeds the centroids from rows chosen by a
//! [`Seeder`], and then iterates until either the total error stops
//! changing by more than the configured threshold (`Converged`) or the
//! iteration budget runs out (`BudgetExhausted`).
use crate::dataset::decode_row;
use crate::error::LiquidError;
use crate::runtime::Runtime;
use log::{debug, info, warn};

mod seed;
pub use seed::{FixedRows, RandomRow, RandomRows, Seeder};

mod task;
pub use task::{closest, squared_distance, ClusterDist, KMeansPartial, KMeansTask};

/// Default iteration budget.
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Configuration options for k-means clustering.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansConfig {
    /// Number of clusters to find.
    pub k: usize,
    /// Maximum number of iterations.
    pub max_iterations: usize,
    /// When set, clustering stops once the total error changes by less than
    /// this between two consecutive iterations.
    pub threshold: Option<f64>,
    /// Initial value of centroids that are not seeded from a row. `None`
    /// means the zero vector.
    pub fallback: Option<Vec<f64>>,
    /// Seed for the default random row seeder.
    pub seed: Option<u64>,
}

impl KMeansConfig {
    /// Create a new config for `k` clusters that runs the full iteration
    /// budget.
    pub fn new(k: usize) -> Self {
        KMeansConfig {
            k,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            threshold: None,
            fallback: None,
            seed: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_fallback(mut self, fallback: Vec<f64>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn validate(&self, dim: usize) -> Result<(), LiquidError> {
        if self.k == 0 {
            return Err(LiquidError::InvalidParameter {
                name: "k",
                message: "at least one cluster is required".to_string(),
            });
        }
        if dim == 0 {
            return Err(LiquidError::InvalidParameter {
                name: "cols",
                message: "at least one column must be selected".to_string(),
            });
        }
        if self.max_iterations == 0 {
            return Err(LiquidError::InvalidParameter {
                name: "max_iterations",
                message: "the iteration budget must be at least 1".to_string(),
            });
        }
        if let Some(t) = self.threshold {
            // errors are compared with a strict `<`, so zero never converges
            if t.is_nan() || t <= 0.0 {
                return Err(LiquidError::InvalidParameter {
                    name: "threshold",
                    message: format!("{} is not a positive number", t),
                });
            }
        }
        match &self.fallback {
            Some(f) if f.len() != dim => Err(LiquidError::InvalidParameter {
                name: "fallback",
                message: format!(
                    "fallback has {} values but {} columns are selected",
                    f.len(),
                    dim
                ),
            }),
            _ => Ok(()),
        }
    }
}

/// Where a `KMeans` run is at. `cycle` counts completed iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KMeansState {
    Initializing,
    Iterating { cycle: usize },
    Converged { cycle: usize },
    BudgetExhausted { cycle: usize },
}

impl KMeansState {
    /// Whether no further iterations will run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            KMeansState::Converged { .. } | KMeansState::BudgetExhausted { .. }
        )
    }
}

/// The outcome of a k-means run.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    pub centroids: Vec<Vec<f64>>,
    /// The total error of every iteration, in order
    pub errors: Vec<f64>,
    pub state: KMeansState,
    /// Rows skipped in the last iteration because of missing values
    pub skipped: u64,
}

/// Drives k-means clustering of the `cols` of one dataset.
pub struct KMeans {
    dataset: String,
    cols: Vec<usize>,
    config: KMeansConfig,
    seeder: Box<dyn Seeder + Send>,
    centroids: Vec<Vec<f64>>,
    errors: Vec<f64>,
    skipped: u64,
    state: KMeansState,
}

impl KMeans {
    /// Creates a driver that clusters the columns `cols` of the dataset
    /// called `dataset`.
    ///
    /// # Errors
    /// `LiquidError::InvalidParameter` if `config` is invalid for `cols`
    pub fn new(
        dataset: &str,
        cols: Vec<usize>,
        config: KMeansConfig,
    ) -> Result<Self, LiquidError> {
        config.validate(cols.len())?;
        let seeder: Box<dyn Seeder + Send> = match config.seed {
            Some(seed) => Box::new(RandomRow::with_seed(seed)),
            None => Box::new(RandomRow::new()),
        };
        Ok(KMeans {
            dataset: dataset.to_string(),
            cols,
            config,
            seeder,
            centroids: Vec::new(),
            errors: Vec::new(),
            skipped: 0,
            state: KMeansState::Initializing,
        })
    }

    /// Replaces the strategy used to pick the seed rows.
    pub fn with_seeder<S: Seeder + Send + 'static>(mut self, seeder: S) -> Self {
        self.seeder = Box::new(seeder);
        self
    }

    pub fn state(&self) -> KMeansState {
        self.state
    }

    pub fn centroids(&self) -> &[Vec<f64>] {
        &self.centroids
    }

    /// The total error of every completed iteration.
    pub fn errors(&self) -> &[f64] {
        &self.errors
    }

    /// Runs a single iteration, seeding the centroids first if needed, and
    /// returns the new state. Does nothing once a terminal state is reached.
    ///
    /// # Errors
    /// Any failure of the underlying task; the run can not be resumed
    /// meaningfully afterwards.
    pub async fn step(
        &mut self,
        runtime: &Runtime,
    ) -> Result<KMeansState, LiquidError> {
        let cycle = match self.state {
            KMeansState::Initializing => {
                self.initialize(runtime).await?;
                0
            }
            KMeansState::Iterating { cycle } => cycle,
            terminal => return Ok(terminal),
        };

        let task = KMeansTask {
            cols: self.cols.clone(),
            centroids: self.centroids.clone(),
        };
        let partial = runtime.run(&self.dataset, task).await?;
        self.update(&partial);
        let cycle = cycle + 1;
        info!(
            "Iteration {} of {:?}: error {} ({} rows, {} skipped)",
            cycle,
            self.dataset,
            partial.error,
            partial.n_assigned(),
            partial.skipped
        );

        self.state = if self.converged() {
            KMeansState::Converged { cycle }
        } else if cycle >= self.config.max_iterations {
            KMeansState::BudgetExhausted { cycle }
        } else {
            KMeansState::Iterating { cycle }
        };
        Ok(self.state)
    }

    /// Iterates until a terminal state is reached.
    pub async fn run(
        &mut self,
        runtime: &Runtime,
    ) -> Result<KMeansResult, LiquidError> {
        while !self.state.is_terminal() {
            self.step(runtime).await?;
        }
        Ok(KMeansResult {
            centroids: self.centroids.clone(),
            errors: self.errors.clone(),
            state: self.state,
            skipped: self.skipped,
        })
    }

    async fn initialize(&mut self, runtime: &Runtime) -> Result<(), LiquidError> {
        let store = runtime.store();
        let dataset = store.resolve(&self.dataset).await?;
        if let Some(&col) = self.cols.iter().find(|&&c| c >= dataset.n_cols()) {
            return Err(LiquidError::InvalidParameter {
                name: "cols",
                message: format!(
                    "column {} does not exist in {:?}, which has {} columns",
                    col,
                    self.dataset,
                    dataset.n_cols()
                ),
            });
        }

        let fallback = self
            .config
            .fallback
            .clone()
            .unwrap_or_else(|| vec![0.0; self.cols.len()]);
        self.centroids = vec![fallback; self.config.k];
        let rows = self.seeder.seed_rows(dataset.n_rows(), self.config.k);
        for (centroid, row) in self.centroids.iter_mut().zip(rows) {
            let (chunk_idx, offset) = dataset.locate(row)?;
            let chunk = store.chunk_at(&dataset, chunk_idx).await?;
            let values = decode_row(&chunk, offset, &self.cols)?;
            if values.iter().any(|v| v.is_nan()) {
                warn!("Seed row {} has missing values, using the fallback", row);
                continue;
            }
            debug!("Seeded a centroid from row {}", row);
            *centroid = values;
        }
        Ok(())
    }

    /// Moves every centroid with assigned points to the mean of its points.
    fn update(&mut self, partial: &KMeansPartial) {
        let clusters = self.centroids.iter_mut().zip(&partial.sums);
        for ((centroid, sums), &count) in clusters.zip(&partial.counts) {
            if count == 0 {
                continue;
            }
            for (c, s) in centroid.iter_mut().zip(sums) {
                *c = s / count as f64;
            }
        }
        self.errors.push(partial.error);
        self.skipped = partial.skipped;
    }

    fn converged(&self) -> bool {
        match (self.config.threshold, self.errors.as_slice()) {
            (Some(t), [.., prev, last]) => (last - prev).abs() < t,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(KMeansConfig::new(0).validate(1).is_err());
        assert!(KMeansConfig::new(2).validate(0).is_err());
        assert!(KMeansConfig::new(2).with_max_iterations(0).validate(1).is_err());
        assert!(KMeansConfig::new(2).with_threshold(-1.0).validate(1).is_err());
        assert!(KMeansConfig::new(2).with_threshold(f64::NAN).validate(1).is_err());
        assert!(KMeansConfig::new(2).with_threshold(0.0).validate(1).is_err());
        assert!(KMeansConfig::new(2)
            .with_fallback(vec![0.0])
            .validate(2)
            .is_err());
        assert!(KMeansConfig::new(2)
            .with_fallback(vec![0.0, 1.0])
            .with_threshold(1e-12)
            .validate(2)
            .is_ok());
        assert!(KMeans::new("x", vec![], KMeansConfig::new(1)).is_err());
    }

    #[test]
    fn test_update_keeps_empty_clusters() {
        let mut km = KMeans::new("x", vec![0], KMeansConfig::new(2)).unwrap();
        km.centroids = vec![vec![3.0], vec![-7.0]];
        let mut partial = KMeansPartial::new(2, 1);
        partial.add(0, &[1.0], 4.0);
        partial.add(0, &[2.0], 1.0);
        km.update(&partial);
        assert_eq!(km.centroids, vec![vec![1.5], vec![-7.0]]);
        assert_eq!(km.errors(), &[5.0]);
    }

    #[test]
    fn test_converged() {
        let mut km = KMeans::new("x", vec![0], KMeansConfig::new(1).with_threshold(0.5))
            .unwrap();
        km.errors = vec![10.0];
        assert!(!km.converged());
        km.errors.push(9.0);
        assert!(!km.converged());
        km.errors.push(8.75);
        assert!(km.converged());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!KMeansState::Initializing.is_terminal());
        assert!(!KMeansState::Iterating { cycle: 3 }.is_terminal());
        assert!(KMeansState::Converged { cycle: 3 }.is_terminal());
        assert!(KMeansState::BudgetExhausted { cycle: 3 }.is_terminal());
    }
}
