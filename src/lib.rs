//! # liquid_kmeans
//!
//! Chunk-parallel map/reduce over an in-memory store of chunked datasets,
//! and a k-means client built on top of it.
//!
//! Datasets are split horizontally into immutable [`Chunk`]s whose rows are
//! stored in a compact binary layout. A [`Task`] describes a computation
//! over a dataset: `map` produces a partial result for a single chunk and
//! `reduce` merges two partial results. The [`Executor`] runs `map` for every
//! chunk in parallel across a pool of execution units, retries invocations
//! that fail because a unit is unavailable, and folds the partial results
//! into one.
//!
//! ```no_run
//! use liquid_kmeans::config::LiquidConfig;
//! use liquid_kmeans::error::LiquidError;
//! use liquid_kmeans::kmeans::{KMeans, KMeansConfig};
//! use liquid_kmeans::runtime::Runtime;
//!
//! # async fn demo() -> Result<(), LiquidError> {
//! let runtime = Runtime::new(LiquidConfig::default());
//! runtime.df_from_csv("points", "points.csv", true).await?;
//! let mut kmeans = KMeans::new("points", vec![1, 2], KMeansConfig::new(3))?;
//! let result = kmeans.run(&runtime).await?;
//! println!("{:?}", result.centroids);
//! # Ok(())
//! # }
//! ```
//!
//! [`Chunk`]: dataset/struct.Chunk.html
//! [`Task`]: executor/trait.Task.html
//! [`Executor`]: executor/struct.Executor.html
pub mod config;
pub mod dataset;
pub mod error;
pub mod executor;
pub mod kmeans;
pub mod kv;
pub mod runtime;
pub mod store;
