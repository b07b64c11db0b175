//! The chunked dataset store: maps a dataset's name to its ordered, immutable
//! chunks, whose serialized blobs live in a [`KVStore`].
//!
//! [`KVStore`]: ../kv/struct.KVStore.html
use crate::config::StoreConfig;
use crate::dataset::{
    encode_chunks, infer_schema, Chunk, Dataset, RawColumn, Schema,
};
use crate::error::LiquidError;
use crate::kv::{KVStore, Key};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Holds every registered [`Dataset`] and the chunks they are made of.
///
/// Chunks are never mutated once stored, so any number of map invocations
/// may read them concurrently. Each chunk is stored under the `Key`
/// `"<dataset>_<index>"` and is homed on execution unit `index % n_units`.
#[derive(Debug)]
pub struct DatasetStore {
    /// Metadata of every registered dataset, by name
    datasets: RwLock<HashMap<String, Arc<Dataset>>>,
    /// The encoded chunks of every dataset
    kv: KVStore<Chunk>,
    config: StoreConfig,
    /// The number of execution units chunks are spread across
    n_units: usize,
}

impl DatasetStore {
    /// Creates an empty store whose chunks will be spread across `n_units`
    /// execution units.
    pub fn new(config: StoreConfig, n_units: usize) -> Self {
        DatasetStore {
            datasets: RwLock::new(HashMap::new()),
            kv: KVStore::new(&config),
            config,
            n_units: n_units.max(1),
        }
    }

    /// Looks up the dataset registered under `name`.
    ///
    /// # Errors
    /// `LiquidError::NotFound` if no dataset is registered under `name`
    pub async fn resolve(&self, name: &str) -> Result<Arc<Dataset>, LiquidError> {
        self.datasets
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| LiquidError::NotFound(name.to_string()))
    }

    /// Whether a dataset is registered under `name`.
    pub async fn contains(&self, name: &str) -> bool {
        self.datasets.read().await.contains_key(name)
    }

    /// The number of chunks of the dataset registered under `name`.
    pub async fn chunk_count(&self, name: &str) -> Result<usize, LiquidError> {
        Ok(self.resolve(name).await?.chunk_count())
    }

    /// Fetches the chunk at `index` of `dataset`.
    ///
    /// # Errors
    /// `LiquidError::ChunkOutOfRange` if `index >= dataset.chunk_count()`
    pub async fn chunk_at(
        &self,
        dataset: &Dataset,
        index: usize,
    ) -> Result<Arc<Chunk>, LiquidError> {
        let key = dataset.chunk_key(index)?;
        self.chunk(key).await
    }

    /// Fetches the chunk stored under `key`.
    pub async fn chunk(&self, key: &Key) -> Result<Arc<Chunk>, LiquidError> {
        self.kv.get(key).await
    }

    /// The number of rows in `chunk`.
    pub fn row_count_of(chunk: &Chunk) -> usize {
        chunk.n_rows()
    }

    /// Finds the chunk holding global `row` of the dataset `name`, returning
    /// the chunk index and the row's offset within it.
    pub async fn locate(
        &self,
        name: &str,
        row: usize,
    ) -> Result<(usize, usize), LiquidError> {
        self.resolve(name).await?.locate(row)
    }

    /// Infers a schema for `columns`, encodes them into chunks and registers
    /// the result as a new dataset called `name`.
    ///
    /// # Errors
    /// `LiquidError::AlreadyExists` if a dataset called `name` exists
    pub async fn put_columns(
        &self,
        name: &str,
        columns: Vec<RawColumn>,
    ) -> Result<Arc<Dataset>, LiquidError> {
        if self.contains(name).await {
            return Err(LiquidError::AlreadyExists(name.to_string()));
        }
        let schema = infer_schema(&columns)?;
        let rows_per_chunk = self.config.rows_per_chunk(schema.row_width());
        let chunks = encode_chunks(&schema, &columns, rows_per_chunk)?;
        drop(columns);
        self.put_chunks(name, schema, chunks).await
    }

    /// Registers already encoded `chunks` laid out by `schema` as a new
    /// dataset called `name`. The chunks must be in index order and cover a
    /// contiguous row range starting at 0.
    pub async fn put_chunks(
        &self,
        name: &str,
        schema: Schema,
        chunks: Vec<Chunk>,
    ) -> Result<Arc<Dataset>, LiquidError> {
        let keys: Vec<Key> = chunks
            .iter()
            .map(|c| {
                let home = c.index() % self.n_units;
                Key::new(&format!("{}_{}", name, c.index()), home)
            })
            .collect();
        let dataset = Arc::new(Dataset::new(name, schema, &chunks, keys)?);

        // hold the write lock while storing so that concurrent puts of the
        // same name cannot both succeed
        let mut datasets = self.datasets.write().await;
        if datasets.contains_key(name) {
            return Err(LiquidError::AlreadyExists(name.to_string()));
        }
        for (key, chunk) in dataset.chunk_keys().iter().zip(chunks) {
            debug!("Storing chunk {} with {} rows", key, chunk.n_rows());
            self.kv.put(key.clone(), chunk).await?;
        }
        info!(
            "Registered dataset {:?} with {} rows in {} chunks",
            name,
            dataset.n_rows(),
            dataset.chunk_count()
        );
        datasets.insert(name.to_string(), dataset.clone());
        Ok(dataset)
    }

    /// Drops the dataset `name` and all of its chunks, returning its
    /// metadata if it existed.
    pub async fn remove(&self, name: &str) -> Option<Arc<Dataset>> {
        let dataset = self.datasets.write().await.remove(name)?;
        for key in dataset.chunk_keys() {
            self.kv.remove(key).await;
        }
        info!("Removed dataset {:?}", name);
        Some(dataset)
    }

    /// The number of execution units chunks are homed on.
    pub fn n_units(&self) -> usize {
        self.n_units
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(n_units: usize, rows_per_chunk: usize) -> DatasetStore {
        let config = StoreConfig {
            rows_per_chunk: Some(rows_per_chunk),
            max_cache_bytes: Some(1 << 24),
            ..Default::default()
        };
        DatasetStore::new(config, n_units)
    }

    fn column(n: usize) -> Vec<RawColumn> {
        let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
        vec![RawColumn::from_values(Some("x"), &xs)]
    }

    #[tokio::test]
    async fn test_put_and_resolve() {
        let store = store(3, 4);
        store.put_columns("xs", column(10)).await.unwrap();
        let ds = store.resolve("xs").await.unwrap();
        assert_eq!(ds.n_rows(), 10);
        assert_eq!(ds.chunk_count(), 3);
        assert_eq!(store.chunk_count("xs").await.unwrap(), 3);
        for (i, key) in ds.chunk_keys().iter().enumerate() {
            assert_eq!(key.name, format!("xs_{}", i));
            assert_eq!(key.home, i % 3);
        }
        let last = store.chunk_at(&ds, 2).await.unwrap();
        assert_eq!(DatasetStore::row_count_of(&last), 2);
        assert_eq!(last.start_row(), 8);
    }

    #[tokio::test]
    async fn test_unknown_dataset() {
        let store = store(1, 4);
        assert!(matches!(
            store.resolve("nope").await,
            Err(LiquidError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_chunk_at_out_of_range() {
        let store = store(2, 4);
        let ds = store.put_columns("xs", column(10)).await.unwrap();
        let count = ds.chunk_count();
        assert!(matches!(
            store.chunk_at(&ds, count).await,
            Err(LiquidError::ChunkOutOfRange { index, count: c, .. })
                if index == count && c == count
        ));
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected() {
        let store = store(2, 4);
        store.put_columns("xs", column(5)).await.unwrap();
        assert!(matches!(
            store.put_columns("xs", column(5)).await,
            Err(LiquidError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_locate_and_remove() {
        let store = store(2, 4);
        store.put_columns("xs", column(10)).await.unwrap();
        assert_eq!(store.locate("xs", 9).await.unwrap(), (2, 1));
        let ds = store.remove("xs").await.unwrap();
        assert!(!store.contains("xs").await);
        assert!(store.chunk(&ds.chunk_keys()[0]).await.is_err());
        assert!(store.remove("xs").await.is_none());
    }
}
