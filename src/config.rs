//! Configuration for the `DatasetStore` and the `Executor`. Every struct
//! has sensible defaults; the `kmeans` binary fills them in from command
//! line options.

/// Default target size of a single chunk, 4 MiB.
pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 4 * 1024 * 1024;
/// Default number of deserialized chunks kept in the `KVStore` cache.
pub const DEFAULT_MAX_CACHED_VALUES: usize = 64;
/// Default number of attempts for a chunk invocation that fails
/// transiently.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Configuration of the chunked dataset store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Target size in bytes of a chunk. The number of rows per chunk is
    /// derived from this and the row width of the dataset.
    pub chunk_size_bytes: usize,
    /// When `Some`, overrides `chunk_size_bytes` with an exact number of
    /// rows per chunk.
    pub rows_per_chunk: Option<usize>,
    /// Maximum number of deserialized chunks held in the cache.
    pub max_cached_values: usize,
    /// Maximum total deep size of cached chunks, in bytes. `None` means a
    /// third of this machine's memory.
    pub max_cache_bytes: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            rows_per_chunk: None,
            max_cached_values: DEFAULT_MAX_CACHED_VALUES,
            max_cache_bytes: None,
        }
    }
}

impl StoreConfig {
    /// The number of rows to put in each chunk of a dataset whose rows are
    /// `row_width` bytes wide. Always at least 1.
    pub fn rows_per_chunk(&self, row_width: usize) -> usize {
        match self.rows_per_chunk {
            Some(rows) => rows.max(1),
            None if row_width == 0 => 1,
            None => (self.chunk_size_bytes / row_width).max(1),
        }
    }
}

/// Configuration of the distributed task executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Number of execution units. Chunks are homed on units round-robin.
    pub n_units: usize,
    /// Number of chunk invocations a single unit runs concurrently.
    pub slots_per_unit: usize,
    /// Total attempts for a chunk invocation that fails transiently.
    pub max_attempts: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            n_units: num_cpus::get(),
            slots_per_unit: 1,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Top level configuration of a `Runtime`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiquidConfig {
    pub store: StoreConfig,
    pub executor: ExecutorConfig,
}

impl LiquidConfig {
    /// A configuration with `n_units` execution units and an explicit number
    /// of rows per chunk. Mostly useful for tests and small data sets.
    pub fn with_units(n_units: usize, rows_per_chunk: usize) -> Self {
        LiquidConfig {
            store: StoreConfig {
                rows_per_chunk: Some(rows_per_chunk),
                ..Default::default()
            },
            executor: ExecutorConfig {
                n_units,
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_per_chunk() {
        let mut config = StoreConfig::default();
        assert_eq!(config.rows_per_chunk(8), DEFAULT_CHUNK_SIZE_BYTES / 8);
        assert_eq!(config.rows_per_chunk(0), 1);
        config.chunk_size_bytes = 3;
        assert_eq!(config.rows_per_chunk(8), 1);
        config.rows_per_chunk = Some(0);
        assert_eq!(config.rows_per_chunk(8), 1);
        config.rows_per_chunk = Some(17);
        assert_eq!(config.rows_per_chunk(8), 17);
    }
}
