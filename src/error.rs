//! The possible error types when storing, decoding, or running tasks over
//! chunked datasets.
use crate::kv::Key;
use thiserror::Error;

/// An enumeration of `liquid_kmeans` errors.
#[derive(Debug, Error)]
pub enum LiquidError {
    /// No dataset is registered under the given key
    #[error("no dataset named {0:?}")]
    NotFound(String),
    /// A dataset is already registered under the given key
    #[error("a dataset named {0:?} already exists")]
    AlreadyExists(String),
    /// No value is stored under the given `Key` in the `KVStore`
    #[error("no value stored under key {0}")]
    NotPresent(Key),
    /// A chunk index was requested that is `>= chunk_count`
    #[error(
        "chunk index {index} out of range for dataset {dataset:?} with \
         {count} chunks"
    )]
    ChunkOutOfRange {
        dataset: String,
        index: usize,
        count: usize,
    },
    /// A global row index was requested that is `>= n_rows`
    #[error(
        "row {row} out of range for dataset {dataset:?} with {count} rows"
    )]
    RowOutOfRange {
        dataset: String,
        row: usize,
        count: usize,
    },
    /// A chunk could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// A chunk invocation failed, carrying the identity of the chunk and
    /// the underlying cause
    #[error(
        "task failed on chunk {chunk} of dataset {dataset:?} after \
         {attempts} attempt(s): {source}"
    )]
    Task {
        dataset: String,
        chunk: usize,
        attempts: usize,
        #[source]
        source: Box<LiquidError>,
    },
    /// The execution unit with the given id is offline
    #[error("execution unit {0} is unavailable")]
    UnitUnavailable(usize),
    /// A worker thread panicked
    #[error("worker panicked while {0}")]
    Panicked(String),
    /// The invocation was skipped because a sibling invocation failed
    #[error("invocation cancelled after a sibling chunk failed")]
    Cancelled,
    /// The dataset has no rows to run over
    #[error("dataset {0:?} has no rows")]
    EmptyDataset(String),
    /// A column name is already in use in a `Schema`
    #[error("column name {0:?} already in use")]
    NameAlreadyExists(String),
    /// A caller-supplied parameter is invalid
    #[error("invalid parameter {name}: {message}")]
    InvalidParameter { name: &'static str, message: String },
    #[error("serialization failed: {0}")]
    Serialization(#[from] bincode::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("failed to initialize logging: {0}")]
    Logger(#[from] log::SetLoggerError),
}

impl LiquidError {
    /// Whether retrying the failed operation on a different execution unit
    /// could succeed. Only unit unavailability is transient; decode errors,
    /// missing data and user errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, LiquidError::UnitUnavailable(_))
    }
}

/// Errors produced while interpreting the binary layout of a `Chunk`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("row {row} out of bounds for chunk {chunk} with {rows} rows")]
    RowOutOfBounds {
        chunk: usize,
        row: usize,
        rows: usize,
    },
    #[error(
        "column {col} out of bounds for chunk {chunk} with {width} columns"
    )]
    ColOutOfBounds {
        chunk: usize,
        col: usize,
        width: usize,
    },
    #[error(
        "decoding a row of chunk {chunk} into {actual} values, expected \
         {expected}"
    )]
    WidthMismatch {
        chunk: usize,
        expected: usize,
        actual: usize,
    },
    #[error("chunk {chunk} holds {actual} bytes but its layout needs {expected}")]
    Truncated {
        chunk: usize,
        expected: usize,
        actual: usize,
    },
    #[error("column {col} of chunk {chunk} has an unsupported encoding: {reason}")]
    Unsupported {
        chunk: usize,
        col: usize,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unit_unavailable_is_transient() {
        assert!(LiquidError::UnitUnavailable(3).is_transient());
        assert!(!LiquidError::NotFound("x".to_string()).is_transient());
        let decode = LiquidError::from(DecodeError::RowOutOfBounds {
            chunk: 0,
            row: 9,
            rows: 2,
        });
        assert!(!decode.is_transient());
        let wrapped = LiquidError::Task {
            dataset: "x".to_string(),
            chunk: 1,
            attempts: 3,
            source: Box::new(LiquidError::UnitUnavailable(0)),
        };
        assert!(!wrapped.is_transient());
    }

    #[test]
    fn test_task_error_names_chunk_and_cause() {
        let err = LiquidError::Task {
            dataset: "points".to_string(),
            chunk: 4,
            attempts: 1,
            source: Box::new(LiquidError::Decode(DecodeError::ColOutOfBounds {
                chunk: 4,
                col: 7,
                width: 3,
            })),
        };
        let msg = err.to_string();
        assert!(msg.contains("chunk 4"));
        assert!(msg.contains("\"points\""));
        assert!(msg.contains("column 7"));
    }
}
