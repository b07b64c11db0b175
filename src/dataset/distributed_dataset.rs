//! Defines functionality for a `Dataset`: the metadata that ties a key to
//! the ordered chunks holding its rows.
use crate::dataset::{Chunk, Schema};
use crate::error::LiquidError;
use crate::kv::Key;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A dataset whose rows are split across chunks stored in a `KVStore`. A
/// `Dataset` only holds the `Key`s of its chunks and the first row index of
/// each one; the chunks themselves are fetched from the `DatasetStore`.
///
/// The chunks' row ranges are contiguous, in index order, and exactly cover
/// `0..n_rows`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Dataset {
    /// The key this dataset is registered under
    name: String,
    /// The layout shared by every chunk of this dataset
    schema: Schema,
    /// Total number of rows
    n_rows: usize,
    /// The key of each chunk, in chunk index order
    chunks: Vec<Key>,
    /// The global index of the first row of each chunk
    starts: Vec<usize>,
}

impl Dataset {
    /// Creates the metadata for a dataset made of `chunks`, whose blobs are
    /// stored under the matching `keys`.
    ///
    /// # Errors
    /// If the chunks don't exactly cover a contiguous row range starting
    /// at `0`, in order, or the number of keys doesn't match.
    pub(crate) fn new(
        name: &str,
        schema: Schema,
        chunks: &[Chunk],
        keys: Vec<Key>,
    ) -> Result<Self, LiquidError> {
        if keys.len() != chunks.len() {
            return Err(LiquidError::InvalidParameter {
                name: "keys",
                message: format!(
                    "{} keys for {} chunks",
                    keys.len(),
                    chunks.len()
                ),
            });
        }
        let mut starts = Vec::with_capacity(chunks.len());
        let mut next = 0;
        for (idx, chunk) in chunks.iter().enumerate() {
            if chunk.index() != idx || chunk.start_row() != next {
                return Err(LiquidError::InvalidParameter {
                    name: "chunks",
                    message: format!(
                        "chunk {} starts at row {} but row {} was expected \
                         at index {}",
                        chunk.index(),
                        chunk.start_row(),
                        next,
                        idx
                    ),
                });
            }
            if chunk.schema() != &schema {
                return Err(LiquidError::InvalidParameter {
                    name: "chunks",
                    message: format!(
                        "chunk {} has a different layout than the dataset",
                        idx
                    ),
                });
            }
            starts.push(next);
            next += chunk.n_rows();
        }
        Ok(Dataset {
            name: name.to_string(),
            schema,
            n_rows: next,
            chunks: keys,
            starts,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Obtains a reference to this `Dataset`s schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Return the number of rows in this `Dataset`.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Return the number of columns in this `Dataset`.
    pub fn n_cols(&self) -> usize {
        self.schema.width()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// The keys of every chunk, in chunk index order.
    pub fn chunk_keys(&self) -> &[Key] {
        &self.chunks
    }

    /// The `Key` of the chunk at `index`.
    ///
    /// # Errors
    /// `LiquidError::ChunkOutOfRange` if `index >= chunk_count()`
    pub fn chunk_key(&self, index: usize) -> Result<&Key, LiquidError> {
        self.chunks
            .get(index)
            .ok_or_else(|| LiquidError::ChunkOutOfRange {
                dataset: self.name.clone(),
                index,
                count: self.chunks.len(),
            })
    }

    /// The global row indices held by the chunk at `index`.
    pub fn chunk_rows(&self, index: usize) -> Result<Range<usize>, LiquidError> {
        self.chunk_key(index)?;
        let start = self.starts[index];
        let end = self.starts.get(index + 1).copied().unwrap_or(self.n_rows);
        Ok(start..end)
    }

    /// Finds the chunk holding the global `row`, returning the chunk's index
    /// and the row's offset within that chunk.
    pub fn locate(&self, row: usize) -> Result<(usize, usize), LiquidError> {
        if row >= self.n_rows {
            return Err(LiquidError::RowOutOfRange {
                dataset: self.name.clone(),
                row,
                count: self.n_rows,
            });
        }
        let idx = self.starts.partition_point(|&start| start <= row) - 1;
        Ok((idx, row - self.starts[idx]))
    }
}
