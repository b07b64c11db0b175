//! A module for describing, encoding and decoding chunked datasets.
//!
//! A dataset in `liquid_kmeans` is a table of numeric columns that is split
//! horizontally into [`Chunk`]s. Each chunk is an immutable, contiguous
//! range of rows stored in a compact row-major binary layout described by a
//! [`Schema`]. Chunks are the unit of parallel work: the `Executor` runs a
//! task's `map` once per chunk.
//!
//! The `dataset` module provides:
//!  - [`Schema`], [`Column`] and [`Encoding`]: the row layout, including
//!    compressed integer and fixed-point encodings
//!  - [`Chunk`] and [`ChunkWriter`]: encoded rows and how to build them
//!  - [`RowDecoder`] and [`decode_row`]: reading typed values back out of a
//!    chunk as `f64`s
//!  - [`Dataset`]: the metadata mapping a dataset's key to its chunks
//!  - [`RawColumn`], [`infer_schema`], [`encode_chunks`] and [`read_csv`]:
//!    getting data into the encoded form
mod chunk;
pub use chunk::{Chunk, ChunkWriter};

mod decoder;
pub use decoder::{decode_row, RowDecoder};

mod distributed_dataset;
pub use distributed_dataset::Dataset;

mod ingest;
pub use ingest::{
    encode_chunks, infer_column, infer_schema, read_csv, RawColumn,
};

mod schema;
pub use schema::{Column, Encoding, Schema};
