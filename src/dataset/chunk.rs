//! Defines functionality for a `Chunk`, an immutable contiguous range of
//! rows of a dataset in their encoded binary form.
use crate::dataset::{Column, Encoding, Schema};
use crate::error::{DecodeError, LiquidError};
use bytes::{BufMut, Bytes, BytesMut};
use deepsize::{Context, DeepSizeOf};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Represents a chunk of a dataset: the encoded bytes of `n_rows`
/// consecutive rows starting at global row `start_row`, plus the layout
/// needed to interpret them. Chunks are never mutated once built, so they
/// may be shared freely between concurrent map invocations.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Chunk {
    /// The index of this chunk within its dataset
    index: usize,
    /// The global row index of the first row in this chunk
    start_row: usize,
    /// The number of rows in this chunk
    n_rows: usize,
    /// The row layout of the dataset this chunk belongs to
    schema: Schema,
    /// The encoded rows, row-major, `schema.row_width()` bytes per row
    bytes: Bytes,
}

impl Chunk {
    /// Creates a new `Chunk` from already encoded `bytes`.
    ///
    /// # Errors
    /// If the length of `bytes` is not `n_rows * schema.row_width()`
    pub fn new(
        index: usize,
        start_row: usize,
        n_rows: usize,
        schema: Schema,
        bytes: Bytes,
    ) -> Result<Self, LiquidError> {
        let expected = n_rows * schema.row_width();
        if bytes.len() != expected {
            return Err(DecodeError::Truncated {
                chunk: index,
                expected,
                actual: bytes.len(),
            }
            .into());
        }
        Ok(Chunk {
            index,
            start_row,
            n_rows,
            schema,
            bytes,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn start_row(&self) -> usize {
        self.start_row
    }

    /// Return the number of rows in this `Chunk`.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// The global row indices covered by this `Chunk`.
    pub fn row_range(&self) -> Range<usize> {
        self.start_row..self.start_row + self.n_rows
    }

    /// Obtains a reference to the layout of the rows in this `Chunk`
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The raw encoded bytes of this `Chunk`
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// The encoded bytes of the row at the given offset within this chunk.
    pub(crate) fn row_bytes(&self, row: usize) -> Result<&[u8], DecodeError> {
        if row >= self.n_rows {
            return Err(DecodeError::RowOutOfBounds {
                chunk: self.index,
                row,
                rows: self.n_rows,
            });
        }
        let width = self.schema.row_width();
        self.bytes
            .get(row * width..(row + 1) * width)
            .ok_or(DecodeError::Truncated {
                chunk: self.index,
                expected: self.n_rows * width,
                actual: self.bytes.len(),
            })
    }
}

impl DeepSizeOf for Chunk {
    fn deep_size_of_children(&self, context: &mut Context) -> usize {
        self.bytes.len() + self.schema.deep_size_of_children(context)
    }
}

/// Encodes rows of `f64` values into the binary layout of a `Schema`, one
/// row at a time, and seals them into a `Chunk`.
pub struct ChunkWriter {
    schema: Schema,
    buf: BytesMut,
    n_rows: usize,
}

impl ChunkWriter {
    /// Creates a writer for `schema` with room for `capacity` rows.
    pub fn new(schema: &Schema, capacity: usize) -> Self {
        ChunkWriter {
            schema: schema.clone(),
            buf: BytesMut::with_capacity(capacity * schema.row_width()),
            n_rows: 0,
        }
    }

    /// Appends one row. `None` and `NaN` are written as the missing-value
    /// sentinel of the column's encoding.
    ///
    /// # Errors
    /// If `values` is not as wide as the schema, or a value can't be
    /// represented by its column's encoding.
    pub fn push_row(
        &mut self,
        values: &[Option<f64>],
    ) -> Result<(), LiquidError> {
        if values.len() != self.schema.width() {
            return Err(LiquidError::InvalidParameter {
                name: "values",
                message: format!(
                    "row has {} values but the schema has {} columns",
                    values.len(),
                    self.schema.width()
                ),
            });
        }
        let row_start = self.buf.len();
        for (column, value) in self.schema.columns().iter().zip(values) {
            let value = value.filter(|v| !v.is_nan());
            if let Err(e) = put_value(&mut self.buf, column, value) {
                // drop the partially written row
                self.buf.truncate(row_start);
                return Err(e);
            }
        }
        self.n_rows += 1;
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Seals the written rows into the chunk with the given `index`, whose
    /// first row has global index `start_row`.
    pub fn finish(
        self,
        index: usize,
        start_row: usize,
    ) -> Result<Chunk, LiquidError> {
        Chunk::new(index, start_row, self.n_rows, self.schema, self.buf.freeze())
    }
}

fn put_value(
    buf: &mut BytesMut,
    column: &Column,
    value: Option<f64>,
) -> Result<(), LiquidError> {
    match column.encoding {
        Encoding::Float => buf.put_f32_le(value.unwrap_or(f64::NAN) as f32),
        Encoding::Double => buf.put_f64_le(value.unwrap_or(f64::NAN)),
        Encoding::Byte => match value {
            None => buf.put_u8(u8::MAX),
            Some(v) => {
                let raw = to_raw(column, v)?;
                match u8::try_from(raw) {
                    Ok(b) if b != u8::MAX => buf.put_u8(b),
                    _ => return Err(unrepresentable(column, v)),
                }
            }
        },
        Encoding::Short => match value {
            None => buf.put_i16_le(i16::MIN),
            Some(v) => {
                let raw = to_raw(column, v)?;
                match i16::try_from(raw) {
                    Ok(s) if s != i16::MIN => buf.put_i16_le(s),
                    _ => return Err(unrepresentable(column, v)),
                }
            }
        },
        Encoding::Int => match value {
            None => buf.put_i32_le(i32::MIN),
            Some(v) => {
                let raw = to_raw(column, v)?;
                match i32::try_from(raw) {
                    Ok(i) if i != i32::MIN => buf.put_i32_le(i),
                    _ => return Err(unrepresentable(column, v)),
                }
            }
        },
        Encoding::Long => match value {
            None => buf.put_i64_le(i64::MIN),
            Some(v) => {
                let raw = to_raw(column, v)?;
                if raw == i64::MIN {
                    return Err(unrepresentable(column, v));
                }
                buf.put_i64_le(raw)
            }
        },
    }
    Ok(())
}

/// The stored integer for `v`: `round(v * scale) - base`.
fn to_raw(column: &Column, v: f64) -> Result<i64, LiquidError> {
    let scaled = (v * column.scale).round();
    // i64::MAX as f64 rounds up to 2^63, which is out of range
    if !scaled.is_finite() || scaled < i64::MIN as f64 || scaled >= i64::MAX as f64
    {
        return Err(unrepresentable(column, v));
    }
    (scaled as i64)
        .checked_sub(column.base)
        .ok_or_else(|| unrepresentable(column, v))
}

fn unrepresentable(column: &Column, v: f64) -> LiquidError {
    LiquidError::InvalidParameter {
        name: "values",
        message: format!(
            "{} can't be stored in a {:?} column with base {} and scale {}",
            v, column.encoding, column.base, column.scale
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_wrong_length() {
        let schema = Schema::try_from("ID").unwrap();
        let res = Chunk::new(2, 0, 3, schema, Bytes::from(vec![0u8; 35]));
        match res {
            Err(LiquidError::Decode(DecodeError::Truncated {
                chunk,
                expected,
                actual,
            })) => {
                assert_eq!(chunk, 2);
                assert_eq!(expected, 36);
                assert_eq!(actual, 35);
            }
            other => panic!("expected a truncation error, got {:?}", other),
        }
    }

    #[test]
    fn test_writer_layout() {
        let schema = Schema::try_from("BSD").unwrap();
        let mut w = ChunkWriter::new(&schema, 2);
        w.push_row(&[Some(3.0), Some(-2.0), Some(0.5)]).unwrap();
        w.push_row(&[None, None, Some(f64::NAN)]).unwrap();
        let chunk = w.finish(0, 10).unwrap();
        assert_eq!(chunk.n_rows(), 2);
        assert_eq!(chunk.row_range(), 10..12);
        assert_eq!(chunk.bytes().len(), 2 * 11);
        assert_eq!(chunk.row_bytes(0).unwrap()[0], 3);
        assert_eq!(&chunk.row_bytes(0).unwrap()[1..3], &(-2i16).to_le_bytes());
        assert_eq!(chunk.row_bytes(1).unwrap()[0], u8::MAX);
        assert_eq!(
            &chunk.row_bytes(1).unwrap()[1..3],
            &i16::MIN.to_le_bytes()
        );
        assert!(chunk.row_bytes(2).is_err());
    }

    #[test]
    fn test_writer_rejects_unrepresentable_values() {
        let schema = Schema::try_from("B").unwrap();
        let mut w = ChunkWriter::new(&schema, 1);
        assert!(w.push_row(&[Some(255.0)]).is_err());
        assert!(w.push_row(&[Some(-1.0)]).is_err());
        assert!(w.push_row(&[Some(1.0), Some(2.0)]).is_err());
        assert_eq!(w.n_rows(), 0);
    }

    #[test]
    fn test_deep_size_counts_bytes() {
        let schema = Schema::try_from("D").unwrap();
        let mut w = ChunkWriter::new(&schema, 100);
        for i in 0..100 {
            w.push_row(&[Some(i as f64)]).unwrap();
        }
        let chunk = w.finish(0, 0).unwrap();
        assert!(chunk.deep_size_of() >= 800);
    }
}
