//! The row decoder: interprets the binary layout of a `Chunk` as `f64`
//! values for a chosen subset of its columns.
//!
//! Every encoding decodes to the closest `f64` of the stored value. Missing
//! values decode to `NaN` and are never substituted; it is up to the caller
//! to decide what a missing value means.
use crate::dataset::{Chunk, Column, Encoding};
use crate::error::DecodeError;
use bytes::Buf;

/// Decodes the `cols` of the row at offset `row` within `chunk`, in the
/// order the columns were requested.
///
/// # Errors
/// If `row` is out of bounds for `chunk`, a column index is out of bounds
/// for the chunk's schema, or the chunk's layout is corrupt.
pub fn decode_row(
    chunk: &Chunk,
    row: usize,
    cols: &[usize],
) -> Result<Vec<f64>, DecodeError> {
    RowDecoder::new(chunk, cols)?.decode(row)
}

/// A decoder bound to one chunk and one column selection. Validates the
/// selection once so that decoding every row of a chunk only pays for the
/// reads.
#[derive(Debug)]
pub struct RowDecoder<'a> {
    chunk: &'a Chunk,
    columns: Vec<&'a Column>,
}

impl<'a> RowDecoder<'a> {
    /// Creates a decoder for the given column indices of `chunk`.
    pub fn new(chunk: &'a Chunk, cols: &[usize]) -> Result<Self, DecodeError> {
        let schema = chunk.schema();
        let expected = chunk.n_rows() * schema.row_width();
        if chunk.bytes().len() != expected {
            return Err(DecodeError::Truncated {
                chunk: chunk.index(),
                expected,
                actual: chunk.bytes().len(),
            });
        }

        let mut columns = Vec::with_capacity(cols.len());
        for &col in cols {
            let column = schema.col(col).ok_or(DecodeError::ColOutOfBounds {
                chunk: chunk.index(),
                col,
                width: schema.width(),
            })?;
            if column.offset + column.encoding.width() > schema.row_width() {
                return Err(DecodeError::Unsupported {
                    chunk: chunk.index(),
                    col,
                    reason: format!(
                        "{:?} value at offset {} overruns a {} byte row",
                        column.encoding,
                        column.offset,
                        schema.row_width()
                    ),
                });
            }
            if column.encoding.is_integer()
                && (!column.scale.is_finite() || column.scale == 0.0)
            {
                return Err(DecodeError::Unsupported {
                    chunk: chunk.index(),
                    col,
                    reason: format!("scale {} is not usable", column.scale),
                });
            }
            columns.push(column);
        }

        Ok(RowDecoder { chunk, columns })
    }

    /// The number of values produced per row.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Decodes the row at offset `row` within the chunk into `values`,
    /// which must be exactly `self.width()` long.
    pub fn fill(&self, row: usize, values: &mut [f64]) -> Result<(), DecodeError> {
        if values.len() != self.columns.len() {
            return Err(DecodeError::WidthMismatch {
                chunk: self.chunk.index(),
                expected: self.columns.len(),
                actual: values.len(),
            });
        }
        let bytes = self.chunk.row_bytes(row)?;
        for (value, column) in values.iter_mut().zip(&self.columns) {
            let start = column.offset;
            *value = read_value(column, &bytes[start..start + column.encoding.width()]);
        }
        Ok(())
    }

    /// Decodes the row at offset `row` within the chunk.
    pub fn decode(&self, row: usize) -> Result<Vec<f64>, DecodeError> {
        let mut values = vec![0.0; self.columns.len()];
        self.fill(row, &mut values)?;
        Ok(values)
    }
}

fn read_value(column: &Column, mut buf: &[u8]) -> f64 {
    let raw = match column.encoding {
        Encoding::Float => return buf.get_f32_le() as f64,
        Encoding::Double => return buf.get_f64_le(),
        Encoding::Byte => match buf.get_u8() {
            u8::MAX => return f64::NAN,
            b => b as i64,
        },
        Encoding::Short => match buf.get_i16_le() {
            i16::MIN => return f64::NAN,
            s => s as i64,
        },
        Encoding::Int => match buf.get_i32_le() {
            i32::MIN => return f64::NAN,
            i => i as i64,
        },
        Encoding::Long => match buf.get_i64_le() {
            i64::MIN => return f64::NAN,
            l => l,
        },
    };
    let value = (raw as i128 + column.base as i128) as f64;
    if column.scale == 1.0 {
        value
    } else {
        value / column.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ChunkWriter, Schema};

    fn mixed_chunk() -> Chunk {
        let mut schema = Schema::new();
        schema
            .add_column(Column::new(Encoding::Byte).with_base(100))
            .unwrap();
        schema
            .add_column(Column::new(Encoding::Short).with_scale(100.0))
            .unwrap();
        schema.add_column(Column::new(Encoding::Int)).unwrap();
        schema.add_column(Column::new(Encoding::Long)).unwrap();
        schema.add_column(Column::new(Encoding::Float)).unwrap();
        schema.add_column(Column::new(Encoding::Double)).unwrap();
        let mut w = ChunkWriter::new(&schema, 2);
        w.push_row(&[
            Some(142.0),
            Some(-3.25),
            Some(70_000.0),
            Some(-5_000_000_000.0),
            Some(0.5),
            Some(0.1),
        ])
        .unwrap();
        w.push_row(&[None, None, None, None, None, None]).unwrap();
        w.finish(7, 100).unwrap()
    }

    #[test]
    fn test_decode_every_encoding() {
        let chunk = mixed_chunk();
        let values = decode_row(&chunk, 0, &[0, 1, 2, 3, 4, 5]).unwrap();
        assert_eq!(values, vec![142.0, -3.25, 70_000.0, -5_000_000_000.0, 0.5, 0.1]);
    }

    #[test]
    fn test_decode_in_requested_order() {
        let chunk = mixed_chunk();
        let values = decode_row(&chunk, 0, &[5, 0, 5]).unwrap();
        assert_eq!(values, vec![0.1, 142.0, 0.1]);
        assert!(decode_row(&chunk, 0, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_missing_values_are_nan() {
        let chunk = mixed_chunk();
        let values = decode_row(&chunk, 1, &[0, 1, 2, 3, 4, 5]).unwrap();
        assert!(values.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_decode_is_idempotent() {
        let chunk = mixed_chunk();
        let first = decode_row(&chunk, 0, &[1, 3, 5]).unwrap();
        let second = decode_row(&chunk, 0, &[1, 3, 5]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_out_of_bounds() {
        let chunk = mixed_chunk();
        assert_eq!(
            decode_row(&chunk, 2, &[0]),
            Err(DecodeError::RowOutOfBounds {
                chunk: 7,
                row: 2,
                rows: 2
            })
        );
        assert_eq!(
            decode_row(&chunk, 0, &[6]).unwrap_err(),
            DecodeError::ColOutOfBounds {
                chunk: 7,
                col: 6,
                width: 6
            }
        );
    }

    #[test]
    fn test_fill_checks_width() {
        let chunk = mixed_chunk();
        let decoder = RowDecoder::new(&chunk, &[0, 2]).unwrap();
        let mut short = [0.0; 1];
        assert_eq!(
            decoder.fill(0, &mut short),
            Err(DecodeError::WidthMismatch {
                chunk: 7,
                expected: 2,
                actual: 1
            })
        );
        let mut long = [0.0; 3];
        assert!(decoder.fill(0, &mut long).is_err());
        let mut exact = [0.0; 2];
        decoder.fill(0, &mut exact).unwrap();
        assert_eq!(exact, [142.0, 70_000.0]);
    }

    #[test]
    fn test_zero_scale_is_unsupported() {
        let mut schema = Schema::new();
        schema
            .add_column(Column::new(Encoding::Int).with_scale(0.0))
            .unwrap();
        let chunk = ChunkWriter::new(&schema, 0).finish(0, 0).unwrap();
        assert!(matches!(
            RowDecoder::new(&chunk, &[0]),
            Err(DecodeError::Unsupported { col: 0, .. })
        ));
    }
}
