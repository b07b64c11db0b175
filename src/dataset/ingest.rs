//! Turns plain columns of numbers into an encoded, chunked dataset.
//!
//! Encodings are inferred per column, picking the narrowest layout that
//! reproduces every value exactly:
//! 1. the smallest power of ten scale (up to `10^4`) under which every
//!    present value is an integer,
//! 2. then `Byte` with `base = min` when the range fits in `0..=254`,
//!    otherwise the narrowest of `Short`, `Int`, `Long` that holds every
//!    value with its missing-value sentinel excluded,
//! 3. columns that are not fixed-point use `Float` if every value survives
//!    a round trip through `f32`, and `Double` otherwise.
use crate::dataset::{Chunk, ChunkWriter, Column, Encoding, Schema};
use crate::error::LiquidError;
use crossbeam_utils::thread;
use log::{debug, info, warn};
use std::path::Path;

const SCALES: [f64; 5] = [1.0, 10.0, 100.0, 1_000.0, 10_000.0];
/// Integers beyond this magnitude are not exact as `f64`
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// A named column of values that have not been encoded yet. `None` marks a
/// missing value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawColumn {
    pub name: Option<String>,
    pub values: Vec<Option<f64>>,
}

impl RawColumn {
    pub fn new(name: Option<&str>, values: Vec<Option<f64>>) -> Self {
        RawColumn {
            name: name.map(String::from),
            values,
        }
    }

    /// Creates a column where every value is present, except `NaN`s which
    /// are treated as missing.
    pub fn from_values(name: Option<&str>, values: &[f64]) -> Self {
        let values = values
            .iter()
            .map(|v| if v.is_nan() { None } else { Some(*v) })
            .collect();
        RawColumn::new(name, values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Infers the narrowest lossless encoding for the given values. The
/// returned `Column` is unnamed and has an offset of `0`.
pub fn infer_column(values: &[Option<f64>]) -> Column {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return Column::new(Encoding::Byte);
    }
    if present.iter().any(|v| !v.is_finite()) {
        return Column::new(Encoding::Double);
    }

    for &scale in SCALES.iter() {
        let fixed_point = present.iter().all(|&v| {
            let s = (v * scale).round();
            s.abs() < MAX_EXACT_INT && s / scale == v
        });
        if !fixed_point {
            continue;
        }
        let scaled = present.iter().map(|&v| (v * scale).round() as i64);
        let (min, max) = scaled.fold((i64::MAX, i64::MIN), |(lo, hi), s| {
            (lo.min(s), hi.max(s))
        });
        let column = if (max as i128 - min as i128) < u8::MAX as i128 {
            Column::new(Encoding::Byte).with_base(min)
        } else if min > i16::MIN as i64 && max <= i16::MAX as i64 {
            Column::new(Encoding::Short)
        } else if min > i32::MIN as i64 && max <= i32::MAX as i64 {
            Column::new(Encoding::Int)
        } else {
            Column::new(Encoding::Long)
        };
        return column.with_scale(scale);
    }

    if present.iter().all(|&v| (v as f32) as f64 == v) {
        Column::new(Encoding::Float)
    } else {
        Column::new(Encoding::Double)
    }
}

/// Infers a `Schema` for the given columns, keeping their names.
pub fn infer_schema(columns: &[RawColumn]) -> Result<Schema, LiquidError> {
    let mut schema = Schema::new();
    for raw in columns {
        let mut column = infer_column(&raw.values);
        column.name = raw.name.clone();
        schema.add_column(column)?;
    }
    Ok(schema)
}

/// Encodes `columns` into chunks of `rows_per_chunk` rows laid out by
/// `schema`. Chunks are encoded in parallel, using one thread per core.
/// Columns shorter than the longest one are padded with missing values.
pub fn encode_chunks(
    schema: &Schema,
    columns: &[RawColumn],
    rows_per_chunk: usize,
) -> Result<Vec<Chunk>, LiquidError> {
    if columns.len() != schema.width() {
        return Err(LiquidError::InvalidParameter {
            name: "columns",
            message: format!(
                "got {} columns for a schema with {} columns",
                columns.len(),
                schema.width()
            ),
        });
    }
    let rows_per_chunk = rows_per_chunk.max(1);
    let n_rows = columns.iter().map(RawColumn::len).max().unwrap_or(0);
    if columns.iter().any(|c| c.len() != n_rows) {
        debug!("Padding short columns to {} rows with missing values", n_rows);
    }
    let n_chunks = n_rows.div_ceil(rows_per_chunk);
    let n_threads = num_cpus::get().min(n_chunks).max(1);

    let results = thread::scope(|s| {
        let mut threads = Vec::new();
        for t in 0..n_threads {
            threads.push(s.spawn(move |_| {
                (t..n_chunks)
                    .step_by(n_threads)
                    .map(|idx| {
                        encode_chunk(schema, columns, idx, rows_per_chunk, n_rows)
                    })
                    .collect::<Vec<_>>()
            }));
        }
        threads
            .into_iter()
            .map(|t| t.join())
            .collect::<Vec<_>>()
    })
    .map_err(|_| LiquidError::Panicked("encoding chunks".to_string()))?;

    let mut chunks = Vec::with_capacity(n_chunks);
    for result in results {
        let encoded = result
            .map_err(|_| LiquidError::Panicked("encoding chunks".to_string()))?;
        for chunk in encoded {
            chunks.push(chunk?);
        }
    }
    chunks.sort_by_key(Chunk::index);
    Ok(chunks)
}

fn encode_chunk(
    schema: &Schema,
    columns: &[RawColumn],
    idx: usize,
    rows_per_chunk: usize,
    n_rows: usize,
) -> Result<Chunk, LiquidError> {
    let start = idx * rows_per_chunk;
    let end = start.saturating_add(rows_per_chunk).min(n_rows);
    let mut writer = ChunkWriter::new(schema, end - start);
    let mut row = vec![None; columns.len()];
    for i in start..end {
        for (value, column) in row.iter_mut().zip(columns) {
            *value = column.values.get(i).copied().flatten();
        }
        writer.push_row(&row)?;
    }
    writer.finish(idx, start)
}

/// Reads a CSV file into columns. When `has_headers` is set, the first
/// record names the columns. Empty cells, `NA` and `?` are missing, as are
/// cells that are not numbers. Rows with fewer cells than the widest row
/// are padded with missing values.
pub fn read_csv<P: AsRef<Path>>(
    path: P,
    has_headers: bool,
) -> Result<Vec<RawColumn>, LiquidError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path.as_ref())?;

    let mut columns: Vec<RawColumn> = Vec::new();
    if has_headers {
        for name in reader.headers()?.iter() {
            let name = if name.is_empty() { None } else { Some(name) };
            columns.push(RawColumn::new(name, Vec::new()));
        }
    }

    let mut n_rows = 0;
    let mut n_unparsed = 0;
    for record in reader.records() {
        let record = record?;
        while columns.len() < record.len() {
            columns.push(RawColumn::new(None, vec![None; n_rows]));
        }
        for (idx, column) in columns.iter_mut().enumerate() {
            let value = match record.get(idx) {
                None | Some("") | Some("NA") | Some("?") => None,
                Some(cell) => match cell.parse::<f64>() {
                    Ok(v) if !v.is_nan() => Some(v),
                    _ => {
                        n_unparsed += 1;
                        None
                    }
                },
            };
            column.values.push(value);
        }
        n_rows += 1;
    }

    if n_unparsed > 0 {
        warn!(
            "{} non-numeric cells in {:?} were read as missing values",
            n_unparsed,
            path.as_ref()
        );
    }
    info!(
        "Read {} rows and {} columns from {:?}",
        n_rows,
        columns.len(),
        path.as_ref()
    );
    Ok(columns)
}
