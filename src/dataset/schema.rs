//! A Schema module for managing the encodings, byte layout and column
//! names of the rows in a dataset.
use crate::error::LiquidError;
use deepsize::DeepSizeOf;
use serde::{Deserialize, Serialize};

/// The native encoding of a column inside a chunk. Integer encodings are
/// compressed: they store `raw` and decode to `(raw + base) / scale`.
///
/// | Encoding | Width | Missing value  |
/// |----------|-------|----------------|
/// | `Byte`   | 1     | `255`          |
/// | `Short`  | 2     | `i16::MIN`     |
/// | `Int`    | 4     | `i32::MIN`     |
/// | `Long`   | 8     | `i64::MIN`     |
/// | `Float`  | 4     | `NaN`          |
/// | `Double` | 8     | `NaN`          |
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, DeepSizeOf,
)]
pub enum Encoding {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl Encoding {
    /// The number of bytes a value of this encoding occupies in a row.
    pub fn width(self) -> usize {
        match self {
            Encoding::Byte => 1,
            Encoding::Short => 2,
            Encoding::Int | Encoding::Float => 4,
            Encoding::Long | Encoding::Double => 8,
        }
    }

    /// Whether values of this encoding are stored as scaled integers.
    pub fn is_integer(self) -> bool {
        !matches!(self, Encoding::Float | Encoding::Double)
    }

    fn from_char(c: char) -> Option<Self> {
        match c {
            'B' => Some(Encoding::Byte),
            'S' => Some(Encoding::Short),
            'I' => Some(Encoding::Int),
            'L' => Some(Encoding::Long),
            'F' => Some(Encoding::Float),
            'D' => Some(Encoding::Double),
            _ => None,
        }
    }
}

/// Describes a single column: its optional name, its encoding and where in
/// a row its bytes live.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, DeepSizeOf)]
pub struct Column {
    /// The optional name of this column
    pub name: Option<String>,
    /// How values of this column are stored
    pub encoding: Encoding,
    /// Offset added to stored integers before scaling
    pub base: i64,
    /// Divisor applied to stored integers after adding `base`
    pub scale: f64,
    /// Byte offset of this column within a row, assigned by the `Schema`
    pub offset: usize,
}

impl Column {
    /// Creates an unnamed column with the given `encoding`, a `base` of `0`
    /// and a `scale` of `1`.
    pub fn new(encoding: Encoding) -> Self {
        Column {
            name: None,
            encoding,
            base: 0,
            scale: 1.0,
            offset: 0,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_base(mut self, base: i64) -> Self {
        self.base = base;
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }
}

/// The layout of every row in a dataset. A `Schema` is fixed once the
/// dataset is created.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Default, DeepSizeOf,
)]
pub struct Schema {
    columns: Vec<Column>,
    row_width: usize,
}

/// The implementation of the Schema interface, which manages the layout
/// and column names of a dataset.
impl Schema {
    /// Constructs an empty Schema.
    pub fn new() -> Self {
        Schema {
            ..Default::default()
        }
    }

    /// Add the given `column` to the end of this Schema. Its `offset` is set
    /// to the current row width. Column names must be unique: if the name
    /// already exists in this `Schema` the column will not be added and a
    /// `LiquidError::NameAlreadyExists` error will be returned.
    pub fn add_column(&mut self, mut column: Column) -> Result<(), LiquidError> {
        if let Some(name) = &column.name {
            if self.col_idx(name).is_some() {
                return Err(LiquidError::NameAlreadyExists(name.clone()));
            }
        }
        column.offset = self.row_width;
        self.row_width += column.encoding.width();
        self.columns.push(column);
        Ok(())
    }

    /// Gets the column at the given `idx`, or `None` if out of bounds.
    pub fn col(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    /// All the columns of this Schema, in order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Gets the (optional) name of the column at the given `idx`.
    pub fn col_name(&self, idx: usize) -> Option<&str> {
        self.columns.get(idx).and_then(|c| c.name.as_deref())
    }

    /// Given a column name, returns its index
    pub fn col_idx(&self, col_name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.as_deref() == Some(col_name))
    }

    /// The number of columns in this Schema.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// The number of bytes in one encoded row.
    pub fn row_width(&self) -> usize {
        self.row_width
    }
}

impl From<Vec<Encoding>> for Schema {
    /// Create a Schema of unnamed columns from a `Vec<Encoding>`
    fn from(encodings: Vec<Encoding>) -> Self {
        let mut schema = Schema::new();
        for e in encodings {
            // unnamed columns can't collide
            schema.columns.push(Column {
                offset: schema.row_width,
                ..Column::new(e)
            });
            schema.row_width += e.width();
        }
        schema
    }
}

impl TryFrom<&str> for Schema {
    type Error = LiquidError;

    /// Create a Schema from a `&str` of encodings. Initializes the column
    /// names to be `None`.
    ///
    /// | Character | Encoding |
    /// |-----------|----------|
    /// | 'B'       | Byte     |
    /// | 'S'       | Short    |
    /// | 'I'       | Int      |
    /// | 'L'       | Long     |
    /// | 'F'       | Float    |
    /// | 'D'       | Double   |
    fn try_from(types: &str) -> Result<Self, Self::Error> {
        let encodings = types
            .chars()
            .map(|c| {
                Encoding::from_char(c).ok_or_else(|| {
                    LiquidError::InvalidParameter {
                        name: "schema",
                        message: format!("unknown encoding character {:?}", c),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Schema::from(encodings))
    }
}
