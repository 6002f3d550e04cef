//! Auxiliary per-polygon columns.
//!
//! A column is a named array with one entry per polygon plus a
//! [`ColumnFormat`] that says how it is serialized: a printf-style
//! [`TextFormat`] for sibling text files, and a binary-table `TFORM` code
//! with optional scaling for FITS. When no format is supplied one is inferred
//! from the element type:
//!
//! | Data | Text | Binary |
//! |------|------|--------|
//! | `F64` | `%.15g` | `D` |
//! | `F32` | `%.6g` | `E` |
//! | `I16` / `I32` / `I64` | `%d` | `I` / `J` / `K` |
//! | `U16` / `U32` | `%u` | `I` / `J`, `TZERO = 2^15` / `2^31` |
//! | `U64` | `%d` | `J`, `TZERO = 2^31` (narrowed, lossy) |
//! | `U8` | `%u` | `B` |
//! | `I8` | `%d` | `B`, `TZERO = -128` |
//! | `Bool` | `%d` | `L` |
//! | `Str` | `%s` | `<width>A` |
//! | fixed-width `IntArray` / `FloatArray` | `%d` / `%.15g` per element | `<width>K` / `<width>D` |
//! | variable-length arrays | none | `PK(max)` / `PD(max)` |

use crate::errors::{MaskError, Result};
use crate::fits::table::TForm;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Offset that maps `u16` onto the signed 16-bit binary type.
pub const U16_ZERO: f64 = 32_768.0;
/// Offset that maps `u32` onto the signed 32-bit binary type.
pub const U32_ZERO: f64 = 2_147_483_648.0;
/// Offset that maps `u64` onto the signed 64-bit binary type.
pub const U64_ZERO: f64 = 9_223_372_036_854_775_808.0;
/// Offset that maps `i8` onto the unsigned byte binary type.
pub const I8_ZERO: f64 = -128.0;

/// Typed storage for one auxiliary column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    Bool(Vec<bool>),
    U8(Vec<u8>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Str(Vec<String>),
    /// One integer array per polygon. Fixed-width when every row has the same length.
    IntArray(Vec<Vec<i64>>),
    /// One real array per polygon. Fixed-width when every row has the same length.
    FloatArray(Vec<Vec<f64>>),
}

macro_rules! for_each_variant {
    ($value:expr, $v:ident => $body:expr) => {
        match $value {
            ColumnData::Bool($v) => $body,
            ColumnData::U8($v) => $body,
            ColumnData::I8($v) => $body,
            ColumnData::I16($v) => $body,
            ColumnData::U16($v) => $body,
            ColumnData::I32($v) => $body,
            ColumnData::U32($v) => $body,
            ColumnData::I64($v) => $body,
            ColumnData::U64($v) => $body,
            ColumnData::F32($v) => $body,
            ColumnData::F64($v) => $body,
            ColumnData::Str($v) => $body,
            ColumnData::IntArray($v) => $body,
            ColumnData::FloatArray($v) => $body,
        }
    };
}

macro_rules! rebuild_variant {
    ($value:expr, $v:ident => $body:expr) => {
        match $value {
            ColumnData::Bool($v) => ColumnData::Bool($body),
            ColumnData::U8($v) => ColumnData::U8($body),
            ColumnData::I8($v) => ColumnData::I8($body),
            ColumnData::I16($v) => ColumnData::I16($body),
            ColumnData::U16($v) => ColumnData::U16($body),
            ColumnData::I32($v) => ColumnData::I32($body),
            ColumnData::U32($v) => ColumnData::U32($body),
            ColumnData::I64($v) => ColumnData::I64($body),
            ColumnData::U64($v) => ColumnData::U64($body),
            ColumnData::F32($v) => ColumnData::F32($body),
            ColumnData::F64($v) => ColumnData::F64($body),
            ColumnData::Str($v) => ColumnData::Str($body),
            ColumnData::IntArray($v) => ColumnData::IntArray($body),
            ColumnData::FloatArray($v) => ColumnData::FloatArray($body),
        }
    };
}

impl ColumnData {
    pub fn len(&self) -> usize {
        for_each_variant!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short name of the element type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::U8(_) => "u8",
            Self::I8(_) => "i8",
            Self::I16(_) => "i16",
            Self::U16(_) => "u16",
            Self::I32(_) => "i32",
            Self::U32(_) => "u32",
            Self::I64(_) => "i64",
            Self::U64(_) => "u64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::Str(_) => "string",
            Self::IntArray(_) => "integer array",
            Self::FloatArray(_) => "real array",
        }
    }

    /// New column holding the rows at `indices`, in that order.
    pub fn take(&self, indices: &[usize]) -> Self {
        rebuild_variant!(self, v => indices.iter().map(|&i| v[i].clone()).collect())
    }

    /// Row width for array columns when every row has the same length.
    ///
    /// Scalar and string columns report `Some(1)`. Returns `None` for
    /// ragged arrays and for array columns with no rows.
    pub fn fixed_width(&self) -> Option<usize> {
        fn common_width<T>(rows: &[Vec<T>]) -> Option<usize> {
            let first = rows.first()?.len();
            rows.iter().all(|r| r.len() == first).then_some(first)
        }
        match self {
            Self::IntArray(rows) => common_width(rows),
            Self::FloatArray(rows) => common_width(rows),
            _ => Some(1),
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::IntArray(_) | Self::FloatArray(_))
    }

    /// Longest string length, for string columns.
    pub(crate) fn max_string_len(&self) -> usize {
        match self {
            Self::Str(values) => values.iter().map(|s| s.len()).max().unwrap_or(0),
            _ => 0,
        }
    }

    /// Renders row `row` with `format`; array rows are space separated.
    pub fn format_row(&self, row: usize, format: TextFormat) -> String {
        match self {
            Self::Bool(v) => format.integer(v[row] as i64),
            Self::U8(v) => format.integer(v[row] as i64),
            Self::I8(v) => format.integer(v[row] as i64),
            Self::I16(v) => format.integer(v[row] as i64),
            Self::U16(v) => format.integer(v[row] as i64),
            Self::I32(v) => format.integer(v[row] as i64),
            Self::U32(v) => format.integer(v[row] as i64),
            Self::I64(v) => format.integer(v[row]),
            Self::U64(v) => format.unsigned(v[row]),
            Self::F32(v) => format.real(v[row] as f64),
            Self::F64(v) => format.real(v[row]),
            Self::Str(v) => v[row].clone(),
            Self::IntArray(v) => v[row]
                .iter()
                .map(|&x| format.integer(x))
                .collect::<Vec<_>>()
                .join(" "),
            Self::FloatArray(v) => v[row]
                .iter()
                .map(|&x| format.real(x))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

macro_rules! impl_from_vec {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for ColumnData {
                fn from(values: Vec<$ty>) -> Self {
                    Self::$variant(values)
                }
            }
        )*
    };
}

impl_from_vec!(
    bool => Bool,
    u8 => U8,
    i8 => I8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => Str,
    Vec<i64> => IntArray,
    Vec<f64> => FloatArray,
);

/// printf-style text rendering for sibling files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextFormat {
    /// `%.<precision>g`
    General { precision: usize },
    /// `%d`
    Integer,
    /// `%u`
    Unsigned,
    /// `%s`
    String,
}

impl TextFormat {
    fn integer(self, value: i64) -> String {
        match self {
            Self::General { precision } => format_general(value as f64, precision),
            _ => value.to_string(),
        }
    }

    fn unsigned(self, value: u64) -> String {
        match self {
            Self::General { precision } => format_general(value as f64, precision),
            _ => value.to_string(),
        }
    }

    fn real(self, value: f64) -> String {
        match self {
            Self::General { precision } => format_general(value, precision),
            Self::Integer | Self::Unsigned => format!("{:.0}", value.trunc()),
            Self::String => value.to_string(),
        }
    }
}

impl fmt::Display for TextFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::General { precision } => write!(f, "%.{}g", precision),
            Self::Integer => write!(f, "%d"),
            Self::Unsigned => write!(f, "%u"),
            Self::String => write!(f, "%s"),
        }
    }
}

/// Renders `value` the way C's `%.<precision>g` does.
pub fn format_general(value: f64, precision: usize) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let precision = precision.max(1);
    let scientific = format!("{:.*e}", precision - 1, value);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= precision as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            trim_fraction(mantissa),
            sign,
            exponent.unsigned_abs()
        )
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Serialization metadata for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFormat {
    /// Binary-table form, e.g. `D`, `J`, `3D`, `16A`, `PK(12)`.
    pub tform: String,
    /// Text rendering; `None` means the column is not written to sibling files.
    pub text: Option<TextFormat>,
    /// `TZERO`: stored value + zero = physical value.
    pub zero: Option<f64>,
    /// `TSCAL`
    pub scale: Option<f64>,
    pub unit: Option<String>,
    pub null: Option<String>,
    pub display: Option<String>,
    pub dim: Option<String>,
}

impl ColumnFormat {
    pub fn new(tform: impl Into<String>, text: Option<TextFormat>) -> Self {
        Self {
            tform: tform.into(),
            text,
            zero: None,
            scale: None,
            unit: None,
            null: None,
            display: None,
            dim: None,
        }
    }

    pub fn with_zero(mut self, zero: f64) -> Self {
        self.zero = Some(zero);
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_dim(mut self, dim: impl Into<String>) -> Self {
        self.dim = Some(dim.into());
        self
    }

    /// Default format for `data`'s element type. See the module table.
    pub fn infer(data: &ColumnData) -> Self {
        use TextFormat::{General, Integer, Unsigned};
        let real = Some(General { precision: 15 });
        match data {
            ColumnData::Bool(_) => Self::new("L", Some(Integer)),
            ColumnData::U8(_) => Self::new("B", Some(Unsigned)),
            ColumnData::I8(_) => Self::new("B", Some(Integer)).with_zero(I8_ZERO),
            ColumnData::I16(_) => Self::new("I", Some(Integer)),
            ColumnData::U16(_) => Self::new("I", Some(Unsigned)).with_zero(U16_ZERO),
            ColumnData::I32(_) => Self::new("J", Some(Integer)),
            ColumnData::U32(_) => Self::new("J", Some(Unsigned)).with_zero(U32_ZERO),
            ColumnData::I64(_) => Self::new("K", Some(Integer)),
            ColumnData::U64(_) => Self::new("J", Some(Integer)).with_zero(U32_ZERO),
            ColumnData::F32(_) => Self::new("E", Some(General { precision: 6 })),
            ColumnData::F64(_) => Self::new("D", real),
            ColumnData::Str(_) => Self::new(
                format!("{}A", data.max_string_len().max(1)),
                Some(TextFormat::String),
            ),
            ColumnData::IntArray(rows) => match data.fixed_width() {
                Some(width) => Self::new(format!("{}K", width), Some(Integer)),
                None => Self::new(format!("PK({})", max_row_len(rows)), None),
            },
            ColumnData::FloatArray(rows) => match data.fixed_width() {
                Some(width) => Self::new(format!("{}D", width), real),
                None => Self::new(format!("PD({})", max_row_len(rows)), None),
            },
        }
    }

    /// Checks that this format can serialize `data`.
    ///
    /// # Errors
    /// Returns a validation error when the `TFORM` is malformed or its type
    /// code cannot hold the column's element type.
    pub fn validate_for(&self, data: &ColumnData) -> Result<()> {
        let form = TForm::parse(&self.tform)?;
        let code = form.code;
        let scaled = self.zero.is_some() || self.scale.is_some();

        let compatible = match data {
            ColumnData::Bool(_) => code == 'L' && !form.variable,
            ColumnData::Str(_) => code == 'A' && !form.variable,
            ColumnData::IntArray(_) => matches!(code, 'B' | 'I' | 'J' | 'K'),
            ColumnData::FloatArray(_) => {
                matches!(code, 'E' | 'D') || (scaled && matches!(code, 'B' | 'I' | 'J' | 'K'))
            }
            ColumnData::F32(_) | ColumnData::F64(_) => {
                !form.variable
                    && (matches!(code, 'E' | 'D')
                        || (scaled && matches!(code, 'B' | 'I' | 'J' | 'K')))
            }
            _ => !form.variable && matches!(code, 'B' | 'I' | 'J' | 'K' | 'E' | 'D'),
        };

        if !compatible {
            return Err(MaskError::validation(
                "ColumnFormat::validate_for",
                &format!(
                    "binary form '{}' cannot store {} data",
                    self.tform,
                    data.type_name()
                ),
            ));
        }

        if self.text.is_some() && data.is_array() && data.fixed_width().is_none() {
            return Err(MaskError::validation(
                "ColumnFormat::validate_for",
                "variable-length arrays have no text representation",
            ));
        }
        Ok(())
    }
}

fn max_row_len<T>(rows: &[Vec<T>]) -> usize {
    rows.iter().map(|r| r.len()).max().unwrap_or(0)
}

/// A named auxiliary column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    data: ColumnData,
    format: ColumnFormat,
}

impl Column {
    pub(crate) fn new(name: String, data: ColumnData, format: ColumnFormat) -> Self {
        Self { name, data, format }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    pub fn format(&self) -> &ColumnFormat {
        &self.format
    }

    pub(crate) fn take(&self, indices: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            data: self.data.take(indices),
            format: self.format.clone(),
        }
    }
}

/// Canonical column key: trimmed and lower-cased.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Names held by the per-polygon core attributes; no auxiliary column may use them.
pub const RESERVED_NAMES: [&str; 6] = ["xcaps", "cmcaps", "ncaps", "weight", "pixel", "str"];

/// Returns `true` if `name` normalizes to one of [`RESERVED_NAMES`].
pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_NAMES.contains(&normalize_name(name).as_str())
}

/// Ordered columns addressed by normalized name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnSet {
    columns: Vec<Column>,
}

impl ColumnSet {
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        let key = normalize_name(name);
        self.columns.iter().find(|c| c.name == key)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    /// Inserts `column`, replacing a column of the same name in place.
    pub(crate) fn insert(&mut self, column: Column) {
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<Column> {
        let key = normalize_name(name);
        let position = self.columns.iter().position(|c| c.name == key)?;
        Some(self.columns.remove(position))
    }

    pub(crate) fn take(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
        }
    }
}
