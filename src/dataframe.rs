//! Column-major DataFrame holding the scored-record snapshot.
//!
//! Every record of the dataset is one row; every attribute (features,
//! label, score, segment attributes, time key) is one typed column with a
//! bit-packed validity bitmap for missing values.
//!
//! | Type | Storage | Typical role |
//! |------|---------|--------------|
//! | [`Numeric`](Column::Numeric) | `Vec<f64>` + bitmap | features, score, amounts, time key |
//! | [`Boolean`](Column::Boolean) | `Vec<bool>` + bitmap | labels, flags |
//! | [`Categorical`](Column::Categorical) | dictionary + `Vec<u32>` | segment attributes |
//! | [`Text`](Column::Text) | `Vec<String>` + bitmap | identifiers, free text |
//!
//! ```
//! use u_modelrisk::dataframe::{Column, DataFrame};
//!
//! let mut df = DataFrame::new();
//! df.add_column("score", Column::from_numeric_options(&[Some(0.1), None, Some(0.9)]))
//!     .unwrap();
//! assert_eq!(df.row_count(), 3);
//! assert_eq!(df.column_by_name("score").unwrap().null_count(), 1);
//! ```

use crate::error::RiskError;
use serde::Serialize;
use std::collections::HashMap;

// ── ValidityBitmap ────────────────────────────────────────────────────

/// Bit-packed validity bitmap, one bit per row (1 = present, 0 = missing).
#[derive(Debug, Clone, PartialEq)]
pub struct ValidityBitmap {
    bits: Vec<u64>,
    len: usize,
}

impl ValidityBitmap {
    /// Creates a bitmap where all `len` positions are valid.
    pub fn all_valid(len: usize) -> Self {
        let n_words = len.div_ceil(64);
        let mut bits = vec![u64::MAX; n_words];
        let trailing = len % 64;
        if trailing != 0 && n_words > 0 {
            bits[n_words - 1] = (1u64 << trailing) - 1;
        }
        Self { bits, len }
    }

    /// Creates a bitmap from per-row presence flags.
    pub fn from_flags(flags: impl IntoIterator<Item = bool>) -> Self {
        let mut bm = Self {
            bits: Vec::new(),
            len: 0,
        };
        for flag in flags {
            bm.push(flag);
        }
        bm
    }

    /// Returns `true` if the value at `idx` is present.
    #[inline]
    pub fn is_valid(&self, idx: usize) -> bool {
        if idx >= self.len {
            return false;
        }
        (self.bits[idx / 64] >> (idx % 64)) & 1 == 1
    }

    /// Appends a new position.
    pub fn push(&mut self, valid: bool) {
        let idx = self.len;
        self.len += 1;
        if idx / 64 >= self.bits.len() {
            self.bits.push(0);
        }
        if valid {
            self.bits[idx / 64] |= 1u64 << (idx % 64);
        }
    }

    /// Number of tracked positions.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no positions are tracked.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of missing positions.
    pub fn null_count(&self) -> usize {
        let valid: usize = self.bits.iter().map(|w| w.count_ones() as usize).sum();
        self.len - valid
    }

    /// Number of present positions.
    pub fn valid_count(&self) -> usize {
        self.len - self.null_count()
    }

    /// Iterates over the indices of present positions.
    pub fn valid_indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |&i| self.is_valid(i))
    }
}

// ── DataType ──────────────────────────────────────────────────────────

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Continuous or integer values stored as `f64`.
    Numeric,
    /// True/false values.
    Boolean,
    /// Dictionary-encoded low-cardinality strings.
    Categorical,
    /// Free-form strings.
    Text,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Numeric => write!(f, "numeric"),
            Self::Boolean => write!(f, "boolean"),
            Self::Categorical => write!(f, "categorical"),
            Self::Text => write!(f, "text"),
        }
    }
}

// ── Column ────────────────────────────────────────────────────────────

/// A typed column. Missing positions hold a placeholder value that is
/// ignored through the validity bitmap.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric {
        values: Vec<f64>,
        validity: ValidityBitmap,
    },
    Boolean {
        values: Vec<bool>,
        validity: ValidityBitmap,
    },
    /// `indices` map each row into `dictionary`.
    Categorical {
        dictionary: Vec<String>,
        indices: Vec<u32>,
        validity: ValidityBitmap,
    },
    Text {
        values: Vec<String>,
        validity: ValidityBitmap,
    },
}

impl Column {
    /// Numeric column with every value present.
    pub fn numeric(values: Vec<f64>) -> Self {
        let validity = ValidityBitmap::all_valid(values.len());
        Self::Numeric { values, validity }
    }

    /// Numeric column where `None` (or NaN) marks a missing value.
    pub fn from_numeric_options(values: &[Option<f64>]) -> Self {
        let validity =
            ValidityBitmap::from_flags(values.iter().map(|v| v.is_some_and(|x| !x.is_nan())));
        let values = values.iter().map(|v| v.unwrap_or(0.0)).collect();
        Self::Numeric { values, validity }
    }

    /// Boolean column where `None` marks a missing value.
    pub fn from_bool_options(values: &[Option<bool>]) -> Self {
        let validity = ValidityBitmap::from_flags(values.iter().map(Option::is_some));
        let values = values.iter().map(|v| v.unwrap_or(false)).collect();
        Self::Boolean { values, validity }
    }

    /// Dictionary-encodes string values; `None` marks a missing value.
    /// Dictionary order follows first appearance.
    pub fn from_categories<S: AsRef<str>>(values: &[Option<S>]) -> Self {
        let mut lookup: HashMap<String, u32> = HashMap::new();
        let mut dictionary = Vec::new();
        let mut indices = Vec::with_capacity(values.len());
        let mut validity = ValidityBitmap::from_flags(std::iter::empty());
        for value in values {
            match value {
                Some(s) => {
                    let s: &str = s.as_ref();
                    let idx = match lookup.get(s) {
                        Some(&idx) => idx,
                        None => {
                            let idx = dictionary.len() as u32;
                            dictionary.push(s.to_string());
                            lookup.insert(s.to_string(), idx);
                            idx
                        }
                    };
                    indices.push(idx);
                    validity.push(true);
                }
                None => {
                    indices.push(0);
                    validity.push(false);
                }
            }
        }
        Self::Categorical {
            dictionary,
            indices,
            validity,
        }
    }

    /// Text column; `None` marks a missing value.
    pub fn from_text<S: AsRef<str>>(values: &[Option<S>]) -> Self {
        let validity = ValidityBitmap::from_flags(values.iter().map(Option::is_some));
        let values = values
            .iter()
            .map(|v| match v {
                Some(s) => {
                    let s: &str = s.as_ref();
                    s.to_string()
                }
                None => String::new(),
            })
            .collect();
        Self::Text { values, validity }
    }

    /// Storage type of this column.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Numeric { .. } => DataType::Numeric,
            Self::Boolean { .. } => DataType::Boolean,
            Self::Categorical { .. } => DataType::Categorical,
            Self::Text { .. } => DataType::Text,
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.validity().len()
    }

    /// Returns `true` if the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The validity bitmap.
    pub fn validity(&self) -> &ValidityBitmap {
        match self {
            Self::Numeric { validity, .. }
            | Self::Boolean { validity, .. }
            | Self::Categorical { validity, .. }
            | Self::Text { validity, .. } => validity,
        }
    }

    /// Number of missing values.
    pub fn null_count(&self) -> usize {
        self.validity().null_count()
    }

    /// Returns `true` if the value at `idx` is present.
    pub fn is_valid(&self, idx: usize) -> bool {
        self.validity().is_valid(idx)
    }

    /// Numeric reading of row `idx`: numeric values as-is, booleans as
    /// 0/1. Categorical and text columns have no numeric reading.
    pub fn numeric_at(&self, idx: usize) -> Option<f64> {
        if !self.is_valid(idx) {
            return None;
        }
        match self {
            Self::Numeric { values, .. } => Some(values[idx]).filter(|v| v.is_finite()),
            Self::Boolean { values, .. } => Some(if values[idx] { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Whole column as numeric options (see [`numeric_at`](Self::numeric_at)).
    /// Returns `None` for categorical and text columns.
    pub fn to_numeric_options(&self) -> Option<Vec<Option<f64>>> {
        match self {
            Self::Numeric { .. } | Self::Boolean { .. } => {
                Some((0..self.len()).map(|i| self.numeric_at(i)).collect())
            }
            _ => None,
        }
    }

    /// String reading of row `idx`, used for segment keys and label tokens.
    pub fn label_at(&self, idx: usize) -> Option<String> {
        if !self.is_valid(idx) {
            return None;
        }
        match self {
            Self::Numeric { values, .. } => Some(format_number(values[idx])),
            Self::Boolean { values, .. } => Some(values[idx].to_string()),
            Self::Categorical {
                dictionary,
                indices,
                ..
            } => dictionary.get(indices[idx] as usize).cloned(),
            Self::Text { values, .. } => Some(values[idx].clone()),
        }
    }

    /// Whole column as string options (see [`label_at`](Self::label_at)).
    pub fn to_label_options(&self) -> Vec<Option<String>> {
        (0..self.len()).map(|i| self.label_at(i)).collect()
    }
}

/// Formats integral floats without a trailing `.0` so `1.0` and `1` key the
/// same segment.
fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

// ── DataFrame ─────────────────────────────────────────────────────────

/// Column-major table. Column order is the collaborator-supplied order.
#[derive(Debug, Clone, Default)]
pub struct DataFrame {
    names: Vec<String>,
    columns: Vec<Column>,
    row_count: usize,
}

impl DataFrame {
    /// Creates an empty DataFrame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a named column. All columns must share one row count and
    /// names must be unique.
    pub fn add_column(&mut self, name: impl Into<String>, column: Column) -> Result<(), RiskError> {
        let name = name.into();
        if self.names.contains(&name) {
            return Err(RiskError::InvalidParameter {
                name,
                message: "duplicate column name".into(),
            });
        }
        if self.columns.is_empty() {
            self.row_count = column.len();
        } else if column.len() != self.row_count {
            return Err(RiskError::DimensionMismatch {
                expected: self.row_count,
                actual: column.len(),
            });
        }
        self.names.push(name);
        self.columns.push(column);
        Ok(())
    }

    /// Number of rows.
    #[inline]
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Number of columns.
    #[inline]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Column names in original order.
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Column with the given name.
    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.columns[i])
    }

    /// Column with the given name, or [`RiskError::ColumnNotFound`].
    pub fn require(&self, name: &str) -> Result<&Column, RiskError> {
        self.column_by_name(name).ok_or_else(|| RiskError::ColumnNotFound {
            name: name.to_string(),
        })
    }

    /// Iterates over (name, column) pairs in original order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_tracks_missing_across_words() {
        let bm = ValidityBitmap::from_flags((0..130).map(|i| i % 10 != 0));
        assert_eq!(bm.len(), 130);
        assert_eq!(bm.null_count(), 13);
        assert!(!bm.is_valid(0));
        assert!(bm.is_valid(129));
        assert!(!bm.is_valid(500), "out of range reads as missing");
    }

    #[test]
    fn bitmap_all_valid_boundary() {
        let bm = ValidityBitmap::all_valid(65);
        assert_eq!(bm.null_count(), 0);
        assert!(bm.is_valid(64));
        let mut bm = ValidityBitmap::from_flags([false; 3]);
        assert_eq!(bm.valid_count(), 0);
        bm.push(true);
        assert_eq!(bm.valid_indices().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn nan_is_treated_as_missing() {
        let col = Column::from_numeric_options(&[Some(1.0), Some(f64::NAN), None]);
        assert_eq!(col.null_count(), 2);
        assert_eq!(col.numeric_at(0), Some(1.0));
        assert_eq!(col.numeric_at(1), None);
    }

    #[test]
    fn boolean_numeric_reading() {
        let col = Column::from_bool_options(&[Some(true), Some(false), None]);
        assert_eq!(col.to_numeric_options(), Some(vec![Some(1.0), Some(0.0), None]));
    }

    #[test]
    fn categories_dictionary_encoded() {
        let col = Column::from_categories(&[Some("web"), Some("pos"), None, Some("web")]);
        assert_eq!(col.data_type(), DataType::Categorical);
        match &col {
            Column::Categorical { dictionary, .. } => assert_eq!(dictionary.len(), 2),
            other => panic!("unexpected column {other:?}"),
        }
        assert_eq!(col.label_at(3).as_deref(), Some("web"));
        assert_eq!(col.label_at(2), None);
        assert!(col.to_numeric_options().is_none());
    }

    #[test]
    fn integral_numbers_label_without_fraction() {
        let col = Column::numeric(vec![1.0, 2.5]);
        assert_eq!(col.label_at(0).as_deref(), Some("1"));
        assert_eq!(col.label_at(1).as_deref(), Some("2.5"));
    }

    #[test]
    fn frame_rejects_mismatched_and_duplicate_columns() {
        let mut df = DataFrame::new();
        df.add_column("a", Column::numeric(vec![1.0, 2.0])).unwrap();
        assert!(matches!(
            df.add_column("b", Column::numeric(vec![1.0])),
            Err(RiskError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(df.add_column("a", Column::numeric(vec![3.0, 4.0])).is_err());
        assert_eq!(df.column_count(), 1);
    }

    #[test]
    fn require_reports_missing_column() {
        let df = DataFrame::new();
        assert_eq!(
            df.require("score").unwrap_err(),
            RiskError::ColumnNotFound { name: "score".into() }
        );
    }
}
