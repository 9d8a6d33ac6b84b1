//! Immutable dataset snapshot handed over by the dataset collaborator.
//!
//! A [`Dataset`] pairs a stable identifier with a [`DataFrame`] and the
//! column roles the collaborator already knows about. Declared roles take
//! precedence over anything the [`profiler`](crate::profiler) infers.
//!
//! ```
//! use u_modelrisk::dataset::{ColumnRole, DatasetBuilder};
//!
//! let ds = DatasetBuilder::new("txns-2024-06")
//!     .numeric("score", vec![0.1, 0.8, 0.4])
//!     .bools("is_fraud", vec![Some(false), Some(true), None])
//!     .categories("channel", vec!["web", "pos", "web"])
//!     .role("is_fraud", ColumnRole::Label)
//!     .build()
//!     .unwrap();
//! assert_eq!(ds.row_count(), 3);
//! assert_eq!(ds.declared("is_fraud"), Some(ColumnRole::Label));
//! ```

use crate::dataframe::{Column, DataFrame};
use crate::error::RiskError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Role a column plays in the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    /// Binary outcome label (possibly partially missing).
    Label,
    /// Model score in [0, 1].
    Score,
    /// Categorical attribute used for segmentation.
    Segment,
    /// Time or sequence key used for ordering.
    Time,
    /// Transaction amount used by the economics sections.
    Monetary,
    /// Record identifier; never analyzed as a feature.
    Identifier,
    /// Human reviewer decision (override outcome).
    HumanDecision,
}

/// Immutable snapshot of a scored-record dataset.
#[derive(Debug, Clone)]
pub struct Dataset {
    id: String,
    frame: DataFrame,
    roles: BTreeMap<String, ColumnRole>,
}

impl Dataset {
    /// Wraps a frame. Every declared role must name an existing column.
    pub fn new(
        id: impl Into<String>,
        frame: DataFrame,
        roles: BTreeMap<String, ColumnRole>,
    ) -> Result<Self, RiskError> {
        for name in roles.keys() {
            frame.require(name)?;
        }
        Ok(Self {
            id: id.into(),
            frame,
            roles,
        })
    }

    /// Stable identifier supplied by the collaborator.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Underlying frame.
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Number of records.
    pub fn row_count(&self) -> usize {
        self.frame.row_count()
    }

    /// Declared role of a column, if any.
    pub fn declared(&self, column: &str) -> Option<ColumnRole> {
        self.roles.get(column).copied()
    }

    /// Columns declared with `role`, in frame order.
    pub fn declared_columns(&self, role: ColumnRole) -> Vec<&str> {
        self.frame
            .column_names()
            .iter()
            .filter(|n| self.roles.get(n.as_str()) == Some(&role))
            .map(String::as_str)
            .collect()
    }

    /// Reads one observation as a [`Record`].
    pub fn record(&self, idx: usize) -> Option<Record> {
        if idx >= self.row_count() {
            return None;
        }
        let values = self
            .frame
            .iter()
            .map(|(name, col)| {
                let value = match col.numeric_at(idx) {
                    Some(v) => Value::Number(v),
                    None => col.label_at(idx).map_or(Value::Missing, Value::Text),
                };
                (name.to_string(), value)
            })
            .collect();
        Some(Record { index: idx, values })
    }
}

/// A single cell value of a [`Record`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    Missing,
}

/// One observation, in original column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Position of the record in the snapshot.
    pub index: usize,
    /// (column, value) pairs.
    pub values: Vec<(String, Value)>,
}

/// Incremental builder for [`Dataset`]. Errors are deferred to
/// [`build`](Self::build).
#[derive(Debug)]
pub struct DatasetBuilder {
    id: String,
    frame: DataFrame,
    roles: BTreeMap<String, ColumnRole>,
    error: Option<RiskError>,
}

impl DatasetBuilder {
    /// Starts a dataset with the given identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            frame: DataFrame::new(),
            roles: BTreeMap::new(),
            error: None,
        }
    }

    /// Adds an arbitrary column.
    pub fn column(mut self, name: &str, column: Column) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.frame.add_column(name, column) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Adds a fully-present numeric column.
    pub fn numeric(self, name: &str, values: Vec<f64>) -> Self {
        self.column(name, Column::numeric(values))
    }

    /// Adds a numeric column with missing values.
    pub fn numeric_opt(self, name: &str, values: Vec<Option<f64>>) -> Self {
        self.column(name, Column::from_numeric_options(&values))
    }

    /// Adds a boolean column with missing values.
    pub fn bools(self, name: &str, values: Vec<Option<bool>>) -> Self {
        self.column(name, Column::from_bool_options(&values))
    }

    /// Adds a fully-present categorical column.
    pub fn categories(self, name: &str, values: Vec<&str>) -> Self {
        let values: Vec<Option<&str>> = values.into_iter().map(Some).collect();
        self.column(name, Column::from_categories(&values))
    }

    /// Adds a categorical column with missing values.
    pub fn categories_opt(self, name: &str, values: Vec<Option<&str>>) -> Self {
        self.column(name, Column::from_categories(&values))
    }

    /// Declares the role of a column.
    pub fn role(mut self, name: &str, role: ColumnRole) -> Self {
        self.roles.insert(name.to_string(), role);
        self
    }

    /// Finishes the snapshot.
    pub fn build(self) -> Result<Dataset, RiskError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        Dataset::new(self.id, self.frame, self.roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_role_must_exist() {
        let err = DatasetBuilder::new("d")
            .numeric("score", vec![0.5])
            .role("label", ColumnRole::Label)
            .build()
            .unwrap_err();
        assert_eq!(err, RiskError::ColumnNotFound { name: "label".into() });
    }

    #[test]
    fn builder_defers_length_errors() {
        let err = DatasetBuilder::new("d")
            .numeric("a", vec![1.0, 2.0])
            .numeric("b", vec![1.0])
            .build()
            .unwrap_err();
        assert!(matches!(err, RiskError::DimensionMismatch { .. }));
    }

    #[test]
    fn record_reads_values_in_column_order() {
        let ds = DatasetBuilder::new("d")
            .numeric("amount", vec![12.5, 3.0])
            .categories_opt("region", vec![Some("eu"), None])
            .build()
            .unwrap();
        let rec = ds.record(1).unwrap();
        assert_eq!(rec.values[0], ("amount".to_string(), Value::Number(3.0)));
        assert_eq!(rec.values[1], ("region".to_string(), Value::Missing));
        assert!(ds.record(2).is_none());
    }

    #[test]
    fn declared_columns_follow_frame_order() {
        let ds = DatasetBuilder::new("d")
            .categories("b", vec!["x"])
            .categories("a", vec!["y"])
            .role("a", ColumnRole::Segment)
            .role("b", ColumnRole::Segment)
            .build()
            .unwrap();
        assert_eq!(ds.declared_columns(ColumnRole::Segment), vec!["b", "a"]);
    }
}
