//! Error types for u-modelrisk.

use thiserror::Error;

/// All errors produced by u-modelrisk operations.
///
/// Only [`Schema`](RiskError::Schema) is terminal for a whole analysis.
/// [`PartialData`](RiskError::PartialData) degrades a single report
/// section to "not available", and
/// [`ComputationTimeout`](RiskError::ComputationTimeout) marks a module's
/// report as incomplete.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskError {
    /// Dataset cannot be analyzed at all (empty, no resolvable target).
    #[error("schema error: {0}")]
    Schema(String),
    /// A sub-computation lacks a required column or usable rows.
    #[error("{section} not available: {reason}")]
    PartialData { section: String, reason: String },
    /// The module deadline expired between loop iterations.
    #[error("computation exceeded its deadline of {limit_ms} ms")]
    ComputationTimeout { limit_ms: u64 },
    /// Column not found in the dataset.
    #[error("column '{name}' not found")]
    ColumnNotFound { name: String },
    /// Dimension mismatch between paired inputs.
    #[error("expected {expected} elements, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// Invalid parameter value.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },
    /// The dataset source has no snapshot under this identifier.
    #[error("dataset '{id}' not found")]
    DatasetNotFound { id: String },
    /// Configuration could not be read or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RiskError {
    /// Shorthand for a [`PartialData`](RiskError::PartialData) error.
    pub fn partial(section: &str, reason: impl Into<String>) -> Self {
        Self::PartialData {
            section: section.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if the error only degrades part of a report.
    pub fn is_degrading(&self) -> bool {
        matches!(self, Self::PartialData { .. } | Self::ColumnNotFound { .. })
    }
}

impl From<std::io::Error> for RiskError {
    fn from(e: std::io::Error) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<serde_json::Error> for RiskError {
    fn from(e: serde_json::Error) -> Self {
        Self::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_data_message_names_section() {
        let err = RiskError::partial("monetary comparison", "no monetary column");
        assert_eq!(
            err.to_string(),
            "monetary comparison not available: no monetary column"
        );
        assert!(err.is_degrading());
    }

    #[test]
    fn schema_error_is_terminal() {
        let err = RiskError::Schema("dataset has no rows".into());
        assert!(!err.is_degrading());
        assert!(err.to_string().contains("no rows"));
    }
}
