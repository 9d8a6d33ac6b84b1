//! Engine-wide configuration.
//!
//! [`EngineConfig`] bundles one config struct per analysis module. Every
//! field has a default, so a partial JSON document only needs the values it
//! changes:
//!
//! ```
//! use u_modelrisk::config::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(r#"{ "decision_threshold": 0.7, "stability": { "windows": 6 } }"#)
//!     .unwrap();
//! assert_eq!(config.decision_threshold, 0.7);
//! assert_eq!(config.stability.windows, 6);
//! assert_eq!(config.stability.buckets, 10);
//! ```

use crate::calibration::CalibrationConfig;
use crate::classification::CostModel;
use crate::economics::EconomicsConfig;
use crate::error::RiskError;
use crate::explainability::ExplainabilityConfig;
use crate::leakage::LeakageConfig;
use crate::profiler::ProfilerConfig;
use crate::quality::QualityConfig;
use crate::reject_inference::RejectInferenceConfig;
use crate::root_cause::RootCauseConfig;
use crate::segment::SegmentConfig;
use crate::stability::StabilityConfig;
use crate::taxonomy::TaxonomyConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for every analysis module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Score at or above which a record is flagged. Default: 0.5.
    pub decision_threshold: f64,
    /// Wall-clock limit per module run in milliseconds. Default: none.
    pub time_limit_ms: Option<u64>,
    pub profiler: ProfilerConfig,
    pub segment: SegmentConfig,
    pub cost: CostModel,
    pub stability: StabilityConfig,
    pub leakage: LeakageConfig,
    pub taxonomy: TaxonomyConfig,
    pub reject_inference: RejectInferenceConfig,
    pub calibration: CalibrationConfig,
    pub explainability: ExplainabilityConfig,
    pub root_cause: RootCauseConfig,
    pub economics: EconomicsConfig,
    pub quality: QualityConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decision_threshold: 0.5,
            time_limit_ms: None,
            profiler: ProfilerConfig::default(),
            segment: SegmentConfig::default(),
            cost: CostModel::default(),
            stability: StabilityConfig::default(),
            leakage: LeakageConfig::default(),
            taxonomy: TaxonomyConfig::default(),
            reject_inference: RejectInferenceConfig::default(),
            calibration: CalibrationConfig::default(),
            explainability: ExplainabilityConfig::default(),
            root_cause: RootCauseConfig::default(),
            economics: EconomicsConfig::default(),
            quality: QualityConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Sets the decision threshold.
    pub fn decision_threshold(mut self, t: f64) -> Self {
        self.decision_threshold = t;
        self
    }

    /// Sets the per-module time limit.
    pub fn time_limit_ms(mut self, ms: u64) -> Self {
        self.time_limit_ms = Some(ms);
        self
    }

    /// Replaces the segment configuration.
    pub fn segment(mut self, segment: SegmentConfig) -> Self {
        self.segment = segment;
        self
    }

    /// Replaces the cost model.
    pub fn cost(mut self, cost: CostModel) -> Self {
        self.cost = cost;
        self
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, RiskError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RiskError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Rejects values no analysis can run with.
    pub fn validate(&self) -> Result<(), RiskError> {
        let unit = |name: &str, v: f64| -> Result<(), RiskError> {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(RiskError::Config(format!("{name} must lie in [0, 1], got {v}")))
            }
        };
        let positive = |name: &str, n: usize| -> Result<(), RiskError> {
            if n > 0 {
                Ok(())
            } else {
                Err(RiskError::Config(format!("{name} must be positive")))
            }
        };

        unit("decision_threshold", self.decision_threshold)?;
        unit("segment.disaster_fraction", self.segment.disaster_fraction)?;
        unit("economics.review_threshold", self.economics.review_threshold)?;
        unit("quality.acceptable_catch_rate", self.quality.acceptable_catch_rate)?;
        unit("explainability.readability_threshold", self.explainability.readability_threshold)?;
        if let Some(c) = self.reject_inference.cutoff {
            unit("reject_inference.cutoff", c)?;
        }
        positive("segment.max_segments", self.segment.max_segments)?;
        positive("stability.buckets", self.stability.buckets)?;
        positive("calibration.bins", self.calibration.bins)?;
        positive("explainability.top_n", self.explainability.top_n)?;
        positive("economics.max_grid_points", self.economics.max_grid_points)?;
        if self.stability.windows < 2 {
            return Err(RiskError::Config("stability.windows must be at least 2".into()));
        }
        if self.leakage.high_correlation > self.leakage.critical_correlation {
            return Err(RiskError::Config(
                "leakage.high_correlation must not exceed leakage.critical_correlation".into(),
            ));
        }
        if self
            .economics
            .percentile_grid
            .iter()
            .any(|p| !(0.0..=100.0).contains(p))
        {
            return Err(RiskError::Config("economics.percentile_grid must lie in [0, 100]".into()));
        }
        if self.economics.productive_hours_per_day <= 0.0 || self.economics.observation_days <= 0.0 {
            return Err(RiskError::Config(
                "economics.productive_hours_per_day and observation_days must be positive".into(),
            ));
        }
        if self
            .reject_inference
            .multipliers
            .iter()
            .chain(&self.quality.spike_multipliers)
            .any(|m| !m.is_finite() || *m <= 0.0)
        {
            return Err(RiskError::Config("multipliers must be finite and positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c = EngineConfig::from_json_str(r#"{ "quality": { "review_capacity": 40 } }"#).unwrap();
        assert_eq!(c.quality.review_capacity, Some(40));
        assert_eq!(c.quality.spike_multipliers, vec![1.5, 2.0, 3.0]);
        assert_eq!(c.decision_threshold, 0.5);
    }

    #[test]
    fn out_of_range_threshold_is_config_error() {
        let err = EngineConfig::from_json_str(r#"{ "decision_threshold": 1.5 }"#).unwrap_err();
        assert!(matches!(err, RiskError::Config(ref m) if m.contains("decision_threshold")));
    }

    #[test]
    fn malformed_json_is_config_error() {
        assert!(matches!(
            EngineConfig::from_json_str("{ not json"),
            Err(RiskError::Config(_))
        ));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = EngineConfig::from_json_file("/nonexistent/u-modelrisk.json").unwrap_err();
        assert!(matches!(err, RiskError::Config(_)));
    }

    #[test]
    fn single_window_rejected() {
        let mut c = EngineConfig::default();
        c.stability.windows = 1;
        assert!(c.validate().is_err());
    }

    #[test]
    fn builder_setters() {
        let c = EngineConfig::default().decision_threshold(0.8).time_limit_ms(250);
        assert_eq!(c.decision_threshold, 0.8);
        assert_eq!(c.time_limit_ms, Some(250));
    }
}
