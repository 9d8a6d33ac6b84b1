//! Request boundary: resolves a dataset, runs one module, returns its report.
//!
//! ```
//! use std::sync::Arc;
//! use u_modelrisk::config::EngineConfig;
//! use u_modelrisk::dataset::DatasetBuilder;
//! use u_modelrisk::engine::{AnalysisRequest, Engine, InMemorySource, Module};
//! use u_modelrisk::report::Report;
//!
//! let ds = DatasetBuilder::new("txns")
//!     .numeric("score", vec![0.1, 0.9, 0.2, 0.8, 0.3, 0.7])
//!     .numeric("is_fraud", vec![0.0, 1.0, 0.0, 1.0, 0.0, 0.0])
//!     .build()
//!     .unwrap();
//! let mut source = InMemorySource::new();
//! source.insert(ds);
//! let engine = Engine::new(source, EngineConfig::default()).unwrap();
//!
//! let report = engine.run(&AnalysisRequest::new("txns", Module::Profile)).unwrap();
//! match report {
//!     Report::Profile(p) => assert_eq!(p.dataset.target.column, "is_fraud"),
//!     _ => unreachable!(),
//! }
//! ```

use crate::config::EngineConfig;
use crate::dataset::Dataset;
use crate::deadline::Deadline;
use crate::error::RiskError;
use crate::profiler::{profile_report, AnalysisContext};
use crate::report::Report;
use crate::{
    calibration, economics, explainability, leakage, quality, reject_inference, root_cause, stability, taxonomy,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

// ── Dataset source ────────────────────────────────────────────────────

/// Supplies immutable dataset snapshots by identifier.
pub trait DatasetSource: Send + Sync {
    /// Snapshot for `id`, or [`RiskError::DatasetNotFound`].
    fn dataset(&self, id: &str) -> Result<Arc<Dataset>, RiskError>;
}

/// Datasets held in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemorySource {
    datasets: HashMap<String, Arc<Dataset>>,
}

impl InMemorySource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a dataset under its own id, replacing any previous one.
    pub fn insert(&mut self, dataset: Dataset) {
        self.datasets.insert(dataset.id().to_string(), Arc::new(dataset));
    }

    /// Number of registered datasets.
    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

impl DatasetSource for InMemorySource {
    fn dataset(&self, id: &str) -> Result<Arc<Dataset>, RiskError> {
        self.datasets
            .get(id)
            .cloned()
            .ok_or_else(|| RiskError::DatasetNotFound { id: id.to_string() })
    }
}

// ── Requests ──────────────────────────────────────────────────────────

/// Analysis module selected by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    Profile,
    Stability,
    Leakage,
    Taxonomy,
    RejectInference,
    Calibration,
    Explainability,
    RootCause,
    Economics,
    Quality,
}

impl Module {
    /// Every module in report order.
    pub const ALL: [Module; 10] = [
        Module::Profile,
        Module::Stability,
        Module::Leakage,
        Module::Taxonomy,
        Module::RejectInference,
        Module::Calibration,
        Module::Explainability,
        Module::RootCause,
        Module::Economics,
        Module::Quality,
    ];
}

/// One analysis call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub dataset_id: String,
    pub module: Module,
    #[serde(default)]
    pub target_override: Option<String>,
    /// Segment dimensions; inferred from the data when absent.
    #[serde(default)]
    pub dimensions: Option<Vec<String>>,
}

impl AnalysisRequest {
    /// Request with inferred target and dimensions.
    pub fn new(dataset_id: &str, module: Module) -> Self {
        Self {
            dataset_id: dataset_id.to_string(),
            module,
            target_override: None,
            dimensions: None,
        }
    }

    /// Forces the target column.
    pub fn target(mut self, column: &str) -> Self {
        self.target_override = Some(column.to_string());
        self
    }

    /// Sets the segment dimensions.
    pub fn dimensions(mut self, dims: &[&str]) -> Self {
        self.dimensions = Some(dims.iter().map(|d| (*d).to_string()).collect());
        self
    }

    /// Stable key over dataset, module and parameters for caching at the
    /// boundary.
    pub fn cache_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{}:{:?}", self.dataset_id, self.module))
    }
}

// ── Engine ────────────────────────────────────────────────────────────

/// Runs analysis requests against a dataset source.
pub struct Engine<S> {
    source: S,
    config: EngineConfig,
}

impl<S: DatasetSource> Engine<S> {
    /// Creates an engine after validating `config`.
    ///
    /// Returns [`RiskError::Config`] for settings no analysis can run with.
    pub fn new(source: S, config: EngineConfig) -> Result<Self, RiskError> {
        config.validate()?;
        Ok(Self { source, config })
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The dataset source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Runs one request.
    ///
    /// Fails only on terminal errors: unknown dataset, empty dataset or no
    /// resolvable target. Missing optional columns degrade sections of the
    /// returned report instead.
    pub fn run(&self, request: &AnalysisRequest) -> Result<Report, RiskError> {
        let dataset = self.source.dataset(&request.dataset_id)?;
        tracing::info!(
            dataset = request.dataset_id.as_str(),
            module = ?request.module,
            rows = dataset.row_count(),
            "running analysis"
        );
        let ctx = AnalysisContext::build(
            &dataset,
            request.target_override.as_deref(),
            request.dimensions.as_deref(),
            &self.config.profiler,
        )?;
        let deadline = Deadline::from_millis(self.config.time_limit_ms);
        let config = &self.config;

        let report = match request.module {
            Module::Profile => Report::Profile(profile_report(&ctx)),
            Module::Stability => Report::Stability(stability::analyze(&ctx, config, &deadline)?),
            Module::Leakage => Report::Leakage(leakage::analyze(&ctx, config, &deadline)?),
            Module::Taxonomy => Report::Taxonomy(taxonomy::analyze(&ctx, config, &deadline)?),
            Module::RejectInference => {
                Report::RejectInference(reject_inference::analyze(&ctx, config, &deadline)?)
            }
            Module::Calibration => Report::Calibration(calibration::analyze(&ctx, config, &deadline)?),
            Module::Explainability => Report::Explainability(explainability::analyze(&ctx, config, &deadline)?),
            Module::RootCause => Report::RootCause(root_cause::analyze(&ctx, config, &deadline)?),
            Module::Economics => Report::Economics(economics::analyze(&ctx, config, &deadline)?),
            Module::Quality => Report::Quality(quality::analyze(&ctx, config, &deadline)?),
        };
        if !report.status().complete {
            tracing::warn!(
                dataset = request.dataset_id.as_str(),
                module = ?request.module,
                "report incomplete"
            );
        }
        Ok(report)
    }

    /// Runs independent requests in parallel, results in request order.
    pub fn run_batch(&self, requests: &[AnalysisRequest]) -> Vec<Result<Report, RiskError>> {
        requests.par_iter().map(|r| self.run(r)).collect()
    }

    /// Every module against one dataset.
    pub fn run_all(&self, dataset_id: &str) -> Vec<Result<Report, RiskError>> {
        let requests: Vec<AnalysisRequest> = Module::ALL
            .iter()
            .map(|&m| AnalysisRequest::new(dataset_id, m))
            .collect();
        self.run_batch(&requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetBuilder;

    fn engine() -> Engine<InMemorySource> {
        let n = 80;
        let score: Vec<f64> = (0..n).map(|i| (i % 10) as f64 / 10.0 + 0.05).collect();
        let label: Vec<f64> = (0..n).map(|i| f64::from(i % 10 >= 8)).collect();
        let amount: Vec<f64> = (0..n).map(|i| 20.0 + (i % 7) as f64 * 15.0).collect();
        let region: Vec<&str> = (0..n).map(|i| if i % 3 == 0 { "north" } else { "south" }).collect();
        let ds = DatasetBuilder::new("txns")
            .numeric("score", score)
            .numeric("is_fraud", label)
            .numeric("amount", amount)
            .categories("region", region)
            .build()
            .unwrap();
        let mut source = InMemorySource::new();
        source.insert(ds);
        Engine::new(source, EngineConfig::default()).unwrap()
    }

    #[test]
    fn invalid_config_rejected_at_construction() {
        let mut config = EngineConfig::default();
        config.calibration.bins = 0;
        let err = Engine::new(InMemorySource::new(), config).err().unwrap();
        assert!(matches!(err, RiskError::Config(ref m) if m.contains("calibration.bins")));
    }

    #[test]
    fn unknown_dataset_is_terminal() {
        let err = engine().run(&AnalysisRequest::new("nope", Module::Leakage)).unwrap_err();
        assert_eq!(err, RiskError::DatasetNotFound { id: "nope".into() });
    }

    #[test]
    fn unknown_target_override_is_terminal() {
        let req = AnalysisRequest::new("txns", Module::Calibration).target("missing");
        assert!(engine().run(&req).is_err());
    }

    #[test]
    fn dispatches_to_requested_module() {
        let report = engine().run(&AnalysisRequest::new("txns", Module::RootCause)).unwrap();
        assert!(matches!(report, Report::RootCause(_)));
    }

    #[test]
    fn batch_preserves_request_order() {
        let results = engine().run_all("txns");
        assert_eq!(results.len(), Module::ALL.len());
        for (m, r) in Module::ALL.iter().zip(&results) {
            let json = serde_json::to_value(r.as_ref().unwrap()).unwrap();
            assert_eq!(json["module"], serde_json::to_value(m).unwrap());
        }
    }

    #[test]
    fn cache_key_tracks_parameters() {
        let a = AnalysisRequest::new("txns", Module::Stability);
        let b = a.clone().dimensions(&["region"]);
        assert_eq!(a.cache_key(), a.clone().cache_key());
        assert_ne!(a.cache_key(), b.cache_key());
        assert!(a.cache_key().contains("stability"));
    }

    #[test]
    fn unknown_dimension_noted_not_fatal() {
        let req = AnalysisRequest::new("txns", Module::Taxonomy).dimensions(&["region", "planet"]);
        let report = engine().run(&req).unwrap();
        assert!(report.status().notes.iter().any(|n| n.contains("planet")));
    }
}
