//! # u-modelrisk
//!
//! Model-risk diagnostics for scored binary-classification datasets such as
//! fraud or credit decisions.
//!
//! Given a dataset snapshot with a label, and usually a model score, the
//! engine profiles the data, resolves the target and then answers questions
//! a model-risk reviewer asks: is the score drifting, do features leak the
//! outcome, which segments does the model fail, is the score calibrated,
//! what do the decisions cost, and how does the system behave when inputs
//! degrade.
//!
//! Missing optional columns never fail an analysis. Each report is made of
//! [`report::Section`]s that are either available or carry the reason they
//! are not.
//!
//! ## Modules
//!
//! - [`dataframe`]: Column-major tabular data with validity bitmaps
//! - [`dataset`]: Immutable dataset snapshots with declared column roles
//! - [`profiler`]: Column profiles, role inference, target resolution, class imbalance
//! - [`stats`] / [`divergence`] / [`classification`] / [`segment`]: Shared statistical primitives
//! - [`banding`]: Cutpoint-to-verdict banding
//! - [`stability`]: Population stability, rolling drift, per-segment score shifts
//! - [`leakage`]: Target leakage and post-outcome features
//! - [`taxonomy`]: Fraud subtype coverage and segment decomposition
//! - [`reject_inference`]: What declined records would have done
//! - [`calibration`] / [`explainability`]: Reliability curves, reason codes
//! - [`root_cause`] / [`economics`]: False-positive drivers, action value, threshold choice, review workload
//! - [`quality`]: Input quality and failure modes
//! - [`engine`]: Request boundary and batch execution
//! - [`config`], [`deadline`], [`report`], [`error`]
//!
//! ## Quick Start
//!
//! ```
//! use u_modelrisk::config::EngineConfig;
//! use u_modelrisk::dataset::DatasetBuilder;
//! use u_modelrisk::engine::{AnalysisRequest, Engine, InMemorySource, Module};
//! use u_modelrisk::report::Report;
//!
//! let n = 40;
//! let ds = DatasetBuilder::new("txns")
//!     .numeric("score", (0..n).map(|i| (i % 10) as f64 / 10.0).collect())
//!     .numeric("chargeback_amount", (0..n).map(|i| if i % 10 >= 8 { 120.0 } else { 0.0 }).collect())
//!     .numeric("is_fraud", (0..n).map(|i| if i % 10 >= 8 { 1.0 } else { 0.0 }).collect())
//!     .build()
//!     .unwrap();
//! let mut source = InMemorySource::new();
//! source.insert(ds);
//!
//! let engine = Engine::new(source, EngineConfig::default()).unwrap();
//! let report = engine.run(&AnalysisRequest::new("txns", Module::Leakage)).unwrap();
//! let Report::Leakage(leakage) = report else { unreachable!() };
//! assert!(leakage.flags.iter().any(|f| f.feature == "chargeback_amount"));
//! ```

pub mod banding;
pub mod calibration;
pub mod classification;
pub mod config;
pub mod dataframe;
pub mod dataset;
pub mod deadline;
pub mod divergence;
pub mod economics;
pub mod engine;
pub mod error;
pub mod explainability;
pub mod leakage;
pub mod profiler;
pub mod quality;
pub mod reject_inference;
pub mod report;
pub mod root_cause;
pub mod segment;
pub mod stability;
pub mod stats;
pub mod taxonomy;

pub use config::EngineConfig;
pub use dataset::{Dataset, DatasetBuilder};
pub use engine::{AnalysisRequest, DatasetSource, Engine, InMemorySource, Module};
pub use error::RiskError;
pub use report::{Report, ReportStatus, Section};
