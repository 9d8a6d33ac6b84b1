//! Report envelope shared by every analysis module.
//!
//! A module report is a plain struct of [`Section`]s plus a
//! [`ReportStatus`]. Sections whose inputs are missing degrade to
//! [`Section::NotAvailable`] instead of failing the whole report; consumers
//! must tolerate them.
//!
//! ```
//! use u_modelrisk::deadline::Deadline;
//! use u_modelrisk::error::RiskError;
//! use u_modelrisk::report::{run_section, ReportStatus, Section};
//!
//! let mut status = ReportStatus::default();
//! let ok: Section<u32> = run_section(&mut status, &Deadline::unlimited(), "count", || Ok(3)).unwrap();
//! let gone: Section<u32> = run_section(&mut status, &Deadline::unlimited(), "money", || {
//!     Err(RiskError::partial("money", "no monetary column"))
//! })
//! .unwrap();
//! assert_eq!(ok.available(), Some(&3));
//! assert!(!gone.is_available());
//! assert!(status.complete);
//! ```

use crate::calibration::CalibrationReport;
use crate::deadline::Deadline;
use crate::economics::EconomicsReport;
use crate::error::RiskError;
use crate::explainability::ExplainabilityReport;
use crate::leakage::LeakageReport;
use crate::profiler::ProfileReport;
use crate::quality::QualityReport;
use crate::reject_inference::RejectInferenceReport;
use crate::root_cause::RootCauseReport;
use crate::stability::StabilityReport;
use crate::taxonomy::TaxonomyReport;
use serde::Serialize;

// ── Section ───────────────────────────────────────────────────────────

/// One report section: computed, or explicitly not available.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Section<T> {
    Available(T),
    NotAvailable { reason: String },
}

impl<T> Section<T> {
    /// A not-available section.
    pub fn not_available(reason: impl Into<String>) -> Self {
        Self::NotAvailable {
            reason: reason.into(),
        }
    }

    /// Returns `true` for a computed section.
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// The computed value, if any.
    pub fn available(&self) -> Option<&T> {
        match self {
            Self::Available(v) => Some(v),
            Self::NotAvailable { .. } => None,
        }
    }

    /// Why the section is missing, if it is.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Available(_) => None,
            Self::NotAvailable { reason } => Some(reason),
        }
    }
}

/// Severity attached to a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Completion state of a module report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportStatus {
    /// `false` when the deadline expired before every section ran.
    pub complete: bool,
    pub notes: Vec<String>,
}

impl Default for ReportStatus {
    fn default() -> Self {
        Self {
            complete: true,
            notes: Vec::new(),
        }
    }
}

impl ReportStatus {
    /// Starts a status carrying the context's resolution notes.
    pub fn with_notes(notes: &[String]) -> Self {
        Self {
            complete: true,
            notes: notes.to_vec(),
        }
    }

    /// Adds a note.
    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// Marks the report incomplete with a note.
    pub fn mark_incomplete(&mut self, note: impl Into<String>) {
        self.complete = false;
        self.note(note);
    }
}

/// Runs one section under the deadline.
///
/// Degrading errors become [`Section::NotAvailable`]; a timeout (before or
/// during the section) also marks the report incomplete. Any other error is
/// returned.
pub fn run_section<T>(
    status: &mut ReportStatus,
    deadline: &Deadline,
    name: &str,
    compute: impl FnOnce() -> Result<T, RiskError>,
) -> Result<Section<T>, RiskError> {
    let outcome = deadline.check().and_then(|_| compute());
    match outcome {
        Ok(v) => Ok(Section::Available(v)),
        Err(e @ RiskError::ComputationTimeout { .. }) => {
            tracing::warn!(section = name, "deadline expired");
            status.mark_incomplete(format!("{name}: {e}"));
            Ok(Section::not_available(e.to_string()))
        }
        Err(e) if e.is_degrading() => {
            tracing::debug!(section = name, reason = %e, "section not available");
            Ok(Section::not_available(e.to_string()))
        }
        Err(e) => Err(e),
    }
}

// ── Report ────────────────────────────────────────────────────────────

/// Closed set of module reports, tagged by `module` when serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "module", rename_all = "snake_case")]
pub enum Report {
    Profile(ProfileReport),
    Stability(StabilityReport),
    Leakage(LeakageReport),
    Taxonomy(TaxonomyReport),
    RejectInference(RejectInferenceReport),
    Calibration(CalibrationReport),
    Explainability(ExplainabilityReport),
    RootCause(RootCauseReport),
    Economics(EconomicsReport),
    Quality(QualityReport),
}

impl Report {
    /// Completion state of the wrapped report.
    pub fn status(&self) -> &ReportStatus {
        match self {
            Self::Profile(r) => &r.status,
            Self::Stability(r) => &r.status,
            Self::Leakage(r) => &r.status,
            Self::Taxonomy(r) => &r.status,
            Self::RejectInference(r) => &r.status,
            Self::Calibration(r) => &r.status,
            Self::Explainability(r) => &r.status,
            Self::RootCause(r) => &r.status,
            Self::Economics(r) => &r.status,
            Self::Quality(r) => &r.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_deadline_marks_incomplete() {
        let mut status = ReportStatus::default();
        let section: Section<()> =
            run_section(&mut status, &Deadline::from_millis(Some(0)), "drift", || Ok(())).unwrap();
        assert!(!section.is_available());
        assert!(!status.complete);
        assert!(status.notes[0].starts_with("drift"));
    }

    #[test]
    fn terminal_errors_propagate() {
        let mut status = ReportStatus::default();
        let res: Result<Section<()>, _> = run_section(&mut status, &Deadline::unlimited(), "x", || {
            Err(RiskError::Schema("empty".into()))
        });
        assert!(res.is_err());
    }

    #[test]
    fn section_serializes_with_status_tag() {
        let s: Section<u8> = Section::not_available("no score column");
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["status"], "not_available");
        assert_eq!(json["data"]["reason"], "no score column");
        assert_eq!(s.reason(), Some("no score column"));
    }
}
