//! Target leakage detection.
//!
//! A feature that tracks the outcome too closely was probably recorded after
//! the outcome was known. Two independent checks:
//! - correlation with the target (critical above 0.95, high above 0.7)
//! - feature names that suggest post-outcome collection (`chargeback`,
//!   `refund`, `_after`, ...)

use crate::config::EngineConfig;
use crate::deadline::Deadline;
use crate::error::RiskError;
use crate::profiler::AnalysisContext;
use crate::report::{ReportStatus, Severity};
use crate::stats;
use serde::{Deserialize, Serialize};

/// Configuration for leakage detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeakageConfig {
    /// `|corr|` above this is confirmed leakage. Default: 0.95.
    pub critical_correlation: f64,
    /// `|corr|` above this is potential leakage. Default: 0.7.
    pub high_correlation: f64,
    /// Lowercase name fragments that suggest post-outcome data.
    pub post_outcome_patterns: Vec<String>,
}

impl Default for LeakageConfig {
    fn default() -> Self {
        Self {
            critical_correlation: 0.95,
            high_correlation: 0.7,
            post_outcome_patterns: [
                "chargeback",
                "refund",
                "dispute",
                "investigation",
                "outcome",
                "resolved",
                "confirmed",
                "_after",
                "post_",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
        }
    }
}

impl LeakageConfig {
    /// Sets the post-outcome name patterns.
    pub fn post_outcome_patterns(mut self, patterns: Vec<String>) -> Self {
        self.post_outcome_patterns = patterns;
        self
    }
}

/// Kind of leakage evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeakageKind {
    LeakageDetected,
    PotentialLeakage,
    PostOutcomeName,
}

/// One leakage finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeakageFlag {
    pub feature: String,
    pub kind: LeakageKind,
    pub severity: Severity,
    pub correlation: Option<f64>,
    pub description: String,
    pub recommended_action: String,
}

/// Worst leakage evidence present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeakageVerdict {
    NoLeakage,
    VerifyTiming,
    PotentialLeakage,
    LeakageDetected,
}

/// Correlation of one feature with the target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetCorrelation {
    pub feature: String,
    pub correlation: f64,
}

/// Leakage report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeakageReport {
    pub target: String,
    pub features_checked: usize,
    /// Sorted by `|correlation|` descending.
    pub correlations: Vec<TargetCorrelation>,
    /// Sorted by severity descending.
    pub flags: Vec<LeakageFlag>,
    pub verdict: LeakageVerdict,
    pub status: ReportStatus,
}

fn correlation_flag(feature: &str, corr: f64, config: &LeakageConfig) -> Option<LeakageFlag> {
    let magnitude = corr.abs();
    if magnitude > config.critical_correlation {
        Some(LeakageFlag {
            feature: feature.to_string(),
            kind: LeakageKind::LeakageDetected,
            severity: Severity::Critical,
            correlation: Some(corr),
            description: format!(
                "correlation {corr:.3} with the target; the feature almost restates the outcome"
            ),
            recommended_action: "drop the feature before training".into(),
        })
    } else if magnitude > config.high_correlation {
        Some(LeakageFlag {
            feature: feature.to_string(),
            kind: LeakageKind::PotentialLeakage,
            severity: Severity::High,
            correlation: Some(corr),
            description: format!("correlation {corr:.3} with the target is unusually strong"),
            recommended_action: "confirm the feature is available at decision time".into(),
        })
    } else {
        None
    }
}

fn name_flag(feature: &str, corr: Option<f64>, config: &LeakageConfig) -> Option<LeakageFlag> {
    let lower = feature.to_lowercase();
    let pattern = config
        .post_outcome_patterns
        .iter()
        .find(|p| lower.contains(p.to_lowercase().as_str()))?;
    Some(LeakageFlag {
        feature: feature.to_string(),
        kind: LeakageKind::PostOutcomeName,
        severity: Severity::Medium,
        correlation: corr,
        description: format!("name matches post-outcome pattern '{pattern}'"),
        recommended_action: "verify collection timing".into(),
    })
}

/// Checks every non-target feature for leakage.
pub fn analyze(
    ctx: &AnalysisContext,
    config: &EngineConfig,
    deadline: &Deadline,
) -> Result<LeakageReport, RiskError> {
    let cfg = &config.leakage;
    let target = ctx.target_numeric();
    let mut status = ReportStatus::with_notes(&ctx.notes);
    let mut correlations = Vec::new();
    let mut flags = Vec::new();
    let mut checked = 0usize;

    for f in &ctx.features {
        if deadline.expired() {
            status.mark_incomplete(format!("deadline expired after {checked} features"));
            break;
        }
        checked += 1;
        let corr = stats::pearson_pairwise(&f.values, &target);
        if let Some(c) = corr {
            correlations.push(TargetCorrelation {
                feature: f.name.clone(),
                correlation: c,
            });
            flags.extend(correlation_flag(&f.name, c, cfg));
        }
        flags.extend(name_flag(&f.name, corr, cfg));
    }
    if status.complete {
        for name in &ctx.profile.roles.categorical_features {
            checked += 1;
            flags.extend(name_flag(name, None, cfg));
        }
    }

    stats::sort_by_magnitude_desc(&mut correlations, |c| c.correlation);
    flags.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.feature.cmp(&b.feature)));
    let verdict = match flags.first().map(|f| f.kind) {
        None => LeakageVerdict::NoLeakage,
        Some(_) => flags
            .iter()
            .map(|f| match f.kind {
                LeakageKind::LeakageDetected => LeakageVerdict::LeakageDetected,
                LeakageKind::PotentialLeakage => LeakageVerdict::PotentialLeakage,
                LeakageKind::PostOutcomeName => LeakageVerdict::VerifyTiming,
            })
            .max()
            .unwrap_or(LeakageVerdict::NoLeakage),
    };
    if verdict == LeakageVerdict::LeakageDetected {
        tracing::warn!(dataset = ctx.dataset.id(), flags = flags.len(), "target leakage detected");
    }

    Ok(LeakageReport {
        target: ctx.profile.target.column.clone(),
        features_checked: checked,
        correlations,
        flags,
        verdict,
        status,
    })
}
