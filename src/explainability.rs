//! Explainability of score decisions: which features drive the score,
//! whether those drivers stay the same over time, and whether a reviewer
//! can read them.

use crate::config::EngineConfig;
use crate::deadline::Deadline;
use crate::error::RiskError;
use crate::profiler::AnalysisContext;
use crate::report::{run_section, ReportStatus, Section};
use crate::stats;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Configuration for explainability analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainabilityConfig {
    /// Reason codes per decision. Default: 5.
    pub top_n: usize,
    /// Rolling windows for reason-code stability. Default: 3.
    pub windows: usize,
    /// Readable share of top features needed to explain a decision within
    /// a review window. Default: 0.8.
    pub readability_threshold: f64,
    /// Plain-language reason template per feature name.
    pub templates: BTreeMap<String, String>,
}

impl Default for ExplainabilityConfig {
    fn default() -> Self {
        let templates = [
            ("amount", "Transaction amount is unusual for this customer"),
            ("txn_count_1h", "Many transactions in the last hour"),
            ("account_age_days", "Account was opened recently"),
            ("is_cross_border", "Card used outside its home country"),
            ("device_change", "Purchase made from a new device"),
            ("failed_logins", "Recent failed login attempts"),
        ]
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
        Self {
            top_n: 5,
            windows: 3,
            readability_threshold: 0.8,
            templates,
        }
    }
}

impl ExplainabilityConfig {
    /// Sets the number of reason codes.
    pub fn top_n(mut self, n: usize) -> Self {
        self.top_n = n;
        self
    }

    /// Adds a reason template.
    pub fn template(mut self, feature: &str, text: &str) -> Self {
        self.templates.insert(feature.to_string(), text.to_string());
        self
    }
}

/// What contributions are measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionReference {
    Score,
    Target,
}

/// Signed association of a feature with the reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureContribution {
    pub feature: String,
    /// Pearson correlation with the reference.
    pub contribution: f64,
    pub increases_risk: bool,
}

/// Top reason codes inside one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReasonWindow {
    pub index: usize,
    pub size: usize,
    pub top_features: Vec<String>,
}

/// Reason codes across windows, side by side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReasonCodeStability {
    pub windows: Vec<ReasonWindow>,
    /// Jaccard overlap of consecutive windows.
    pub overlaps: Vec<f64>,
    pub mean_overlap: Option<f64>,
}

/// Readability of one top feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReasonReadability {
    pub feature: String,
    pub template: Option<String>,
}

/// Whether top reasons can be read by a reviewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Readability {
    pub features: Vec<ReasonReadability>,
    pub readable_share: f64,
    pub explainable_within_review: bool,
}

/// Explainability report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplainabilityReport {
    pub reference: ContributionReference,
    pub contributions: Section<Vec<FeatureContribution>>,
    pub reason_stability: Section<ReasonCodeStability>,
    pub readability: Section<Readability>,
    pub status: ReportStatus,
}

fn reference(ctx: &AnalysisContext) -> (ContributionReference, Vec<Option<f64>>) {
    match &ctx.score {
        Some(s) => (ContributionReference::Score, s.values.clone()),
        None => (ContributionReference::Target, ctx.target_numeric()),
    }
}

fn ranked_features(ctx: &AnalysisContext, reference: &[Option<f64>], rows: &[usize]) -> Vec<FeatureContribution> {
    let mut out: Vec<FeatureContribution> = ctx
        .features
        .iter()
        .filter_map(|f| {
            let c = stats::pearson_rows(&f.values, reference, rows)?;
            Some(FeatureContribution {
                feature: f.name.clone(),
                contribution: c,
                increases_risk: c > 0.0,
            })
        })
        .collect();
    stats::sort_by_magnitude_desc(&mut out, |c| c.contribution);
    out
}

/// Feature contributions over the whole dataset, strongest first.
pub fn contributions(ctx: &AnalysisContext) -> Result<Vec<FeatureContribution>, RiskError> {
    if ctx.features.is_empty() {
        return Err(RiskError::partial("contributions", "no numeric features"));
    }
    let (_, reference) = reference(ctx);
    let rows: Vec<usize> = (0..reference.len()).collect();
    let ranked = ranked_features(ctx, &reference, &rows);
    if ranked.is_empty() {
        return Err(RiskError::partial("contributions", "no feature varies with the reference"));
    }
    Ok(ranked)
}

fn jaccard(a: &[String], b: &[String]) -> Option<f64> {
    let a: BTreeSet<&String> = a.iter().collect();
    let b: BTreeSet<&String> = b.iter().collect();
    let union = a.union(&b).count();
    stats::count_ratio(a.intersection(&b).count(), union)
}

/// Top-N reason codes per ordered window and their overlap.
pub fn reason_code_stability(
    ctx: &AnalysisContext,
    config: &ExplainabilityConfig,
    deadline: &Deadline,
) -> Result<ReasonCodeStability, RiskError> {
    if ctx.features.is_empty() {
        return Err(RiskError::partial("reason-code stability", "no numeric features"));
    }
    if config.windows < 2 || ctx.order.len() < config.windows * 3 {
        return Err(RiskError::partial(
            "reason-code stability",
            "too few records for the configured windows",
        ));
    }
    let (_, reference) = reference(ctx);
    let mut windows = Vec::with_capacity(config.windows);
    for (index, rows) in stats::contiguous_chunks(&ctx.order, config.windows).iter().enumerate() {
        deadline.check()?;
        let top_features = ranked_features(ctx, &reference, rows)
            .into_iter()
            .take(config.top_n)
            .map(|c| c.feature)
            .collect();
        windows.push(ReasonWindow {
            index,
            size: rows.len(),
            top_features,
        });
    }
    let overlaps: Vec<f64> = windows
        .windows(2)
        .filter_map(|w| jaccard(&w[0].top_features, &w[1].top_features))
        .collect();
    let mean_overlap = stats::mean(&overlaps);
    Ok(ReasonCodeStability {
        windows,
        overlaps,
        mean_overlap,
    })
}

/// Template coverage of the top features.
pub fn readability(top: &[FeatureContribution], config: &ExplainabilityConfig) -> Result<Readability, RiskError> {
    let features: Vec<ReasonReadability> = top
        .iter()
        .take(config.top_n)
        .map(|c| ReasonReadability {
            feature: c.feature.clone(),
            template: config.templates.get(&c.feature).cloned(),
        })
        .collect();
    let readable = features.iter().filter(|f| f.template.is_some()).count();
    let readable_share = stats::count_ratio(readable, features.len())
        .ok_or_else(|| RiskError::partial("readability", "no top features"))?;
    Ok(Readability {
        features,
        readable_share,
        explainable_within_review: readable_share >= config.readability_threshold,
    })
}

/// Runs every explainability section.
pub fn analyze(
    ctx: &AnalysisContext,
    config: &EngineConfig,
    deadline: &Deadline,
) -> Result<ExplainabilityReport, RiskError> {
    tracing::debug!(dataset = ctx.dataset.id(), "explainability analysis");
    let cfg = &config.explainability;
    let mut status = ReportStatus::with_notes(&ctx.notes);
    let (reference, _) = reference(ctx);
    if reference == ContributionReference::Target {
        status.note("no score column; contributions measured against the target");
    }

    let contributions = run_section(&mut status, deadline, "contributions", || contributions(ctx))?;
    let reason_stability = run_section(&mut status, deadline, "reason-code stability", || {
        reason_code_stability(ctx, cfg, deadline)
    })?;
    let readability = match contributions.available() {
        Some(top) => run_section(&mut status, deadline, "readability", || readability(top, cfg))?,
        None => Section::not_available("contributions not available"),
    };

    Ok(ExplainabilityReport {
        reference,
        contributions,
        reason_stability,
        readability,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Dataset, DatasetBuilder};
    use crate::profiler::ProfilerConfig;

    fn scored() -> Dataset {
        let n = 90;
        let amount: Vec<f64> = (0..n).map(|i| ((i * 13) % 17) as f64 * 10.0).collect();
        let failed_logins: Vec<f64> = (0..n).map(|i| ((i * 5) % 7) as f64).collect();
        let score: Vec<f64> = (0..n)
            .map(|i| (amount[i] / 400.0 + failed_logins[i] / 30.0).min(1.0))
            .collect();
        let label: Vec<f64> = score.iter().map(|s| f64::from(*s > 0.45)).collect();
        DatasetBuilder::new("x")
            .numeric("amount", amount)
            .numeric("failed_logins", failed_logins)
            .numeric("score", score)
            .numeric("is_fraud", label)
            .build()
            .unwrap()
    }

    #[test]
    fn contributions_rank_by_magnitude() {
        let ds = scored();
        let ctx = AnalysisContext::build(&ds, None, None, &ProfilerConfig::default()).unwrap();
        let c = contributions(&ctx).unwrap();
        assert_eq!(c[0].feature, "amount");
        assert!(c[0].increases_risk);
        assert!(c[0].contribution.abs() >= c[1].contribution.abs());
    }

    #[test]
    fn stable_drivers_overlap_fully() {
        let ds = scored();
        let ctx = AnalysisContext::build(&ds, None, None, &ProfilerConfig::default()).unwrap();
        let s = reason_code_stability(&ctx, &ExplainabilityConfig::default(), &Deadline::unlimited()).unwrap();
        assert_eq!(s.windows.len(), 3);
        assert_eq!(s.mean_overlap, Some(1.0));
    }

    #[test]
    fn readability_share_against_threshold() {
        let top = vec![
            FeatureContribution { feature: "amount".into(), contribution: 0.9, increases_risk: true },
            FeatureContribution { feature: "f_17".into(), contribution: 0.5, increases_risk: true },
        ];
        let r = readability(&top, &ExplainabilityConfig::default()).unwrap();
        assert_eq!(r.readable_share, 0.5);
        assert!(!r.explainable_within_review);
        let cfg = ExplainabilityConfig::default().template("f_17", "Merchant category is high risk");
        assert!(readability(&top, &cfg).unwrap().explainable_within_review);
    }

    #[test]
    fn jaccard_of_disjoint_sets_is_zero() {
        let a = vec!["x".to_string()];
        let b = vec!["y".to_string()];
        assert_eq!(jaccard(&a, &b), Some(0.0));
        assert_eq!(jaccard(&[], &[]), None);
    }
}
