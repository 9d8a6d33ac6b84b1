//! Reject inference: what the model's declines would have turned out to be.
//!
//! Declined records rarely get an outcome label, so decline-side precision
//! is observed on a biased sample. This module reports what is observed,
//! brackets the unobserved part with fraud-rate scenarios drawn from
//! similarly-scored approvals, and measures how different the declined
//! population looks from the approved one.

use crate::config::EngineConfig;
use crate::deadline::Deadline;
use crate::error::RiskError;
use crate::profiler::AnalysisContext;
use crate::report::{run_section, ReportStatus, Section};
use crate::stats::{self, count_ratio};
use serde::{Deserialize, Serialize};

/// Configuration for reject inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RejectInferenceConfig {
    /// Decline cutoff; the engine decision threshold when unset.
    pub cutoff: Option<f64>,
    /// Approvals scored within this distance below the cutoff are "similar".
    /// Default: 0.1.
    pub similar_score_band: f64,
    /// Multipliers on the similar-approval fraud rate. Default: 1, 2, 5.
    pub multipliers: Vec<f64>,
    /// `|standardized difference|` at which a feature gap is a bias. Default: 0.5.
    pub bias_effect_size: f64,
}

impl Default for RejectInferenceConfig {
    fn default() -> Self {
        Self {
            cutoff: None,
            similar_score_band: 0.1,
            multipliers: vec![1.0, 2.0, 5.0],
            bias_effect_size: 0.5,
        }
    }
}

impl RejectInferenceConfig {
    /// Sets the decline cutoff.
    pub fn cutoff(mut self, cutoff: f64) -> Self {
        self.cutoff = Some(cutoff);
        self
    }

    /// Sets the scenario multipliers.
    pub fn multipliers(mut self, multipliers: Vec<f64>) -> Self {
        self.multipliers = multipliers;
        self
    }
}

/// Observed split between declines and approvals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeclineSummary {
    pub declined: usize,
    pub approved: usize,
    pub declined_labeled: usize,
    pub declined_fraud: usize,
    /// Fraud share among labeled declines.
    pub observed_decline_precision: Option<f64>,
    /// Labeled share of declines.
    pub decline_label_coverage: Option<f64>,
    /// Fraud rate of labeled approvals just under the cutoff.
    pub similar_approval_fraud_rate: Option<f64>,
    pub similar_approval_count: usize,
}

/// Estimated decline outcome under one fraud-rate assumption.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectScenario {
    pub multiplier: f64,
    /// Fraud rate assumed for unlabeled declines.
    pub assumed_fraud_rate: f64,
    pub estimated_fraud: f64,
    pub estimated_legit_blocked: f64,
    pub estimated_precision: Option<f64>,
}

/// Distribution gap of one feature between declined and approved records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureGap {
    pub feature: String,
    pub mean_diff: Option<f64>,
    pub median_diff: Option<f64>,
    pub p90_diff: Option<f64>,
    /// Mean difference over the pooled standard deviation.
    pub standardized_diff: Option<f64>,
    pub biased: bool,
}

/// Reject inference report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectInferenceReport {
    pub cutoff: f64,
    pub summary: Section<DeclineSummary>,
    pub scenarios: Section<Vec<RejectScenario>>,
    pub feature_gaps: Section<Vec<FeatureGap>>,
    pub recommendations: Vec<String>,
    pub status: ReportStatus,
}

struct Split {
    declined: Vec<usize>,
    approved: Vec<usize>,
}

fn split(ctx: &AnalysisContext, cutoff: f64) -> Result<Split, RiskError> {
    let score = ctx.require_score("reject inference")?;
    let (mut declined, mut approved) = (Vec::new(), Vec::new());
    for (i, s) in score.values.iter().enumerate() {
        match s {
            Some(s) if *s >= cutoff => declined.push(i),
            Some(_) => approved.push(i),
            None => {}
        }
    }
    if declined.is_empty() {
        return Err(RiskError::partial(
            "reject inference",
            format!("no record scored at or above cutoff {cutoff:.3}"),
        ));
    }
    Ok(Split { declined, approved })
}

/// Observed decline metrics and the similar-approval fraud rate.
pub fn decline_summary(
    ctx: &AnalysisContext,
    cutoff: f64,
    config: &RejectInferenceConfig,
) -> Result<DeclineSummary, RiskError> {
    let split = split(ctx, cutoff)?;
    let score = ctx.require_score("reject inference")?;
    let labeled = |rows: &[usize]| rows.iter().filter(|&&i| ctx.labels[i].is_some()).count();
    let fraud = |rows: &[usize]| rows.iter().filter(|&&i| ctx.labels[i] == Some(true)).count();

    let similar: Vec<usize> = split
        .approved
        .iter()
        .copied()
        .filter(|&i| score.values[i].is_some_and(|s| s >= cutoff - config.similar_score_band))
        .collect();
    let similar_rate = count_ratio(fraud(&similar), labeled(&similar))
        .or_else(|| count_ratio(fraud(&split.approved), labeled(&split.approved)));

    let declined_labeled = labeled(&split.declined);
    let declined_fraud = fraud(&split.declined);
    Ok(DeclineSummary {
        declined: split.declined.len(),
        approved: split.approved.len(),
        declined_labeled,
        declined_fraud,
        observed_decline_precision: count_ratio(declined_fraud, declined_labeled),
        decline_label_coverage: count_ratio(declined_labeled, split.declined.len()),
        similar_approval_fraud_rate: similar_rate,
        similar_approval_count: similar.len(),
    })
}

/// Estimated decline precision under each multiplier of the
/// similar-approval fraud rate.
///
/// Unlabeled declines are assumed fraudulent at `min(rate × m, 1)`.
pub fn reject_scenarios(summary: &DeclineSummary, multipliers: &[f64]) -> Result<Vec<RejectScenario>, RiskError> {
    let base = summary.similar_approval_fraud_rate.ok_or_else(|| {
        RiskError::partial("reject scenarios", "no labeled approvals to anchor a fraud rate")
    })?;
    let unlabeled = (summary.declined - summary.declined_labeled) as f64;
    Ok(multipliers
        .iter()
        .map(|&m| {
            let rate = (base * m).clamp(0.0, 1.0);
            let estimated_fraud = summary.declined_fraud as f64 + unlabeled * rate;
            RejectScenario {
                multiplier: m,
                assumed_fraud_rate: rate,
                estimated_fraud,
                estimated_legit_blocked: summary.declined as f64 - estimated_fraud,
                estimated_precision: stats::ratio(estimated_fraud, summary.declined as f64),
            }
        })
        .collect())
}

/// Declined vs approved distribution gap per feature.
pub fn feature_gaps(
    ctx: &AnalysisContext,
    cutoff: f64,
    config: &RejectInferenceConfig,
    deadline: &Deadline,
) -> Result<Vec<FeatureGap>, RiskError> {
    let split = split(ctx, cutoff)?;
    if split.approved.is_empty() {
        return Err(RiskError::partial("feature gaps", "no approved records"));
    }
    if ctx.features.is_empty() {
        return Err(RiskError::partial("feature gaps", "no numeric features"));
    }
    let diff = |a: Option<f64>, b: Option<f64>| Some(a? - b?);

    let mut gaps = Vec::with_capacity(ctx.features.len());
    for f in &ctx.features {
        deadline.check()?;
        let d = stats::present_at(&f.values, &split.declined);
        let a = stats::present_at(&f.values, &split.approved);
        let mean_diff = diff(stats::mean(&d), stats::mean(&a));
        let pooled = match (stats::std_dev(&d), stats::std_dev(&a)) {
            (Some(sd), Some(sa)) => Some(((sd * sd + sa * sa) / 2.0).sqrt()),
            _ => None,
        };
        let standardized_diff = mean_diff
            .zip(pooled)
            .and_then(|(m, p)| stats::ratio(m, p).filter(|_| p > 1e-12));
        gaps.push(FeatureGap {
            feature: f.name.clone(),
            mean_diff,
            median_diff: diff(stats::median(&d), stats::median(&a)),
            p90_diff: diff(stats::quantile(&d, 0.9), stats::quantile(&a, 0.9)),
            standardized_diff,
            biased: standardized_diff.is_some_and(|s| s.abs() >= config.bias_effect_size),
        });
    }
    stats::sort_by_magnitude_desc(&mut gaps, |g| g.standardized_diff.unwrap_or(f64::NAN));
    Ok(gaps)
}

fn recommendations(
    summary: Option<&DeclineSummary>,
    gaps: Option<&Vec<FeatureGap>>,
) -> Vec<String> {
    let mut out = vec![
        "Route a small random sample of would-be declines through approval to observe true outcomes."
            .to_string(),
        "Treat decline-side precision as an estimate bounded by the scenarios, not a measurement."
            .to_string(),
    ];
    if summary.and_then(|s| s.decline_label_coverage).is_some_and(|c| c < 0.5) {
        out.push(
            "Most declines carry no outcome; backfill labels from chargeback and manual review data."
                .to_string(),
        );
    }
    let biased: Vec<&str> = gaps
        .map(|g| g.iter().filter(|g| g.biased).map(|g| g.feature.as_str()).collect())
        .unwrap_or_default();
    if !biased.is_empty() {
        out.push(format!(
            "Declined population differs on {}; reweight approved records before retraining.",
            biased.join(", ")
        ));
    }
    out
}

/// Runs reject inference at the configured cutoff.
pub fn analyze(
    ctx: &AnalysisContext,
    config: &EngineConfig,
    deadline: &Deadline,
) -> Result<RejectInferenceReport, RiskError> {
    let cfg = &config.reject_inference;
    let cutoff = cfg.cutoff.unwrap_or(config.decision_threshold);
    tracing::debug!(dataset = ctx.dataset.id(), cutoff, "reject inference");
    let mut status = ReportStatus::with_notes(&ctx.notes);

    let summary = run_section(&mut status, deadline, "decline summary", || {
        decline_summary(ctx, cutoff, cfg)
    })?;
    let scenarios = match summary.available() {
        Some(s) => run_section(&mut status, deadline, "reject scenarios", || {
            reject_scenarios(s, &cfg.multipliers)
        })?,
        None => Section::not_available("decline summary not available"),
    };
    let feature_gaps = run_section(&mut status, deadline, "feature gaps", || {
        feature_gaps(ctx, cutoff, cfg, deadline)
    })?;
    let recommendations = recommendations(summary.available(), feature_gaps.available());

    Ok(RejectInferenceReport {
        cutoff,
        summary,
        scenarios,
        feature_gaps,
        recommendations,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Dataset, DatasetBuilder};
    use crate::profiler::ProfilerConfig;

    /// 100 records: scores 0.00..0.99; declines (>= 0.5) mostly unlabeled.
    fn book() -> Dataset {
        let score: Vec<f64> = (0..100).map(|i| i as f64 / 100.0).collect();
        let label: Vec<Option<f64>> = (0..100)
            .map(|i| match i {
                // 10 labeled declines, 4 fraud
                50..=59 => Some(f64::from(i < 54)),
                60..=99 => None,
                // similar approvals 40..49: 2 fraud of 10
                40..=49 => Some(f64::from(i < 42)),
                _ => Some(0.0),
            })
            .collect();
        let velocity: Vec<f64> = (0..100).map(|i| if i >= 50 { 10.0 + (i % 3) as f64 } else { (i % 3) as f64 }).collect();
        DatasetBuilder::new("book")
            .numeric("score", score)
            .numeric_opt("is_fraud", label)
            .numeric("velocity", velocity)
            .build()
            .unwrap()
    }

    #[test]
    fn summary_uses_similar_approvals() {
        let ds = book();
        let ctx = AnalysisContext::build(&ds, None, None, &ProfilerConfig::default()).unwrap();
        let s = decline_summary(&ctx, 0.5, &RejectInferenceConfig::default()).unwrap();
        assert_eq!(s.declined, 50);
        assert_eq!(s.declined_labeled, 10);
        assert_eq!(s.declined_fraud, 4);
        assert_eq!(s.observed_decline_precision, Some(0.4));
        assert_eq!(s.similar_approval_count, 10);
        assert_eq!(s.similar_approval_fraud_rate, Some(0.2));
    }

    #[test]
    fn scenarios_scale_and_cap() {
        let ds = book();
        let ctx = AnalysisContext::build(&ds, None, None, &ProfilerConfig::default()).unwrap();
        let s = decline_summary(&ctx, 0.5, &RejectInferenceConfig::default()).unwrap();
        let scenarios = reject_scenarios(&s, &[1.0, 2.0, 10.0]).unwrap();
        // 4 observed + 40 unlabeled × 0.2
        assert!((scenarios[0].estimated_fraud - 12.0).abs() < 1e-9);
        assert!((scenarios[1].estimated_fraud - 20.0).abs() < 1e-9);
        assert_eq!(scenarios[2].assumed_fraud_rate, 1.0);
        assert!((scenarios[2].estimated_legit_blocked - 6.0).abs() < 1e-9);
    }

    #[test]
    fn feature_gap_flags_bias() {
        let ds = book();
        let ctx = AnalysisContext::build(&ds, None, None, &ProfilerConfig::default()).unwrap();
        let gaps = feature_gaps(&ctx, 0.5, &RejectInferenceConfig::default(), &Deadline::unlimited()).unwrap();
        let v = &gaps[0];
        assert_eq!(v.feature, "velocity");
        assert!((v.mean_diff.unwrap() - 10.0).abs() < 0.1);
        assert!(v.biased);
    }

    #[test]
    fn recommendations_always_emitted() {
        let ds = DatasetBuilder::new("noscore")
            .numeric("is_fraud", vec![0.0, 1.0, 0.0])
            .build()
            .unwrap();
        let ctx = AnalysisContext::build(&ds, None, None, &ProfilerConfig::default()).unwrap();
        let report = analyze(&ctx, &EngineConfig::default(), &Deadline::unlimited()).unwrap();
        assert!(!report.summary.is_available());
        assert!(!report.scenarios.is_available());
        assert!(report.recommendations.len() >= 2);
    }
}
