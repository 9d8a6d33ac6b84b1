//! False-positive root cause: what the wrongly flagged records have in
//! common.

use crate::classification::ConfusionMatrix;
use crate::config::EngineConfig;
use crate::deadline::Deadline;
use crate::error::RiskError;
use crate::profiler::AnalysisContext;
use crate::report::{run_section, ReportStatus, Section};
use crate::segment::group_by;
use crate::stats::{self, count_ratio};
use serde::{Deserialize, Serialize};

/// Configuration for false-positive root cause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootCauseConfig {
    /// `|z|` above which a feature is over-weighted among false positives.
    /// Default: 0.5.
    pub z_cutoff: f64,
}

impl Default for RootCauseConfig {
    fn default() -> Self {
        Self { z_cutoff: 0.5 }
    }
}

/// Feature shift inside the false-positive subset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FalsePositiveDriver {
    pub feature: String,
    pub z: f64,
    pub fp_mean: f64,
    pub population_mean: f64,
    pub over_weighted: bool,
}

/// False-positive rate of one segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentFpRate {
    pub dimension: String,
    pub value: String,
    pub negatives: usize,
    pub false_positives: usize,
    /// FP ÷ labeled negatives.
    pub fp_rate: Option<f64>,
    /// Share of all false positives that fall in this segment.
    pub fp_share: Option<f64>,
}

/// Amounts of false positives against true positives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonetaryComparison {
    pub column: String,
    pub fp_count: usize,
    pub tp_count: usize,
    pub fp_total: f64,
    pub tp_total: f64,
    pub fp_mean: Option<f64>,
    pub tp_mean: Option<f64>,
    pub fp_median: Option<f64>,
    pub tp_median: Option<f64>,
}

/// False-positive root-cause report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RootCauseReport {
    pub threshold: f64,
    pub matrix: Section<ConfusionMatrix>,
    pub drivers: Section<Vec<FalsePositiveDriver>>,
    pub segment_fp_rates: Section<Vec<SegmentFpRate>>,
    pub monetary: Section<MonetaryComparison>,
    pub status: ReportStatus,
}

/// Row masks of false and true positives at `threshold`.
fn outcome_masks(ctx: &AnalysisContext, threshold: f64) -> Result<(Vec<bool>, Vec<bool>), RiskError> {
    let score = ctx.require_score("false-positive root cause")?;
    let flagged = |i: usize| score.values[i].is_some_and(|s| s >= threshold);
    let n = ctx.labels.len();
    let fp = (0..n).map(|i| flagged(i) && ctx.labels[i] == Some(false)).collect();
    let tp = (0..n).map(|i| flagged(i) && ctx.labels[i] == Some(true)).collect();
    Ok((fp, tp))
}

/// Confusion matrix over scored, labeled rows.
pub fn decision_matrix(ctx: &AnalysisContext, threshold: f64) -> Result<ConfusionMatrix, RiskError> {
    let score = ctx.require_score("confusion matrix")?;
    let rows = ctx.scored_labeled_rows();
    if rows.is_empty() {
        return Err(RiskError::partial("confusion matrix", "no rows with both score and label"));
    }
    let mut cm = ConfusionMatrix::default();
    for i in rows {
        if let (Some(s), Some(l)) = (score.values[i], ctx.labels[i]) {
            cm.record(l, s >= threshold);
        }
    }
    Ok(cm)
}

/// Features ranked by their standardized shift among false positives.
pub fn false_positive_drivers(
    ctx: &AnalysisContext,
    threshold: f64,
    config: &RootCauseConfig,
    deadline: &Deadline,
) -> Result<Vec<FalsePositiveDriver>, RiskError> {
    let (fp, _) = outcome_masks(ctx, threshold)?;
    if !fp.iter().any(|&m| m) {
        return Err(RiskError::partial("false-positive drivers", "no false positives at this threshold"));
    }
    let mut drivers = Vec::new();
    for f in &ctx.features {
        deadline.check()?;
        if let Some(dev) = stats::zscore_deviation(&f.values, &fp) {
            drivers.push(FalsePositiveDriver {
                feature: f.name.clone(),
                z: dev.z,
                fp_mean: dev.subset_mean,
                population_mean: dev.population_mean,
                over_weighted: dev.z.abs() > config.z_cutoff,
            });
        }
    }
    stats::sort_by_magnitude_desc(&mut drivers, |d| d.z);
    Ok(drivers)
}

/// False-positive rate per segment of every dimension.
pub fn segment_fp_rates(
    ctx: &AnalysisContext,
    threshold: f64,
    max_segments: usize,
    deadline: &Deadline,
) -> Result<Vec<SegmentFpRate>, RiskError> {
    let (fp, _) = outcome_masks(ctx, threshold)?;
    if ctx.dimensions.is_empty() {
        return Err(RiskError::partial("segment false-positive rates", "no segment dimension"));
    }
    let total_fp = fp.iter().filter(|&&m| m).count();
    let mut out = Vec::new();
    for dim in &ctx.dimensions {
        for (value, rows) in group_by(&dim.values, max_segments) {
            deadline.check()?;
            let negatives = rows.iter().filter(|&&i| ctx.labels[i] == Some(false)).count();
            let false_positives = rows.iter().filter(|&&i| fp[i]).count();
            out.push(SegmentFpRate {
                dimension: dim.name.clone(),
                value,
                negatives,
                false_positives,
                fp_rate: count_ratio(false_positives, negatives),
                fp_share: count_ratio(false_positives, total_fp),
            });
        }
    }
    Ok(out)
}

/// Amount distribution of false positives against true positives.
pub fn monetary_comparison(ctx: &AnalysisContext, threshold: f64) -> Result<MonetaryComparison, RiskError> {
    let money = ctx
        .monetary
        .as_ref()
        .ok_or_else(|| RiskError::partial("monetary comparison", "no monetary column"))?;
    let (fp, tp) = outcome_masks(ctx, threshold)?;
    let pick = |mask: &[bool]| -> Vec<f64> {
        (0..mask.len())
            .filter(|&i| mask[i])
            .filter_map(|i| money.values[i])
            .collect()
    };
    let (fp_amounts, tp_amounts) = (pick(&fp), pick(&tp));
    Ok(MonetaryComparison {
        column: money.name.clone(),
        fp_count: fp.iter().filter(|&&m| m).count(),
        tp_count: tp.iter().filter(|&&m| m).count(),
        fp_total: fp_amounts.iter().sum(),
        tp_total: tp_amounts.iter().sum(),
        fp_mean: stats::mean(&fp_amounts),
        tp_mean: stats::mean(&tp_amounts),
        fp_median: stats::median(&fp_amounts),
        tp_median: stats::median(&tp_amounts),
    })
}

/// Runs every root-cause section at the decision threshold.
pub fn analyze(
    ctx: &AnalysisContext,
    config: &EngineConfig,
    deadline: &Deadline,
) -> Result<RootCauseReport, RiskError> {
    let threshold = config.decision_threshold;
    tracing::debug!(dataset = ctx.dataset.id(), threshold, "root-cause analysis");
    let mut status = ReportStatus::with_notes(&ctx.notes);

    let matrix = run_section(&mut status, deadline, "confusion matrix", || {
        decision_matrix(ctx, threshold)
    })?;
    let drivers = run_section(&mut status, deadline, "false-positive drivers", || {
        false_positive_drivers(ctx, threshold, &config.root_cause, deadline)
    })?;
    let segment_fp_rates = run_section(&mut status, deadline, "segment false-positive rates", || {
        segment_fp_rates(ctx, threshold, config.segment.max_segments, deadline)
    })?;
    let monetary = run_section(&mut status, deadline, "monetary comparison", || {
        monetary_comparison(ctx, threshold)
    })?;

    Ok(RootCauseReport {
        threshold,
        matrix,
        drivers,
        segment_fp_rates,
        monetary,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Dataset, DatasetBuilder};
    use crate::profiler::ProfilerConfig;

    /// Flagged legit records are the ones with a new device.
    fn alerts() -> Dataset {
        let n = 60;
        let device_change: Vec<f64> = (0..n).map(|i| f64::from(i % 6 == 0 || i % 6 == 1)).collect();
        let tenure: Vec<f64> = (0..n).map(|i| (i % 5) as f64).collect();
        let score: Vec<f64> = (0..n).map(|i| if i % 6 <= 1 { 0.8 } else { 0.2 }).collect();
        let label: Vec<f64> = (0..n).map(|i| f64::from(i % 6 == 0)).collect();
        let channel: Vec<&str> = (0..n).map(|i| if i % 12 < 6 { "web" } else { "app" }).collect();
        DatasetBuilder::new("alerts")
            .numeric("device_change", device_change)
            .numeric("tenure", tenure)
            .numeric("score", score)
            .numeric("is_fraud", label)
            .categories("channel", channel)
            .build()
            .unwrap()
    }

    #[test]
    fn device_change_drives_false_positives() {
        let ds = alerts();
        let ctx = AnalysisContext::build(&ds, None, None, &ProfilerConfig::default()).unwrap();
        let drivers = false_positive_drivers(&ctx, 0.5, &RootCauseConfig::default(), &Deadline::unlimited())
            .unwrap();
        assert_eq!(drivers[0].feature, "device_change");
        assert!(drivers[0].over_weighted);
        assert!(drivers[0].z > 0.5);
    }

    #[test]
    fn segment_fp_rate_uses_negatives() {
        let ds = alerts();
        let ctx = AnalysisContext::build(&ds, None, None, &ProfilerConfig::default()).unwrap();
        let rates = segment_fp_rates(&ctx, 0.5, 50, &Deadline::unlimited()).unwrap();
        let web = rates.iter().find(|r| r.value == "web").unwrap();
        assert_eq!(web.negatives, 25);
        assert_eq!(web.false_positives, 5);
        assert_eq!(web.fp_rate, Some(0.2));
        assert_eq!(web.fp_share, Some(0.5));
    }

    #[test]
    fn monetary_section_requires_amounts() {
        let ds = alerts();
        let ctx = AnalysisContext::build(&ds, None, None, &ProfilerConfig::default()).unwrap();
        let report = analyze(&ctx, &EngineConfig::default(), &Deadline::unlimited()).unwrap();
        assert!(report.matrix.is_available());
        assert_eq!(report.matrix.available().unwrap().false_positive, 10);
        assert!(report.monetary.reason().unwrap().contains("monetary"));
    }
}
