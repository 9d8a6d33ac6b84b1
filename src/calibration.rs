//! Score calibration: does a score of 0.3 mean a 30% fraud rate?
//!
//! Scored, labeled records are split into equal-frequency bins by score;
//! each bin compares its mean predicted score with the realized fraud rate.
//! The segment view checks whether the same score carries the same risk
//! across segment values.
//!
//! ```
//! use u_modelrisk::calibration::{calibration_curve, CalibrationVerdict};
//!
//! let scores: Vec<Option<f64>> = (0..100).map(|i| Some(if i < 50 { 0.1 } else { 0.9 })).collect();
//! let labels: Vec<Option<bool>> = (0..100)
//!     .map(|i| Some(if i < 50 { i % 10 == 0 } else { i % 10 != 0 }))
//!     .collect();
//! let curve = calibration_curve(&scores, &labels, 2).unwrap();
//! assert_eq!(curve.bins.len(), 2);
//! assert_eq!(curve.verdict, CalibrationVerdict::WellCalibrated);
//! ```

use crate::banding::{self, Closed};
use crate::config::EngineConfig;
use crate::deadline::Deadline;
use crate::error::RiskError;
use crate::profiler::AnalysisContext;
use crate::report::{run_section, ReportStatus, Section};
use crate::segment::group_by;
use crate::stats::{self, count_ratio};
use serde::{Deserialize, Serialize};

/// Configuration for calibration analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Equal-frequency bins. Default: 10.
    pub bins: usize,
    /// Segment-vs-global rate gap that is flagged. Default: 0.02.
    pub segment_gap_threshold: f64,
    /// Minimum scored, labeled records per segment. Default: 10.
    pub min_segment_size: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            bins: 10,
            segment_gap_threshold: 0.02,
            min_segment_size: 10,
        }
    }
}

impl CalibrationConfig {
    /// Sets the bin count.
    pub fn bins(mut self, n: usize) -> Self {
        self.bins = n;
        self
    }
}

/// Calibration quality from the count-weighted mean bin error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationVerdict {
    WellCalibrated,
    Acceptable,
    NeedsRecalibration,
}

impl CalibrationVerdict {
    fn of(error: f64) -> Option<Self> {
        banding::fixed(
            &[0.05, 0.10],
            &[Self::WellCalibrated, Self::Acceptable, Self::NeedsRecalibration],
            Closed::Right,
        )
        .classify(error)
    }
}

/// One score bin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationBin {
    pub index: usize,
    pub count: usize,
    pub score_min: f64,
    pub score_max: f64,
    pub mean_predicted: f64,
    /// Realized fraud rate (0–1).
    pub actual_rate: f64,
    /// `|actual_rate - mean_predicted|`.
    pub abs_error: f64,
    #[serde(skip)]
    rows: Vec<usize>,
}

/// Reliability curve over all scored, labeled records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationCurve {
    /// Scored, labeled records; equals the sum of bin counts.
    pub population: usize,
    pub bins: Vec<CalibrationBin>,
    /// Count-weighted mean of bin errors.
    pub mean_error: f64,
    pub monotonicity_violations: usize,
    /// `1 - violations / (bins - 1)`.
    pub monotonicity_score: f64,
    pub brier_score: f64,
    pub verdict: CalibrationVerdict,
}

impl CalibrationCurve {
    /// Bin whose score range holds `score` (the nearest bin outside all
    /// ranges).
    fn bin_for(&self, score: f64) -> Option<&CalibrationBin> {
        self.bins
            .iter()
            .find(|b| score <= b.score_max)
            .or_else(|| self.bins.last())
    }
}

/// Builds the reliability curve from row-aligned scores and labels.
pub fn calibration_curve(
    scores: &[Option<f64>],
    labels: &[Option<bool>],
    bins: usize,
) -> Result<CalibrationCurve, RiskError> {
    if bins == 0 {
        return Err(RiskError::InvalidParameter {
            name: "bins".into(),
            message: "must be positive".into(),
        });
    }
    let rows: Vec<usize> = (0..scores.len().min(labels.len()))
        .filter(|&i| scores[i].is_some() && labels[i].is_some())
        .collect();
    if rows.is_empty() {
        return Err(RiskError::partial("calibration", "no rows with both score and label"));
    }
    let key: Vec<f64> = scores.iter().map(|s| s.unwrap_or(f64::NAN)).collect();
    let label = |i: usize| f64::from(labels[i] == Some(true));

    let bins: Vec<CalibrationBin> = stats::equal_frequency_groups(&rows, &key, bins)
        .into_iter()
        .enumerate()
        .map(|(index, rows)| {
            let s: Vec<f64> = rows.iter().map(|&i| key[i]).collect();
            let mean_predicted = s.iter().sum::<f64>() / s.len() as f64;
            let actual_rate = rows.iter().map(|&i| label(i)).sum::<f64>() / rows.len() as f64;
            CalibrationBin {
                index,
                count: rows.len(),
                score_min: s.iter().copied().fold(f64::INFINITY, f64::min),
                score_max: s.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                mean_predicted,
                actual_rate,
                abs_error: (actual_rate - mean_predicted).abs(),
                rows,
            }
        })
        .collect();

    let population = rows.len();
    let mean_error = bins.iter().map(|b| b.abs_error * b.count as f64).sum::<f64>() / population as f64;
    let monotonicity_violations = bins
        .windows(2)
        .filter(|w| w[1].actual_rate < w[0].actual_rate)
        .count();
    let monotonicity_score = if bins.len() > 1 {
        1.0 - monotonicity_violations as f64 / (bins.len() - 1) as f64
    } else {
        1.0
    };
    let brier_score = rows
        .iter()
        .map(|&i| (key[i] - label(i)).powi(2))
        .sum::<f64>()
        / population as f64;
    let verdict = CalibrationVerdict::of(mean_error).ok_or_else(|| {
        RiskError::partial("calibration", "calibration error is undefined")
    })?;

    Ok(CalibrationCurve {
        population,
        bins,
        mean_error,
        monotonicity_violations,
        monotonicity_score,
        brier_score,
        verdict,
    })
}

// ── Segment calibration ───────────────────────────────────────────────

/// Same-score risk comparison for one segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentCalibration {
    pub dimension: String,
    pub value: String,
    pub count: usize,
    pub median_score: f64,
    /// Global bin holding the segment's median score.
    pub bin_index: usize,
    pub global_bin_rate: f64,
    /// Segment's realized rate inside that bin.
    pub segment_bin_rate: Option<f64>,
    pub gap: Option<f64>,
    pub flagged: bool,
}

/// Compares each segment's realized rate with the global rate at the same
/// score.
pub fn segment_calibration(
    ctx: &AnalysisContext,
    curve: &CalibrationCurve,
    config: &CalibrationConfig,
    max_segments: usize,
    deadline: &Deadline,
) -> Result<Vec<SegmentCalibration>, RiskError> {
    let score = ctx.require_score("segment calibration")?;
    if ctx.dimensions.is_empty() {
        return Err(RiskError::partial("segment calibration", "no segment dimension"));
    }
    let usable = |i: &usize| score.values[*i].is_some() && ctx.labels[*i].is_some();
    let mut bin_of: Vec<Option<usize>> = vec![None; ctx.labels.len()];
    for bin in &curve.bins {
        for &i in &bin.rows {
            if let Some(slot) = bin_of.get_mut(i) {
                *slot = Some(bin.index);
            }
        }
    }

    let mut out = Vec::new();
    for dim in &ctx.dimensions {
        for (value, rows) in group_by(&dim.values, max_segments) {
            deadline.check()?;
            let rows: Vec<usize> = rows.into_iter().filter(usable).collect();
            if rows.len() < config.min_segment_size {
                continue;
            }
            let scores = stats::present_at(&score.values, &rows);
            let Some(median_score) = stats::median(&scores) else {
                continue;
            };
            let Some(bin) = curve.bin_for(median_score) else {
                continue;
            };
            let in_bin: Vec<usize> = rows
                .iter()
                .copied()
                .filter(|&i| bin_of.get(i).copied().flatten() == Some(bin.index))
                .collect();
            let positives = in_bin.iter().filter(|&&i| ctx.labels[i] == Some(true)).count();
            let segment_bin_rate = count_ratio(positives, in_bin.len());
            let gap = segment_bin_rate.map(|r| r - bin.actual_rate);
            out.push(SegmentCalibration {
                dimension: dim.name.clone(),
                value,
                count: rows.len(),
                median_score,
                bin_index: bin.index,
                global_bin_rate: bin.actual_rate,
                segment_bin_rate,
                gap,
                flagged: gap.is_some_and(|g| g.abs() > config.segment_gap_threshold),
            });
        }
    }
    Ok(out)
}

// ── Entry point ───────────────────────────────────────────────────────

/// Calibration report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationReport {
    pub curve: Section<CalibrationCurve>,
    pub segments: Section<Vec<SegmentCalibration>>,
    pub status: ReportStatus,
}

/// Runs global and segment calibration.
pub fn analyze(
    ctx: &AnalysisContext,
    config: &EngineConfig,
    deadline: &Deadline,
) -> Result<CalibrationReport, RiskError> {
    tracing::debug!(dataset = ctx.dataset.id(), "calibration analysis");
    let cfg = &config.calibration;
    let mut status = ReportStatus::with_notes(&ctx.notes);

    let curve = run_section(&mut status, deadline, "calibration", || {
        let score = ctx.require_score("calibration")?;
        calibration_curve(&score.values, &ctx.labels, cfg.bins)
    })?;
    let segments = match curve.available() {
        Some(c) => run_section(&mut status, deadline, "segment calibration", || {
            segment_calibration(ctx, c, cfg, config.segment.max_segments, deadline)
        })?,
        None => Section::not_available("calibration curve not available"),
    };
    if let Some(s) = segments.available() {
        let flagged = s.iter().filter(|s| s.flagged).count();
        if flagged > 0 {
            status.note(format!(
                "{flagged} segments: same score does not mean same risk"
            ));
        }
    }

    Ok(CalibrationReport {
        curve,
        segments,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetBuilder;
    use crate::profiler::ProfilerConfig;
    use proptest::prelude::*;

    #[test]
    fn overconfident_scores_need_recalibration() {
        let scores: Vec<Option<f64>> = (0..100).map(|i| Some(0.5 + i as f64 / 250.0)).collect();
        let labels: Vec<Option<bool>> = (0..100).map(|i| Some(i % 20 == 0)).collect();
        let curve = calibration_curve(&scores, &labels, 10).unwrap();
        assert_eq!(curve.verdict, CalibrationVerdict::NeedsRecalibration);
        assert!(curve.brier_score > 0.25);
    }

    #[test]
    fn monotonicity_counts_rate_drops() {
        // rates per bin: 1.0, 0.0, 1.0
        let scores: Vec<Option<f64>> = (0..3).map(|i| Some(i as f64 / 3.0)).collect();
        let labels = vec![Some(true), Some(false), Some(true)];
        let curve = calibration_curve(&scores, &labels, 3).unwrap();
        assert_eq!(curve.monotonicity_violations, 1);
        assert!((curve.monotonicity_score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn unlabeled_rows_are_excluded() {
        let scores = vec![Some(0.2), Some(0.4), None, Some(0.9)];
        let labels = vec![Some(false), None, Some(true), Some(true)];
        let curve = calibration_curve(&scores, &labels, 10).unwrap();
        assert_eq!(curve.population, 2);
        assert_eq!(curve.bins.iter().map(|b| b.count).sum::<usize>(), 2);
    }

    #[test]
    fn segment_with_higher_risk_at_same_score_is_flagged() {
        let n = 200;
        let score: Vec<f64> = (0..n).map(|i| ((i / 2) % 10) as f64 / 10.0 + 0.05).collect();
        let region: Vec<&str> = (0..n).map(|i| if i % 2 == 0 { "north" } else { "south" }).collect();
        // same scores in both regions; only south ever turns out fraudulent
        let label: Vec<f64> = (0..n)
            .map(|i| f64::from(i % 2 == 1 && (i / 2) % 4 != 0))
            .collect();
        let ds = DatasetBuilder::new("cal")
            .numeric("score", score)
            .numeric("is_fraud", label)
            .categories("region", region)
            .build()
            .unwrap();
        let ctx = AnalysisContext::build(&ds, None, None, &ProfilerConfig::default()).unwrap();
        let report = analyze(&ctx, &EngineConfig::default(), &Deadline::unlimited()).unwrap();
        let segments = report.segments.available().unwrap();
        let south = segments.iter().find(|s| s.value == "south").unwrap();
        assert!(south.flagged, "gap = {:?}", south.gap);
        assert!(report.status.notes.iter().any(|n| n.contains("same score")));
    }

    #[test]
    fn segment_calibration_on_large_dataset() {
        let n = 60_000;
        let score: Vec<f64> = (0..n).map(|i| ((i / 2) % 1000) as f64 / 1000.0 + 0.0005).collect();
        let label: Vec<f64> = (0..n).map(|i| f64::from((i / 2) % 10 == 0)).collect();
        let region: Vec<&str> = (0..n).map(|i| if i % 2 == 0 { "north" } else { "south" }).collect();
        let ds = DatasetBuilder::new("big")
            .numeric("score", score)
            .numeric("is_fraud", label)
            .categories("region", region)
            .build()
            .unwrap();
        let ctx = AnalysisContext::build(&ds, None, None, &ProfilerConfig::default()).unwrap();
        let report = analyze(&ctx, &EngineConfig::default(), &Deadline::unlimited()).unwrap();
        let segments = report.segments.available().unwrap();
        assert_eq!(segments.len(), 2);
        for s in segments {
            assert_eq!(s.count, n / 2);
            assert!(s.gap.unwrap().abs() < 1e-12, "{} gap = {:?}", s.value, s.gap);
            assert!(!s.flagged);
        }
    }

    proptest! {
        #[test]
        fn bin_counts_sum_and_rates_bounded(
            rows in prop::collection::vec((0.0f64..=1.0, any::<bool>()), 1..300),
            bins in 1usize..15,
        ) {
            let scores: Vec<Option<f64>> = rows.iter().map(|r| Some(r.0)).collect();
            let labels: Vec<Option<bool>> = rows.iter().map(|r| Some(r.1)).collect();
            let curve = calibration_curve(&scores, &labels, bins).unwrap();
            prop_assert_eq!(curve.bins.iter().map(|b| b.count).sum::<usize>(), rows.len());
            for b in &curve.bins {
                prop_assert!((0.0..=1.0).contains(&b.actual_rate));
            }
        }
    }
}
