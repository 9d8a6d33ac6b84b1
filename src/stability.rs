//! Population stability and performance drift over time.
//!
//! Three sections:
//! - **Population stability**: base/recent halves in temporal order, PSI
//!   and two-sample KS per feature and for the score.
//! - **Rolling drift**: N ordered windows with precision, recall and fraud
//!   rate per window and the least-squares trend of each.
//! - **Segment score profiles**: score p10/mean/p90/std per segment value.

use crate::config::EngineConfig;
use crate::deadline::Deadline;
use crate::divergence::{ks_two_sample, psi, KsResult, PsiBand};
use crate::error::RiskError;
use crate::profiler::AnalysisContext;
use crate::report::{run_section, ReportStatus, Section};
use crate::segment::group_by;
use crate::stats::{self, count_ratio};
use crate::classification::ConfusionMatrix;
use serde::{Deserialize, Serialize};

// ── Configuration ─────────────────────────────────────────────────────

/// Configuration for stability and drift analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// PSI buckets. Default: 10.
    pub buckets: usize,
    /// Rolling windows. Default: 4.
    pub windows: usize,
    /// Per-window slope of precision or recall counted as a trend. Default: 0.05.
    pub trend_threshold: f64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            buckets: 10,
            windows: 4,
            trend_threshold: 0.05,
        }
    }
}

impl StabilityConfig {
    /// Sets the number of rolling windows.
    pub fn windows(mut self, n: usize) -> Self {
        self.windows = n;
        self
    }

    /// Sets the trend threshold.
    pub fn trend_threshold(mut self, t: f64) -> Self {
        self.trend_threshold = t;
        self
    }
}

// ── Types ─────────────────────────────────────────────────────────────

/// Overall population stability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityVerdict {
    Stable,
    Moderate,
    Significant,
}

/// Performance drift across rolling windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftVerdict {
    Stable,
    Watch,
    Drifting,
}

/// Base vs recent shift of one variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableShift {
    pub name: String,
    pub psi: f64,
    pub band: PsiBand,
    pub ks: Option<KsResult>,
    pub base_count: usize,
    pub recent_count: usize,
}

/// Base/recent comparison of score and features.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopulationStability {
    /// Time column used for ordering; `None` means record position.
    pub ordered_by: Option<String>,
    pub base_size: usize,
    pub recent_size: usize,
    pub score: Option<VariableShift>,
    pub features: Vec<VariableShift>,
    pub significant_features: usize,
    pub verdict: StabilityVerdict,
}

/// Decision quality inside one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowMetrics {
    pub index: usize,
    pub size: usize,
    pub labeled: usize,
    pub fraud_rate: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub flag_rate: Option<f64>,
}

/// Trend of decision quality across windows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollingDrift {
    pub windows: Vec<WindowMetrics>,
    pub precision_slope: Option<f64>,
    pub recall_slope: Option<f64>,
    pub fraud_rate_slope: Option<f64>,
    pub verdict: DriftVerdict,
    pub explanation: String,
}

/// Score distribution inside one segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentScoreProfile {
    pub dimension: String,
    pub value: String,
    pub count: usize,
    pub p10: Option<f64>,
    pub mean: Option<f64>,
    pub p90: Option<f64>,
    pub std_dev: Option<f64>,
}

/// Stability and drift report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StabilityReport {
    pub population: Section<PopulationStability>,
    pub rolling: Section<RollingDrift>,
    pub segment_scores: Section<Vec<SegmentScoreProfile>>,
    pub status: ReportStatus,
}

// ── Population stability ──────────────────────────────────────────────

fn shift(name: &str, values: &[Option<f64>], base: &[usize], recent: &[usize], buckets: usize) -> Option<VariableShift> {
    let b = stats::present_at(values, base);
    let r = stats::present_at(values, recent);
    let value = psi(&b, &r, buckets)?;
    Some(VariableShift {
        name: name.to_string(),
        psi: value,
        band: PsiBand::of(value)?,
        ks: ks_two_sample(&b, &r),
        base_count: b.len(),
        recent_count: r.len(),
    })
}

/// Compares the first and second half of the temporally ordered records.
pub fn population_stability(
    ctx: &AnalysisContext,
    config: &StabilityConfig,
    deadline: &Deadline,
) -> Result<PopulationStability, RiskError> {
    let n = ctx.order.len();
    if n < 2 {
        return Err(RiskError::partial("population stability", "fewer than two records"));
    }
    let (base, recent) = ctx.order.split_at(n / 2);

    let score = ctx
        .score
        .as_ref()
        .and_then(|s| shift(&s.name, &s.values, base, recent, config.buckets));
    let mut features = Vec::with_capacity(ctx.features.len());
    for f in &ctx.features {
        deadline.check()?;
        if let Some(s) = shift(&f.name, &f.values, base, recent, config.buckets) {
            features.push(s);
        }
    }
    if score.is_none() && features.is_empty() {
        return Err(RiskError::partial(
            "population stability",
            "no numeric score or feature present in both halves",
        ));
    }

    let significant_features = features
        .iter()
        .filter(|f| f.band == PsiBand::Significant)
        .count();
    let worst = features
        .iter()
        .chain(score.iter())
        .map(|f| f.band)
        .max()
        .unwrap_or(PsiBand::Stable);
    let verdict = if score.as_ref().is_some_and(|s| s.band == PsiBand::Significant)
        || (!features.is_empty() && significant_features * 2 > features.len())
    {
        StabilityVerdict::Significant
    } else if worst >= PsiBand::Moderate {
        StabilityVerdict::Moderate
    } else {
        StabilityVerdict::Stable
    };

    Ok(PopulationStability {
        ordered_by: ctx.profile.roles.time.clone(),
        base_size: base.len(),
        recent_size: recent.len(),
        score,
        features,
        significant_features,
        verdict,
    })
}

// ── Rolling drift ─────────────────────────────────────────────────────

/// Precision, recall and fraud rate over ordered windows.
pub fn rolling_drift(
    ctx: &AnalysisContext,
    threshold: f64,
    config: &StabilityConfig,
    population: Option<StabilityVerdict>,
    deadline: &Deadline,
) -> Result<RollingDrift, RiskError> {
    let score = ctx.require_score("rolling drift")?;
    if config.windows < 2 || ctx.order.len() < config.windows {
        return Err(RiskError::partial(
            "rolling drift",
            format!("need at least {} ordered records", config.windows.max(2)),
        ));
    }

    let mut windows = Vec::with_capacity(config.windows);
    for (index, rows) in stats::contiguous_chunks(&ctx.order, config.windows).iter().enumerate() {
        deadline.check()?;
        let mut cm = ConfusionMatrix::default();
        let mut scored = 0usize;
        let mut flagged = 0usize;
        for &i in rows {
            if let Some(s) = score.values[i] {
                scored += 1;
                flagged += usize::from(s >= threshold);
                if let Some(l) = ctx.labels[i] {
                    cm.record(l, s >= threshold);
                }
            }
        }
        let labeled = rows.iter().filter(|&&i| ctx.labels[i].is_some()).count();
        let positives = rows.iter().filter(|&&i| ctx.labels[i] == Some(true)).count();
        windows.push(WindowMetrics {
            index,
            size: rows.len(),
            labeled,
            fraud_rate: count_ratio(positives, labeled),
            precision: cm.precision(),
            recall: cm.recall(),
            flag_rate: count_ratio(flagged, scored),
        });
    }

    let slope = |f: fn(&WindowMetrics) -> Option<f64>| {
        stats::index_slope(&windows.iter().map(f).collect::<Vec<_>>())
    };
    let precision_slope = slope(|w| w.precision);
    let recall_slope = slope(|w| w.recall);
    let fraud_rate_slope = slope(|w| w.fraud_rate);

    let trend = precision_slope
        .into_iter()
        .chain(recall_slope)
        .map(f64::abs)
        .fold(0.0, f64::max);
    let (verdict, explanation) = drift_verdict(trend, config.trend_threshold, population);

    Ok(RollingDrift {
        windows,
        precision_slope,
        recall_slope,
        fraud_rate_slope,
        verdict,
        explanation,
    })
}

fn drift_verdict(
    trend: f64,
    threshold: f64,
    population: Option<StabilityVerdict>,
) -> (DriftVerdict, String) {
    if trend > threshold {
        return (
            DriftVerdict::Drifting,
            format!("precision/recall moving {trend:.3} per window (limit {threshold:.3})"),
        );
    }
    if population == Some(StabilityVerdict::Significant) {
        return (
            DriftVerdict::Drifting,
            "population shifted significantly between base and recent".into(),
        );
    }
    if trend > threshold / 2.0 {
        return (
            DriftVerdict::Watch,
            format!("precision/recall moving {trend:.3} per window, approaching limit {threshold:.3}"),
        );
    }
    if population == Some(StabilityVerdict::Moderate) {
        return (
            DriftVerdict::Watch,
            "moderate population shift with flat performance".into(),
        );
    }
    (DriftVerdict::Stable, "no material trend in precision or recall".into())
}

// ── Segment score profiles ────────────────────────────────────────────

/// Score percentiles per segment value of every dimension.
pub fn segment_score_profiles(
    ctx: &AnalysisContext,
    max_segments: usize,
    deadline: &Deadline,
) -> Result<Vec<SegmentScoreProfile>, RiskError> {
    let score = ctx.require_score("segment score profiles")?;
    if ctx.dimensions.is_empty() {
        return Err(RiskError::partial("segment score profiles", "no segment dimension"));
    }
    let mut out = Vec::new();
    for dim in &ctx.dimensions {
        for (value, rows) in group_by(&dim.values, max_segments) {
            deadline.check()?;
            let scores = stats::present_at(&score.values, &rows);
            out.push(SegmentScoreProfile {
                dimension: dim.name.clone(),
                value,
                count: rows.len(),
                p10: stats::quantile(&scores, 0.1),
                mean: stats::mean(&scores),
                p90: stats::quantile(&scores, 0.9),
                std_dev: stats::std_dev(&scores),
            });
        }
    }
    Ok(out)
}

// ── Entry point ───────────────────────────────────────────────────────

/// Runs every stability section.
pub fn analyze(
    ctx: &AnalysisContext,
    config: &EngineConfig,
    deadline: &Deadline,
) -> Result<StabilityReport, RiskError> {
    tracing::debug!(dataset = ctx.dataset.id(), "stability analysis");
    let cfg = &config.stability;
    let mut status = ReportStatus::with_notes(&ctx.notes);

    let population = run_section(&mut status, deadline, "population stability", || {
        population_stability(ctx, cfg, deadline)
    })?;
    let verdict = population.available().map(|p| p.verdict);
    let rolling = run_section(&mut status, deadline, "rolling drift", || {
        rolling_drift(ctx, config.decision_threshold, cfg, verdict, deadline)
    })?;
    let segment_scores = run_section(&mut status, deadline, "segment score profiles", || {
        segment_score_profiles(ctx, config.segment.max_segments, deadline)
    })?;
    if ctx.profile.roles.time.is_none() {
        status.note("no time column; windows follow record position");
    }

    Ok(StabilityReport {
        population,
        rolling,
        segment_scores,
        status,
    })
}
