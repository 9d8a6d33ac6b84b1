//! Data quality and failure-mode analysis.
//!
//! Covers the inputs (null, zero and constant columns), what happens when a
//! feature disappears, how the review queue copes with a fraud spike, which
//! features hang on slow external services, and how stale the model may get.

use crate::banding::{self, Closed};
use crate::config::EngineConfig;
use crate::deadline::Deadline;
use crate::error::RiskError;
use crate::profiler::{AnalysisContext, ClassBalance};
use crate::report::{run_section, ReportStatus, Section, Severity};
use crate::stats::{self, count_ratio};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Configuration ─────────────────────────────────────────────────────

/// A feature served by an external system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalDependency {
    pub feature: String,
    pub source: String,
    pub p99_latency_ms: f64,
}

/// Configuration for data quality and failure modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Fallback strategy per feature when it drops out.
    pub fallbacks: BTreeMap<String, String>,
    /// Fraud volume multipliers. Default: 1.5, 2, 3.
    pub spike_multipliers: Vec<f64>,
    /// Alerts the review team can work; current labeled alert volume when
    /// unset.
    pub review_capacity: Option<usize>,
    /// Catch rate below which a spike scenario breaks. Default: 0.6.
    pub acceptable_catch_rate: f64,
    /// `|corr with score|` at which a high-impact feature is load-bearing.
    /// Default: 0.5.
    pub spof_score_correlation: f64,
    pub external_dependencies: Vec<ExternalDependency>,
    /// Days between model refreshes.
    pub refresh_cadence_days: Option<f64>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            fallbacks: BTreeMap::new(),
            spike_multipliers: vec![1.5, 2.0, 3.0],
            review_capacity: None,
            acceptable_catch_rate: 0.6,
            spof_score_correlation: 0.5,
            external_dependencies: Vec::new(),
            refresh_cadence_days: None,
        }
    }
}

impl QualityConfig {
    /// Registers a fallback for a feature.
    pub fn fallback(mut self, feature: &str, strategy: &str) -> Self {
        self.fallbacks.insert(feature.to_string(), strategy.to_string());
        self
    }

    /// Sets the review capacity.
    pub fn review_capacity(mut self, alerts: usize) -> Self {
        self.review_capacity = Some(alerts);
        self
    }

    /// Sets the refresh cadence.
    pub fn refresh_cadence_days(mut self, days: f64) -> Self {
        self.refresh_cadence_days = Some(days);
        self
    }
}

// ── Feature quality ───────────────────────────────────────────────────

/// Null-rate quality band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NullBand {
    Good,
    Moderate,
    Poor,
    Critical,
}

/// Quality of one input column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureQuality {
    pub feature: String,
    pub null_rate: f64,
    pub zero_rate: Option<f64>,
    pub unique_count: usize,
    pub is_constant: bool,
    pub band: NullBand,
}

/// Quality of every input column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureQualitySummary {
    pub features: Vec<FeatureQuality>,
    /// Fraction of feature columns in the good band.
    pub quality_score: f64,
}

fn null_band(rate: f64) -> NullBand {
    banding::fixed(
        &[0.05, 0.20, 0.50],
        &[NullBand::Good, NullBand::Moderate, NullBand::Poor, NullBand::Critical],
        Closed::Left,
    )
    .classify(rate)
    .unwrap_or(NullBand::Critical)
}

/// Null, zero and uniqueness profile of every model feature column.
pub fn feature_quality(ctx: &AnalysisContext) -> Result<FeatureQualitySummary, RiskError> {
    let features: Vec<FeatureQuality> = ctx
        .profile
        .columns
        .iter()
        .filter(|c| {
            let roles = &ctx.profile.roles;
            roles.features.contains(&c.name) || roles.categorical_features.contains(&c.name)
        })
        .map(|c| FeatureQuality {
            feature: c.name.clone(),
            null_rate: c.null_rate,
            zero_rate: c.zero_rate,
            unique_count: c.cardinality,
            is_constant: c.is_constant,
            band: null_band(c.null_rate),
        })
        .collect();
    let good = features.iter().filter(|f| f.band == NullBand::Good).count();
    let quality_score = count_ratio(good, features.len())
        .ok_or_else(|| RiskError::partial("feature quality", "no feature columns"))?;
    Ok(FeatureQualitySummary {
        features,
        quality_score,
    })
}

// ── Dropout ───────────────────────────────────────────────────────────

/// Predictive weight lost if a feature goes missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropoutImpact {
    Low,
    Medium,
    High,
}

/// Dropout assessment of one feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureDropout {
    pub feature: String,
    pub target_correlation: Option<f64>,
    pub score_correlation: Option<f64>,
    pub impact: DropoutImpact,
    pub fallback: Option<String>,
    pub single_point_of_failure: bool,
}

/// Impact of losing each numeric feature, highest first.
pub fn dropout_analysis(
    ctx: &AnalysisContext,
    config: &QualityConfig,
    deadline: &Deadline,
) -> Result<Vec<FeatureDropout>, RiskError> {
    if ctx.features.is_empty() {
        return Err(RiskError::partial("dropout", "no numeric features"));
    }
    let target = ctx.target_numeric();
    let impact_bands = banding::fixed(
        &[0.1, 0.3],
        &[DropoutImpact::Low, DropoutImpact::Medium, DropoutImpact::High],
        Closed::Left,
    );
    let mut out = Vec::with_capacity(ctx.features.len());
    for f in &ctx.features {
        deadline.check()?;
        let target_correlation = stats::pearson_pairwise(&f.values, &target);
        let score_correlation = ctx
            .score
            .as_ref()
            .and_then(|s| stats::pearson_pairwise(&f.values, &s.values));
        let impact = impact_bands
            .classify_opt(target_correlation.map(f64::abs))
            .unwrap_or(DropoutImpact::Low);
        let fallback = config.fallbacks.get(&f.name).cloned();
        let single_point_of_failure = impact == DropoutImpact::High
            && score_correlation.is_some_and(|c| c.abs() >= config.spof_score_correlation)
            && fallback.is_none();
        out.push(FeatureDropout {
            feature: f.name.clone(),
            target_correlation,
            score_correlation,
            impact,
            fallback,
            single_point_of_failure,
        });
    }
    out.sort_by(|a, b| b.impact.cmp(&a.impact).then_with(|| a.feature.cmp(&b.feature)));
    Ok(out)
}

// ── Fraud spike ───────────────────────────────────────────────────────

/// Review-queue outcome when fraud volume is multiplied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpikeScenario {
    pub multiplier: f64,
    pub fraud_volume: f64,
    pub alerts: f64,
    pub reviewed: f64,
    pub caught: f64,
    pub missed: f64,
    pub catch_rate: Option<f64>,
    pub breaks: bool,
}

/// Catch rate under fraud spikes with a capacity-bound review queue.
///
/// Fraud alerts scale with the multiplier while legitimate alerts stay put;
/// the queue works at most `capacity` alerts in the current precision mix.
/// Without a configured capacity the queue holds today's labeled alerts.
pub fn spike_scenarios(
    ctx: &AnalysisContext,
    threshold: f64,
    config: &QualityConfig,
) -> Result<Vec<SpikeScenario>, RiskError> {
    let score = ctx.require_score("fraud spike")?;
    let (mut tp, mut fp, mut positives) = (0usize, 0usize, 0usize);
    for (i, s) in score.values.iter().enumerate() {
        let Some(s) = s else { continue };
        let flagged = *s >= threshold;
        match ctx.labels[i] {
            Some(true) => {
                positives += 1;
                tp += usize::from(flagged);
            }
            Some(false) => fp += usize::from(flagged),
            None => {}
        }
    }
    if positives == 0 {
        return Err(RiskError::partial("fraud spike", "no labeled fraud"));
    }
    // workload is modeled over labeled alerts, so capacity is too
    let capacity = config.review_capacity.unwrap_or(tp + fp) as f64;

    Ok(config
        .spike_multipliers
        .iter()
        .map(|&m| {
            let fraud_alerts = tp as f64 * m;
            let alerts = fraud_alerts + fp as f64;
            let reviewed = alerts.min(capacity);
            let caught = stats::ratio(fraud_alerts, alerts).map_or(0.0, |p| reviewed * p);
            let fraud_volume = positives as f64 * m;
            let catch_rate = stats::ratio(caught, fraud_volume);
            SpikeScenario {
                multiplier: m,
                fraud_volume,
                alerts,
                reviewed,
                caught,
                missed: fraud_volume - caught,
                catch_rate,
                breaks: catch_rate.is_some_and(|c| c < config.acceptable_catch_rate),
            }
        })
        .collect())
}

// ── Latency and staleness ─────────────────────────────────────────────

/// Latency exposure of one externally served feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyRisk {
    pub feature: String,
    pub source: String,
    pub p99_latency_ms: f64,
    pub score_correlation: Option<f64>,
    pub risk: Severity,
}

/// External dependencies present in the data, slowest first.
pub fn latency_ranking(ctx: &AnalysisContext, config: &QualityConfig) -> Result<Vec<LatencyRisk>, RiskError> {
    if config.external_dependencies.is_empty() {
        return Err(RiskError::partial("latency risk", "no external dependencies configured"));
    }
    let bands = banding::fixed(
        &[100.0, 500.0],
        &[Severity::Low, Severity::Medium, Severity::High],
        Closed::Left,
    );
    let mut out: Vec<LatencyRisk> = config
        .external_dependencies
        .iter()
        .filter(|d| ctx.dataset.frame().column_by_name(&d.feature).is_some())
        .map(|d| LatencyRisk {
            feature: d.feature.clone(),
            source: d.source.clone(),
            p99_latency_ms: d.p99_latency_ms,
            score_correlation: ctx
                .score
                .as_ref()
                .zip(ctx.numeric_column(&d.feature))
                .and_then(|(s, f)| stats::pearson_pairwise(&f, &s.values)),
            risk: bands.classify(d.p99_latency_ms).unwrap_or(Severity::High),
        })
        .collect();
    out.sort_by(|a, b| b.p99_latency_ms.total_cmp(&a.p99_latency_ms));
    Ok(out)
}

/// How stale the model can get between refreshes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Staleness {
    pub refresh_cadence_days: Option<f64>,
    pub statement: String,
    pub mitigation: String,
}

/// Staleness statement keyed to the refresh cadence.
pub fn staleness(cadence: Option<f64>) -> Staleness {
    let (statement, mitigation) = match cadence {
        None => (
            "No refresh cadence is configured; the model ages until someone notices drift.".to_string(),
            "Set a refresh schedule and monitor PSI on the score between refreshes.".to_string(),
        ),
        Some(d) if d <= 7.0 => (
            format!("Refreshed every {d} days; fraud patterns rarely outrun this cadence."),
            "Keep rolling-window monitoring to catch fast attacks between refreshes.".to_string(),
        ),
        Some(d) if d <= 30.0 => (
            format!("Refreshed every {d} days; new attack patterns can run for weeks before retraining."),
            "Add rule-based overrides for emerging patterns between refreshes.".to_string(),
        ),
        Some(d) => (
            format!("Refreshed every {d} days; the model is likely stale against adaptive fraud."),
            "Shorten the refresh cycle or add champion/challenger retraining.".to_string(),
        ),
    };
    Staleness {
        refresh_cadence_days: cadence,
        statement,
        mitigation,
    }
}

// ── Resilience ────────────────────────────────────────────────────────

/// Overall failure-mode resilience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResilienceVerdict {
    Robust,
    Moderate,
    Fragile,
}

/// Resilience from single points of failure and broken spike scenarios.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resilience {
    pub single_points_of_failure: usize,
    pub broken_spike_scenarios: usize,
    pub verdict: ResilienceVerdict,
}

fn resilience(spof: usize, broken: usize) -> Resilience {
    let verdict = banding::fixed(
        &[1.0, 3.0],
        &[ResilienceVerdict::Robust, ResilienceVerdict::Moderate, ResilienceVerdict::Fragile],
        Closed::Left,
    )
    .classify((spof + broken) as f64)
    .unwrap_or(ResilienceVerdict::Fragile);
    Resilience {
        single_points_of_failure: spof,
        broken_spike_scenarios: broken,
        verdict,
    }
}

// ── Entry point ───────────────────────────────────────────────────────

/// Data quality and failure-mode report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub features: Section<FeatureQualitySummary>,
    pub dropout: Section<Vec<FeatureDropout>>,
    pub spike: Section<Vec<SpikeScenario>>,
    pub latency: Section<Vec<LatencyRisk>>,
    pub staleness: Staleness,
    pub resilience: Resilience,
    pub class_balance: ClassBalance,
    pub status: ReportStatus,
}

/// Runs every quality and failure-mode section.
pub fn analyze(
    ctx: &AnalysisContext,
    config: &EngineConfig,
    deadline: &Deadline,
) -> Result<QualityReport, RiskError> {
    tracing::debug!(dataset = ctx.dataset.id(), "quality analysis");
    let cfg = &config.quality;
    let mut status = ReportStatus::with_notes(&ctx.notes);

    let features = run_section(&mut status, deadline, "feature quality", || feature_quality(ctx))?;
    let dropout = run_section(&mut status, deadline, "dropout", || {
        dropout_analysis(ctx, cfg, deadline)
    })?;
    let spike = run_section(&mut status, deadline, "fraud spike", || {
        spike_scenarios(ctx, config.decision_threshold, cfg)
    })?;
    let latency = run_section(&mut status, deadline, "latency risk", || latency_ranking(ctx, cfg))?;

    let spof = dropout
        .available()
        .map_or(0, |d| d.iter().filter(|f| f.single_point_of_failure).count());
    let broken = spike
        .available()
        .map_or(0, |s| s.iter().filter(|s| s.breaks).count());
    let resilience = resilience(spof, broken);
    if resilience.verdict == ResilienceVerdict::Fragile {
        tracing::warn!(dataset = ctx.dataset.id(), spof, broken, "fragile failure-mode profile");
    }

    Ok(QualityReport {
        features,
        dropout,
        spike,
        latency,
        staleness: staleness(cfg.refresh_cadence_days),
        resilience,
        class_balance: ctx.profile.class_balance.clone(),
        status,
    })
}
