//! Operational economics of the score: what each action band earns, where
//! the best threshold sits, and how much human review it takes.
//!
//! - [`action_effectiveness`]: per-band outcomes under the [`CostModel`]
//! - [`threshold_optimization`]: sweep, optimum by net value and by F1
//! - [`hitl_workload`]: alert volume, priorities and staffing

use crate::classification::{threshold_sweep, CostModel, SweepPoint};
use crate::config::EngineConfig;
use crate::deadline::Deadline;
use crate::error::RiskError;
use crate::profiler::AnalysisContext;
use crate::report::{run_section, ReportStatus, Section};
use crate::stats::{self, count_ratio};
use serde::{Deserialize, Serialize};

// ── Configuration ─────────────────────────────────────────────────────

/// Action taken on a score band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Allow,
    StepUp,
    Decline,
}

/// Score interval `[min, max)` mapped to an action. The band whose `max`
/// is the top of the score range also holds `max`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionBand {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub action: Action,
}

/// Review priority for alerts scored at or above `min_score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityBand {
    pub name: String,
    pub min_score: f64,
}

/// Configuration for operational economics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomicsConfig {
    /// Ascending, non-overlapping action bands.
    pub bands: Vec<ActionBand>,
    /// Score percentiles swept for threshold optimization. Default: 50..=99.
    pub percentile_grid: Vec<f64>,
    /// Cap on swept grid points. Default: 100.
    pub max_grid_points: usize,
    /// Relative net-value swing per grid step that triggers a warning.
    /// Default: 0.1.
    pub elasticity_warning: f64,
    /// Alerts are scores at or above this. Default: 0.5.
    pub review_threshold: f64,
    /// Priorities, highest first. Default: P1 ≥ 0.9, P2 ≥ 0.7, P3 ≥ 0.5.
    pub priorities: Vec<PriorityBand>,
    /// Analyst minutes per alert. Default: 5.
    pub minutes_per_review: f64,
    /// Days covered by the dataset. Default: 30.
    pub observation_days: f64,
    /// Review hours one investigator delivers per day. Default: 6.
    pub productive_hours_per_day: f64,
}

impl Default for EconomicsConfig {
    fn default() -> Self {
        let band = |name: &str, min, max, action| ActionBand {
            name: name.to_string(),
            min,
            max,
            action,
        };
        let priority = |name: &str, min_score| PriorityBand {
            name: name.to_string(),
            min_score,
        };
        Self {
            bands: vec![
                band("low", 0.0, 0.3, Action::Allow),
                band("medium", 0.3, 0.7, Action::StepUp),
                band("high", 0.7, 1.0, Action::Decline),
            ],
            percentile_grid: (50..=99).map(f64::from).collect(),
            max_grid_points: 100,
            elasticity_warning: 0.1,
            review_threshold: 0.5,
            priorities: vec![priority("P1", 0.9), priority("P2", 0.7), priority("P3", 0.5)],
            minutes_per_review: 5.0,
            observation_days: 30.0,
            productive_hours_per_day: 6.0,
        }
    }
}

impl EconomicsConfig {
    /// Replaces the action bands.
    pub fn bands(mut self, bands: Vec<ActionBand>) -> Self {
        self.bands = bands;
        self
    }

    /// Sets the review threshold.
    pub fn review_threshold(mut self, t: f64) -> Self {
        self.review_threshold = t;
        self
    }

    /// Sets the observation period in days.
    pub fn observation_days(mut self, days: f64) -> Self {
        self.observation_days = days;
        self
    }
}

// ── Action effectiveness ──────────────────────────────────────────────

/// Outcome of one action band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandOutcome {
    pub name: String,
    pub action: Action,
    pub min: f64,
    pub max: f64,
    pub fraud: usize,
    pub legit: usize,
    pub unlabeled: usize,
    pub fraud_prevented: f64,
    pub good_spend_blocked: f64,
    /// Fraud amount that passes through the band's action.
    pub fraud_missed: f64,
    pub net_value: f64,
}

/// Outcomes of the whole action policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionEffectiveness {
    pub bands: Vec<BandOutcome>,
    pub total_fraud_prevented: f64,
    pub total_good_spend_blocked: f64,
    pub total_net_value: f64,
    /// Net value per unit of good spend blocked.
    pub roi: Option<f64>,
    pub limitation: String,
}

const FEEDBACK_LIMITATION: &str = "Declined and challenged transactions rarely receive an outcome \
label, so prevented fraud is measured only on the labeled part of each band; without a holdout \
the policy cannot observe the fraud it stops.";

fn band_index(bands: &[ActionBand], score: f64) -> Option<usize> {
    let last = bands.len().checked_sub(1)?;
    bands.iter().position(|b| score >= b.min && score < b.max).or_else(|| {
        let top = &bands[last];
        (score >= top.min && score <= top.max).then_some(last)
    })
}

/// Per-band counts and monetary outcome of the configured action policy.
pub fn action_effectiveness(
    ctx: &AnalysisContext,
    bands: &[ActionBand],
    cost: &CostModel,
) -> Result<ActionEffectiveness, RiskError> {
    let score = ctx.require_score("action effectiveness")?;
    if bands.is_empty() {
        return Err(RiskError::partial("action effectiveness", "no action bands configured"));
    }
    let amounts = ctx.monetary.as_ref().map(|m| m.values.as_slice());

    let mut outcomes: Vec<BandOutcome> = bands
        .iter()
        .map(|b| BandOutcome {
            name: b.name.clone(),
            action: b.action,
            min: b.min,
            max: b.max,
            fraud: 0,
            legit: 0,
            unlabeled: 0,
            fraud_prevented: 0.0,
            good_spend_blocked: 0.0,
            fraud_missed: 0.0,
            net_value: 0.0,
        })
        .collect();

    for (i, s) in score.values.iter().enumerate() {
        let Some(idx) = s.and_then(|s| band_index(bands, s)) else {
            continue;
        };
        let out = &mut outcomes[idx];
        match ctx.labels[i] {
            None => out.unlabeled += 1,
            Some(true) => {
                out.fraud += 1;
                let amt = cost.amount(amounts, i, true);
                let stopped = match out.action {
                    Action::Allow => 0.0,
                    Action::StepUp => amt * cost.step_up_catch_rate,
                    Action::Decline => amt,
                };
                out.fraud_prevented += stopped;
                out.fraud_missed += amt - stopped;
            }
            Some(false) => {
                out.legit += 1;
                let amt = cost.amount(amounts, i, false);
                out.good_spend_blocked += match out.action {
                    Action::Allow => 0.0,
                    Action::StepUp => amt * cost.step_up_friction_rate,
                    Action::Decline => amt * cost.good_spend_loss_rate,
                };
            }
        }
    }
    for out in &mut outcomes {
        out.net_value = out.fraud_prevented - out.good_spend_blocked;
    }

    let total_fraud_prevented: f64 = outcomes.iter().map(|o| o.fraud_prevented).sum();
    let total_good_spend_blocked: f64 = outcomes.iter().map(|o| o.good_spend_blocked).sum();
    let total_net_value = total_fraud_prevented - total_good_spend_blocked;
    Ok(ActionEffectiveness {
        bands: outcomes,
        total_fraud_prevented,
        total_good_spend_blocked,
        total_net_value,
        roi: stats::ratio(total_net_value, total_good_spend_blocked),
        limitation: FEEDBACK_LIMITATION.to_string(),
    })
}

// ── Threshold optimization ────────────────────────────────────────────

/// Sweep result with the two optima.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdOptimization {
    pub points: Vec<SweepPoint>,
    pub optimal_by_value: SweepPoint,
    pub optimal_by_f1: Option<SweepPoint>,
    /// Both optima sit at the same percentile.
    pub agree: bool,
    /// Largest relative change in net value one grid step away from the
    /// value optimum. `None` when the optimum's net value is zero.
    pub elasticity: Option<f64>,
    pub elasticity_warning: Option<String>,
}

/// Sweeps the percentile grid and picks the best threshold by net value and
/// by F1.
pub fn threshold_optimization(
    ctx: &AnalysisContext,
    config: &EconomicsConfig,
    cost: &CostModel,
) -> Result<ThresholdOptimization, RiskError> {
    let score = ctx.require_score("threshold optimization")?;
    let grid: Vec<f64> = config
        .percentile_grid
        .iter()
        .copied()
        .filter(|p| (0.0..=100.0).contains(p))
        .take(config.max_grid_points)
        .collect();
    let amounts = ctx.monetary.as_ref().map(|m| m.values.as_slice());
    let points = threshold_sweep(&score.values, &ctx.labels, &grid, cost, amounts)?;

    let (best_idx, optimal_by_value) = points
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.monetary.net_value.total_cmp(&b.1.monetary.net_value).then(b.0.cmp(&a.0)))
        .map(|(i, p)| (i, *p))
        .ok_or_else(|| RiskError::partial("threshold optimization", "empty percentile grid"))?;
    let optimal_by_f1 = points
        .iter()
        .filter(|p| p.f1.is_some())
        .max_by(|a, b| {
            a.f1.unwrap_or(0.0)
                .total_cmp(&b.f1.unwrap_or(0.0))
                .then(b.percentile.total_cmp(&a.percentile))
        })
        .copied();
    let agree = optimal_by_f1.is_some_and(|f| f.percentile == optimal_by_value.percentile);

    let best_net = optimal_by_value.monetary.net_value;
    let neighbours = [best_idx.checked_sub(1), Some(best_idx + 1)];
    let elasticity = neighbours
        .iter()
        .flatten()
        .filter_map(|&j| {
            let net = points.get(j)?.monetary.net_value;
            stats::ratio((net - best_net).abs(), best_net.abs())
        })
        .reduce(f64::max);
    let elasticity_warning = elasticity
        .filter(|e| *e > config.elasticity_warning)
        .map(|e| format!("one grid step around the optimum moves net value by {:.0}%", e * 100.0));

    Ok(ThresholdOptimization {
        points,
        optimal_by_value,
        optimal_by_f1,
        agree,
        elasticity,
        elasticity_warning,
    })
}

// ── HITL workload ─────────────────────────────────────────────────────

/// Alerts in one review priority.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriorityLoad {
    pub name: String,
    pub min_score: f64,
    pub alerts: usize,
    pub fraud: usize,
    pub labeled: usize,
    pub precision: Option<f64>,
}

/// Human-in-the-loop review workload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HitlWorkload {
    pub review_threshold: f64,
    pub priorities: Vec<PriorityLoad>,
    pub total_alerts: usize,
    pub total_fraud: usize,
    /// Alerts per confirmed fraud.
    pub alert_to_fraud_ratio: Option<f64>,
    pub daily_alerts: f64,
    pub minutes_per_review: f64,
    pub investigators_required: f64,
    pub monthly_review_hours: f64,
    /// Share of reviewed alerts where the human overrode the model.
    pub disagreement_rate: Section<f64>,
}

/// Alert volume, priority mix and staffing at the review threshold.
pub fn hitl_workload(ctx: &AnalysisContext, config: &EconomicsConfig) -> Result<HitlWorkload, RiskError> {
    let score = ctx.require_score("HITL workload")?;
    if config.observation_days <= 0.0 || config.productive_hours_per_day <= 0.0 {
        return Err(RiskError::InvalidParameter {
            name: "observation_days".into(),
            message: "observation days and productive hours must be positive".into(),
        });
    }
    let alerts: Vec<usize> = (0..score.values.len())
        .filter(|&i| score.values[i].is_some_and(|s| s >= config.review_threshold))
        .collect();

    let mut priorities: Vec<PriorityLoad> = config
        .priorities
        .iter()
        .map(|p| PriorityLoad {
            name: p.name.clone(),
            min_score: p.min_score,
            alerts: 0,
            fraud: 0,
            labeled: 0,
            precision: None,
        })
        .collect();
    let mut order: Vec<usize> = (0..priorities.len()).collect();
    order.sort_by(|&a, &b| priorities[b].min_score.total_cmp(&priorities[a].min_score));
    for &i in &alerts {
        let s = score.values[i].unwrap_or(0.0);
        if let Some(&p) = order.iter().find(|&&p| s >= priorities[p].min_score) {
            let load = &mut priorities[p];
            load.alerts += 1;
            if let Some(l) = ctx.labels[i] {
                load.labeled += 1;
                load.fraud += usize::from(l);
            }
        }
    }
    for p in &mut priorities {
        p.precision = count_ratio(p.fraud, p.labeled);
    }

    let total_alerts = alerts.len();
    let total_fraud = alerts.iter().filter(|&&i| ctx.labels[i] == Some(true)).count();
    let daily_alerts = total_alerts as f64 / config.observation_days;
    let daily_hours = daily_alerts * config.minutes_per_review / 60.0;

    let disagreement_rate = match &ctx.human_decision {
        None => Section::not_available("no human-decision column"),
        Some(decisions) => {
            let reviewed: Vec<bool> = alerts.iter().filter_map(|&i| decisions[i]).collect();
            let overrides = reviewed.iter().filter(|&&fraud| !fraud).count();
            match count_ratio(overrides, reviewed.len()) {
                Some(r) => Section::Available(r),
                None => Section::not_available("no reviewed alerts carry a human decision"),
            }
        }
    };

    Ok(HitlWorkload {
        review_threshold: config.review_threshold,
        priorities,
        total_alerts,
        total_fraud,
        alert_to_fraud_ratio: count_ratio(total_alerts, total_fraud),
        daily_alerts,
        minutes_per_review: config.minutes_per_review,
        investigators_required: (daily_hours / config.productive_hours_per_day).ceil(),
        monthly_review_hours: daily_hours * 30.0,
        disagreement_rate,
    })
}

// ── Entry point ───────────────────────────────────────────────────────

/// Operational economics report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EconomicsReport {
    pub action_effectiveness: Section<ActionEffectiveness>,
    pub threshold_optimization: Section<ThresholdOptimization>,
    pub workload: Section<HitlWorkload>,
    pub status: ReportStatus,
}

/// Runs every economics section.
pub fn analyze(
    ctx: &AnalysisContext,
    config: &EngineConfig,
    deadline: &Deadline,
) -> Result<EconomicsReport, RiskError> {
    tracing::debug!(dataset = ctx.dataset.id(), "economics analysis");
    let cfg = &config.economics;
    let mut status = ReportStatus::with_notes(&ctx.notes);
    if ctx.monetary.is_none() {
        status.note("no monetary column; average amounts from the cost model are used");
    }

    let action_effectiveness = run_section(&mut status, deadline, "action effectiveness", || {
        action_effectiveness(ctx, &cfg.bands, &config.cost)
    })?;
    let threshold_optimization = run_section(&mut status, deadline, "threshold optimization", || {
        threshold_optimization(ctx, cfg, &config.cost)
    })?;
    let workload = run_section(&mut status, deadline, "HITL workload", || hitl_workload(ctx, cfg))?;

    Ok(EconomicsReport {
        action_effectiveness,
        threshold_optimization,
        workload,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ColumnRole, Dataset, DatasetBuilder};
    use crate::profiler::ProfilerConfig;

    /// 100 records, score i/100; fraud above 0.8 plus a few below.
    fn portfolio() -> Dataset {
        let score: Vec<f64> = (0..100).map(|i| i as f64 / 100.0).collect();
        let label: Vec<f64> = (0..100).map(|i| f64::from(i >= 80 || i == 10)).collect();
        let amount: Vec<f64> = (0..100).map(|i| if i >= 80 { 500.0 } else { 50.0 }).collect();
        DatasetBuilder::new("p")
            .numeric("score", score)
            .numeric("is_fraud", label)
            .numeric("amount", amount)
            .build()
            .unwrap()
    }

    #[test]
    fn bands_split_population() {
        let ds = portfolio();
        let ctx = AnalysisContext::build(&ds, None, None, &ProfilerConfig::default()).unwrap();
        let cfg = EconomicsConfig::default();
        let eff = action_effectiveness(&ctx, &cfg.bands, &CostModel::default()).unwrap();
        let counts: usize = eff.bands.iter().map(|b| b.fraud + b.legit + b.unlabeled).sum();
        assert_eq!(counts, 100);

        let decline = &eff.bands[2];
        assert_eq!(decline.fraud, 20);
        assert_eq!(decline.legit, 10);
        assert!((decline.fraud_prevented - 10_000.0).abs() < 1e-9);
        assert!((decline.good_spend_blocked - 150.0).abs() < 1e-9);

        let allow = &eff.bands[0];
        assert_eq!(allow.fraud_prevented, 0.0);
        assert!((allow.fraud_missed - 50.0).abs() < 1e-9);
        assert!(eff.roi.unwrap() > 1.0);
        assert!(!eff.limitation.is_empty());
    }

    #[test]
    fn top_band_includes_its_upper_edge() {
        let cfg = EconomicsConfig::default();
        assert_eq!(band_index(&cfg.bands, 1.0), Some(2));
        assert_eq!(band_index(&cfg.bands, 0.3), Some(1));
        assert_eq!(band_index(&cfg.bands, 1.2), None);
    }

    #[test]
    fn net_value_cliff_next_to_optimum_warns() {
        // ten frauds at the top, one expensive legit record just below them
        let score: Vec<f64> = (0..100).map(|i| i as f64 / 100.0).collect();
        let label: Vec<f64> = (0..100).map(|i| f64::from(i >= 90)).collect();
        let amount: Vec<f64> = (0..100)
            .map(|i| match i {
                89 => 100_000.0,
                i if i >= 90 => 100.0,
                _ => 10.0,
            })
            .collect();
        let ds = DatasetBuilder::new("cliff")
            .numeric("score", score)
            .numeric("is_fraud", label)
            .numeric("amount", amount)
            .build()
            .unwrap();
        let ctx = AnalysisContext::build(&ds, None, None, &ProfilerConfig::default()).unwrap();
        let opt = threshold_optimization(&ctx, &EconomicsConfig::default(), &CostModel::default()).unwrap();
        assert_eq!(opt.optimal_by_value.matrix.false_positive, 0);
        assert!(opt.optimal_by_value.monetary.net_value > 0.0);
        assert!(opt.elasticity.unwrap() > 1.0, "elasticity {:?}", opt.elasticity);
        assert!(opt.elasticity_warning.is_some());
    }

    #[test]
    fn optimization_finds_clean_cut() {
        let ds = portfolio();
        let ctx = AnalysisContext::build(&ds, None, None, &ProfilerConfig::default()).unwrap();
        let opt = threshold_optimization(&ctx, &EconomicsConfig::default(), &CostModel::default()).unwrap();
        assert_eq!(opt.points.len(), 50);
        let best = opt.optimal_by_value;
        assert_eq!(best.matrix.false_positive, 0, "threshold {}", best.threshold);
        assert_eq!(best.matrix.true_positive, 20);
        assert!(opt.agree);
    }

    #[test]
    fn workload_staffing() {
        let ds = portfolio();
        let ctx = AnalysisContext::build(&ds, None, None, &ProfilerConfig::default()).unwrap();
        let cfg = EconomicsConfig::default().observation_days(1.0);
        let w = hitl_workload(&ctx, &cfg).unwrap();
        assert_eq!(w.total_alerts, 50);
        assert_eq!(w.total_fraud, 20);
        assert_eq!(w.alert_to_fraud_ratio, Some(2.5));
        assert_eq!(w.priorities[0].alerts, 10);
        assert_eq!(w.priorities[0].precision, Some(1.0));
        // 50 alerts × 5 min = 250 min ≈ 4.2 h → one investigator
        assert_eq!(w.investigators_required, 1.0);
        assert!(!w.disagreement_rate.is_available());
    }

    #[test]
    fn disagreement_rate_from_human_decisions() {
        let ds = DatasetBuilder::new("h")
            .numeric("score", vec![0.9, 0.8, 0.6, 0.1])
            .numeric("is_fraud", vec![1.0, 0.0, 1.0, 0.0])
            .categories("analyst", vec!["fraud", "legit", "fraud", "legit"])
            .role("analyst", ColumnRole::HumanDecision)
            .build()
            .unwrap();
        let ctx = AnalysisContext::build(&ds, None, None, &ProfilerConfig::default()).unwrap();
        let w = hitl_workload(&ctx, &EconomicsConfig::default()).unwrap();
        let rate = *w.disagreement_rate.available().unwrap();
        assert!((rate - 1.0 / 3.0).abs() < 1e-12);
    }
}
