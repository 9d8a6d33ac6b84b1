//! Fraud taxonomy coverage and segment decomposition.
//!
//! Coverage asks whether the columns at hand can even recognize each known
//! fraud subtype, and how well the model catches the ones it can.
//! Decomposition breaks decision quality down by segment and lists local
//! disasters hidden by good global numbers.

use crate::banding::{self, Closed};
use crate::classification::ConfusionMatrix;
use crate::config::EngineConfig;
use crate::deadline::Deadline;
use crate::error::RiskError;
use crate::profiler::AnalysisContext;
use crate::report::{run_section, ReportStatus, Section};
use crate::segment::{segment_aggregate, SegmentConfig, SegmentTable};
use crate::stats::{self, count_ratio};
use serde::{Deserialize, Serialize};

// ── Configuration ─────────────────────────────────────────────────────

/// How records of a subtype are recognized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum SubtypeRule {
    /// Value inside `[min, max]`; an absent bound is open.
    Range {
        column: String,
        min: Option<f64>,
        max: Option<f64>,
    },
    /// Value equal (case-insensitive) to one of `values`.
    Flag { column: String, values: Vec<String> },
    /// `numerator / denominator >= min`.
    Ratio {
        numerator: String,
        denominator: String,
        min: f64,
    },
    /// `|z-score| >= z` within the column.
    Outlier { column: String, z: f64 },
}

impl SubtypeRule {
    /// Columns the rule reads.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Self::Range { column, .. } | Self::Flag { column, .. } | Self::Outlier { column, .. } => {
                vec![column.as_str()]
            }
            Self::Ratio {
                numerator,
                denominator,
                ..
            } => vec![numerator.as_str(), denominator.as_str()],
        }
    }
}

/// A named fraud subtype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudSubtype {
    pub name: String,
    #[serde(flatten)]
    pub rule: SubtypeRule,
    /// Weight in the coverage score. Default: 1.0.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl FraudSubtype {
    fn new(name: &str, rule: SubtypeRule) -> Self {
        Self {
            name: name.to_string(),
            rule,
            weight: 1.0,
        }
    }
}

/// Configuration for taxonomy coverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxonomyConfig {
    pub subtypes: Vec<FraudSubtype>,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            subtypes: vec![
                FraudSubtype::new(
                    "card_testing",
                    SubtypeRule::Range {
                        column: "amount".into(),
                        min: None,
                        max: Some(5.0),
                    },
                ),
                FraudSubtype::new(
                    "high_value",
                    SubtypeRule::Outlier {
                        column: "amount".into(),
                        z: 3.0,
                    },
                ),
                FraudSubtype::new(
                    "new_account",
                    SubtypeRule::Range {
                        column: "account_age_days".into(),
                        min: None,
                        max: Some(30.0),
                    },
                ),
                FraudSubtype::new(
                    "velocity",
                    SubtypeRule::Range {
                        column: "txn_count_1h".into(),
                        min: Some(5.0),
                        max: None,
                    },
                ),
                FraudSubtype::new(
                    "cross_border",
                    SubtypeRule::Flag {
                        column: "is_cross_border".into(),
                        values: vec!["1".into(), "true".into(), "yes".into()],
                    },
                ),
            ],
        }
    }
}

impl TaxonomyConfig {
    /// Replaces the subtype list.
    pub fn subtypes(mut self, subtypes: Vec<FraudSubtype>) -> Self {
        self.subtypes = subtypes;
        self
    }
}

// ── Coverage ──────────────────────────────────────────────────────────

/// Coverage quality of the taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageBand {
    Poor,
    GapsExist,
    Good,
}

/// Coverage of one subtype.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtypeCoverage {
    pub name: String,
    pub identifiable: bool,
    pub missing_columns: Vec<String>,
    /// Records matching the rule.
    pub population: usize,
    pub fraud_count: usize,
    pub fraud_rate: Option<f64>,
    /// Recall inside the subtype at the decision threshold.
    pub catch_rate: Option<f64>,
}

/// Coverage across all configured subtypes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxonomyCoverage {
    pub subtypes: Vec<SubtypeCoverage>,
    /// Weighted share of identifiable subtypes.
    pub coverage_score: f64,
    pub band: CoverageBand,
}

fn rule_mask(ctx: &AnalysisContext, rule: &SubtypeRule) -> Option<Vec<bool>> {
    let n = ctx.labels.len();
    match rule {
        SubtypeRule::Range { column, min, max } => {
            let values = ctx.numeric_column(column)?;
            Some(
                values
                    .iter()
                    .map(|v| {
                        v.is_some_and(|x| {
                            min.map_or(true, |lo| x >= lo) && max.map_or(true, |hi| x <= hi)
                        })
                    })
                    .collect(),
            )
        }
        SubtypeRule::Flag { column, values } => {
            let col = ctx.label_column(column)?;
            Some(
                col.iter()
                    .map(|v| {
                        v.as_deref()
                            .is_some_and(|s| values.iter().any(|t| t.eq_ignore_ascii_case(s)))
                    })
                    .collect(),
            )
        }
        SubtypeRule::Ratio {
            numerator,
            denominator,
            min,
        } => {
            let num = ctx.numeric_column(numerator)?;
            let den = ctx.numeric_column(denominator)?;
            Some(
                (0..n)
                    .map(|i| match (num[i], den[i]) {
                        (Some(a), Some(b)) => stats::ratio(a, b).is_some_and(|r| r >= *min),
                        _ => false,
                    })
                    .collect(),
            )
        }
        SubtypeRule::Outlier { column, z } => {
            let values = ctx.numeric_column(column)?;
            let present = stats::present(&values);
            let mean = stats::mean(&present)?;
            let sd = stats::std_dev(&present).filter(|s| *s > 1e-12)?;
            Some(
                values
                    .iter()
                    .map(|v| v.is_some_and(|x| ((x - mean) / sd).abs() >= *z))
                    .collect(),
            )
        }
    }
}

/// Coverage of every configured subtype.
pub fn taxonomy_coverage(
    ctx: &AnalysisContext,
    config: &TaxonomyConfig,
    threshold: f64,
    deadline: &Deadline,
) -> Result<TaxonomyCoverage, RiskError> {
    if config.subtypes.is_empty() {
        return Err(RiskError::partial("taxonomy coverage", "no fraud subtypes configured"));
    }
    let flags = ctx.flags(threshold);
    let mut subtypes = Vec::with_capacity(config.subtypes.len());
    let (mut covered_weight, mut total_weight) = (0.0, 0.0);

    for subtype in &config.subtypes {
        deadline.check()?;
        total_weight += subtype.weight;
        let missing_columns: Vec<String> = subtype
            .rule
            .columns()
            .into_iter()
            .filter(|c| ctx.dataset.frame().column_by_name(c).is_none())
            .map(String::from)
            .collect();
        let mask = if missing_columns.is_empty() {
            rule_mask(ctx, &subtype.rule)
        } else {
            None
        };

        let Some(mask) = mask else {
            subtypes.push(SubtypeCoverage {
                name: subtype.name.clone(),
                identifiable: false,
                missing_columns,
                population: 0,
                fraud_count: 0,
                fraud_rate: None,
                catch_rate: None,
            });
            continue;
        };
        covered_weight += subtype.weight;

        let rows: Vec<usize> = (0..mask.len()).filter(|&i| mask[i]).collect();
        let labeled = rows.iter().filter(|&&i| ctx.labels[i].is_some()).count();
        let fraud_count = rows.iter().filter(|&&i| ctx.labels[i] == Some(true)).count();
        let mut cm = ConfusionMatrix::default();
        for &i in &rows {
            if let (Some(l), Some(f)) = (ctx.labels[i], flags[i]) {
                cm.record(l, f);
            }
        }
        subtypes.push(SubtypeCoverage {
            name: subtype.name.clone(),
            identifiable: true,
            missing_columns,
            population: rows.len(),
            fraud_count,
            fraud_rate: count_ratio(fraud_count, labeled),
            catch_rate: cm.recall(),
        });
    }

    let coverage_score = stats::ratio(covered_weight, total_weight).unwrap_or(0.0);
    let band = banding::fixed(
        &[0.5, 0.8],
        &[CoverageBand::Poor, CoverageBand::GapsExist, CoverageBand::Good],
        Closed::Left,
    )
    .classify(coverage_score)
    .unwrap_or(CoverageBand::Poor);

    Ok(TaxonomyCoverage {
        subtypes,
        coverage_score,
        band,
    })
}

// ── Segment decomposition ─────────────────────────────────────────────

/// A segment whose precision or recall collapsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalDisaster {
    pub dimension: String,
    pub value: String,
    pub count: usize,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub global_precision: Option<f64>,
    pub global_recall: Option<f64>,
    pub reasons: Vec<String>,
}

/// Segment tables across all dimensions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentDecomposition {
    pub tables: Vec<SegmentTable>,
    pub disasters: Vec<LocalDisaster>,
}

/// Aggregates decision quality per segment of every dimension.
pub fn segment_decomposition(
    ctx: &AnalysisContext,
    threshold: f64,
    config: &SegmentConfig,
    deadline: &Deadline,
) -> Result<SegmentDecomposition, RiskError> {
    let score = ctx.require_score("segment decomposition")?;
    if ctx.dimensions.is_empty() {
        return Err(RiskError::partial("segment decomposition", "no segment dimension"));
    }
    let mut tables = Vec::with_capacity(ctx.dimensions.len());
    for dim in &ctx.dimensions {
        deadline.check()?;
        tables.push(segment_aggregate(
            &dim.name,
            &dim.values,
            &score.values,
            &ctx.labels,
            threshold,
            config,
        )?);
    }
    let disasters = tables
        .iter()
        .flat_map(|t| {
            t.disasters().map(move |s| LocalDisaster {
                dimension: t.dimension.clone(),
                value: s.value.clone(),
                count: s.count,
                precision: s.precision,
                recall: s.recall,
                global_precision: t.global_precision,
                global_recall: t.global_recall,
                reasons: s.disaster_reasons.clone(),
            })
        })
        .collect();
    Ok(SegmentDecomposition { tables, disasters })
}

// ── Entry point ───────────────────────────────────────────────────────

/// Taxonomy and segmentation report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxonomyReport {
    pub coverage: Section<TaxonomyCoverage>,
    pub segments: Section<SegmentDecomposition>,
    pub status: ReportStatus,
}

/// Runs coverage and segment decomposition.
pub fn analyze(
    ctx: &AnalysisContext,
    config: &EngineConfig,
    deadline: &Deadline,
) -> Result<TaxonomyReport, RiskError> {
    tracing::debug!(dataset = ctx.dataset.id(), "taxonomy analysis");
    let mut status = ReportStatus::with_notes(&ctx.notes);
    let coverage = run_section(&mut status, deadline, "taxonomy coverage", || {
        taxonomy_coverage(ctx, &config.taxonomy, config.decision_threshold, deadline)
    })?;
    let segments = run_section(&mut status, deadline, "segment decomposition", || {
        segment_decomposition(ctx, config.decision_threshold, &config.segment, deadline)
    })?;
    if let Some(d) = segments.available() {
        if !d.disasters.is_empty() {
            tracing::info!(count = d.disasters.len(), "local disasters found");
        }
    }
    Ok(TaxonomyReport {
        coverage,
        segments,
        status,
    })
}
