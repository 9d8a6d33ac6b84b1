//! Dataset profiling: column statistics, role inference and target selection.
//!
//! The profiler tolerates dirty data: missing values are expected input, not
//! errors. It fails only when the dataset cannot be analyzed at all
//! ([`RiskError::Schema`]): no rows, no columns, or no resolvable target.
//!
//! ```
//! use u_modelrisk::dataset::DatasetBuilder;
//! use u_modelrisk::profiler::{profile_dataset, ProfilerConfig, TargetSource};
//!
//! let ds = DatasetBuilder::new("d")
//!     .numeric("risk_score", vec![0.1, 0.9, 0.3, 0.7])
//!     .numeric("is_fraud", vec![0.0, 1.0, 0.0, 1.0])
//!     .numeric("amount", vec![12.0, 900.0, 40.0, 15.5])
//!     .build()
//!     .unwrap();
//! let profile = profile_dataset(&ds, None, &ProfilerConfig::default()).unwrap();
//! assert_eq!(profile.target.column, "is_fraud");
//! assert_eq!(profile.target.source, TargetSource::Heuristic);
//! assert_eq!(profile.roles.score.as_deref(), Some("risk_score"));
//! ```

use crate::banding::{self, Closed};
use crate::dataframe::{Column, DataType};
use crate::dataset::{ColumnRole, Dataset};
use crate::error::RiskError;
use crate::report::ReportStatus;
use crate::stats;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// ── Configuration ─────────────────────────────────────────────────────

/// Configuration for profiling and role inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Largest cardinality a target candidate may have. Default: 20.
    pub max_target_cardinality: usize,
    /// Largest cardinality an inferred segment dimension may have. Default: 50.
    pub max_segment_cardinality: usize,
    /// Label values read as the positive class (case-insensitive).
    pub positive_tokens: Vec<String>,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            max_target_cardinality: 20,
            max_segment_cardinality: 50,
            positive_tokens: ["1", "true", "yes", "y", "fraud", "positive", "bad", "decline", "block", "reject"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl ProfilerConfig {
    /// Sets the maximum target cardinality.
    pub fn max_target_cardinality(mut self, n: usize) -> Self {
        self.max_target_cardinality = n;
        self
    }

    /// Sets the maximum segment cardinality.
    pub fn max_segment_cardinality(mut self, n: usize) -> Self {
        self.max_segment_cardinality = n;
        self
    }
}

const SCORE_HINTS: &[&str] = &["score", "prob", "pred", "risk"];
const TIME_HINTS: &[&str] = &["time", "date", "timestamp", "seq", "event_", "_ts"];
const MONETARY_HINTS: &[&str] = &["amount", "amt", "spend", "price", "value"];
const TARGET_HINTS: &[&str] = &["label", "target", "fraud", "is_", "outcome", "class"];
const DECISION_HINTS: &[&str] = &["override", "analyst_decision", "human_decision", "reviewer"];

fn has_hint(name: &str, hints: &[&str]) -> bool {
    let lower = name.to_lowercase();
    hints.iter().any(|h| lower.contains(h))
}

fn is_identifier_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower == "id" || lower.ends_with("_id") || lower.ends_with("uuid")
}

// ── Column profile ────────────────────────────────────────────────────

/// Summary statistics of a numeric column (present values only).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: Option<f64>,
}

/// Profile of one column; derived once per dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub data_type: DataType,
    /// Distinct present values.
    pub cardinality: usize,
    /// Missing fraction (0–1).
    pub null_rate: f64,
    /// Fraction of present values equal to zero (numeric and boolean only).
    pub zero_rate: Option<f64>,
    /// Present count.
    pub valid_count: usize,
    /// At most one distinct present value.
    pub is_constant: bool,
    pub numeric: Option<NumericSummary>,
}

/// Profiles a single column.
pub fn profile_column(name: &str, col: &Column) -> ColumnProfile {
    let row_count = col.len();
    let valid_count = row_count - col.null_count();
    let null_rate = stats::count_ratio(col.null_count(), row_count).unwrap_or(0.0);

    let (cardinality, zero_rate, numeric) = match col {
        Column::Numeric { .. } | Column::Boolean { .. } => {
            let values: Vec<f64> = (0..row_count).filter_map(|i| col.numeric_at(i)).collect();
            let distinct: HashSet<u64> = values.iter().map(|v| v.to_bits()).collect();
            let zeros = values.iter().filter(|&&v| v == 0.0).count();
            let summary = if matches!(col, Column::Numeric { .. }) && !values.is_empty() {
                Some(NumericSummary {
                    min: values.iter().copied().fold(f64::INFINITY, f64::min),
                    max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    mean: stats::mean(&values).unwrap_or(0.0),
                    std_dev: stats::std_dev(&values),
                })
            } else {
                None
            };
            (distinct.len(), stats::count_ratio(zeros, values.len()), summary)
        }
        Column::Categorical { .. } | Column::Text { .. } => {
            let distinct: HashSet<String> =
                (0..row_count).filter_map(|i| col.label_at(i)).collect();
            (distinct.len(), None, None)
        }
    };

    ColumnProfile {
        name: name.to_string(),
        data_type: col.data_type(),
        cardinality,
        null_rate,
        zero_rate,
        valid_count,
        is_constant: cardinality <= 1,
        numeric,
    }
}

/// Profiles every column in original order.
pub fn profile_columns(ds: &Dataset) -> Vec<ColumnProfile> {
    ds.frame()
        .iter()
        .map(|(name, col)| profile_column(name, col))
        .collect()
}

// ── Roles ─────────────────────────────────────────────────────────────

/// Column roles after combining declarations with inference.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoleAssignment {
    pub score: Option<String>,
    pub time: Option<String>,
    pub monetary: Option<String>,
    pub human_decision: Option<String>,
    pub identifiers: Vec<String>,
    /// Segment dimensions available by default.
    pub segments: Vec<String>,
    /// Numeric/boolean model features.
    pub features: Vec<String>,
    /// Categorical/text columns that are neither target nor identifier.
    pub categorical_features: Vec<String>,
}

fn infer_roles(
    ds: &Dataset,
    profiles: &[ColumnProfile],
    target: &str,
    config: &ProfilerConfig,
) -> RoleAssignment {
    let declared_one = |role: ColumnRole| ds.declared_columns(role).first().map(|s| s.to_string());

    let score = declared_one(ColumnRole::Score).or_else(|| {
        profiles
            .iter()
            .find(|p| {
                p.name != target
                    && has_hint(&p.name, SCORE_HINTS)
                    && p.numeric
                        .as_ref()
                        .is_some_and(|n| n.min >= 0.0 && n.max <= 1.0)
            })
            .map(|p| p.name.clone())
    });
    let time = declared_one(ColumnRole::Time).or_else(|| {
        profiles
            .iter()
            .find(|p| p.name != target && Some(&p.name) != score.as_ref() && has_hint(&p.name, TIME_HINTS))
            .map(|p| p.name.clone())
    });
    let monetary = declared_one(ColumnRole::Monetary).or_else(|| {
        profiles
            .iter()
            .find(|p| {
                p.data_type == DataType::Numeric
                    && p.name != target
                    && Some(&p.name) != score.as_ref()
                    && has_hint(&p.name, MONETARY_HINTS)
            })
            .map(|p| p.name.clone())
    });
    let human_decision = declared_one(ColumnRole::HumanDecision).or_else(|| {
        profiles
            .iter()
            .find(|p| p.name != target && p.cardinality == 2 && has_hint(&p.name, DECISION_HINTS))
            .map(|p| p.name.clone())
    });

    let mut identifiers: Vec<String> = ds
        .declared_columns(ColumnRole::Identifier)
        .into_iter()
        .map(String::from)
        .collect();
    for p in profiles {
        if is_identifier_name(&p.name)
            && p.valid_count > 1
            && p.cardinality == p.valid_count
            && !identifiers.contains(&p.name)
        {
            identifiers.push(p.name.clone());
        }
    }

    let reserved = |name: &str| {
        name == target
            || Some(name) == score.as_deref()
            || Some(name) == time.as_deref()
            || Some(name) == human_decision.as_deref()
            || identifiers.iter().any(|i| i == name)
    };

    let declared_segments = ds.declared_columns(ColumnRole::Segment);
    let segments: Vec<String> = if declared_segments.is_empty() {
        profiles
            .iter()
            .filter(|p| {
                matches!(p.data_type, DataType::Categorical | DataType::Text)
                    && !reserved(&p.name)
                    && p.cardinality >= 2
                    && p.cardinality <= config.max_segment_cardinality
            })
            .map(|p| p.name.clone())
            .collect()
    } else {
        declared_segments.into_iter().map(String::from).collect()
    };

    let features = profiles
        .iter()
        .filter(|p| matches!(p.data_type, DataType::Numeric | DataType::Boolean) && !reserved(&p.name))
        .map(|p| p.name.clone())
        .collect();
    let categorical_features = profiles
        .iter()
        .filter(|p| matches!(p.data_type, DataType::Categorical | DataType::Text) && !reserved(&p.name))
        .map(|p| p.name.clone())
        .collect();

    RoleAssignment {
        score,
        time,
        monetary,
        human_decision,
        identifiers,
        segments,
        features,
        categorical_features,
    }
}

// ── Target selection ──────────────────────────────────────────────────

/// How the active target was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSource {
    /// Caller-supplied override.
    Override,
    /// Declared by the dataset collaborator.
    Declared,
    /// Best-ranked candidate column.
    Heuristic,
}

/// A column that could serve as the binary target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetCandidate {
    pub column: String,
    pub cardinality: usize,
    pub is_binary: bool,
    /// Name suggests a label (`label`, `target`, `fraud`, ...).
    pub name_hint: bool,
    pub null_rate: f64,
}

/// The single active target of an analysis call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetSelection {
    pub column: String,
    pub source: TargetSource,
    /// Human-readable description of what counts as positive.
    pub positive_class: String,
}

/// Ranks candidate target columns: binary first, then label-like names,
/// then lower missing rate, then original column order.
pub fn rank_target_candidates(
    ds: &Dataset,
    profiles: &[ColumnProfile],
    config: &ProfilerConfig,
) -> Vec<TargetCandidate> {
    let excluded: HashSet<&str> = [ColumnRole::Score, ColumnRole::Time, ColumnRole::Identifier, ColumnRole::HumanDecision]
        .into_iter()
        .flat_map(|r| ds.declared_columns(r))
        .collect();

    let mut ranked: Vec<(usize, TargetCandidate)> = profiles
        .iter()
        .enumerate()
        .filter(|(_, p)| {
            !excluded.contains(p.name.as_str())
                && !is_identifier_name(&p.name)
                && !has_hint(&p.name, SCORE_HINTS)
                && !has_hint(&p.name, TIME_HINTS)
                && (2..=config.max_target_cardinality).contains(&p.cardinality)
                && p.numeric.as_ref().map_or(true, |n| n.min.fract() == 0.0 && n.max.fract() == 0.0)
        })
        .map(|(pos, p)| {
            (
                pos,
                TargetCandidate {
                    column: p.name.clone(),
                    cardinality: p.cardinality,
                    is_binary: p.cardinality == 2,
                    name_hint: has_hint(&p.name, TARGET_HINTS) || p.name.eq_ignore_ascii_case("y"),
                    null_rate: p.null_rate,
                },
            )
        })
        .collect();

    ranked.sort_by(|(pa, a), (pb, b)| {
        b.is_binary
            .cmp(&a.is_binary)
            .then(b.name_hint.cmp(&a.name_hint))
            .then(a.null_rate.total_cmp(&b.null_rate))
            .then(pa.cmp(pb))
    });
    ranked.into_iter().map(|(_, c)| c).collect()
}

/// Resolves the active target: override, then declared label, then the best
/// candidate.
pub fn resolve_target(
    ds: &Dataset,
    candidates: &[TargetCandidate],
    target_override: Option<&str>,
) -> Result<(String, TargetSource), RiskError> {
    if let Some(name) = target_override {
        if ds.frame().column_by_name(name).is_none() {
            return Err(RiskError::Schema(format!("target column '{name}' not found")));
        }
        return Ok((name.to_string(), TargetSource::Override));
    }
    if let Some(name) = ds.declared_columns(ColumnRole::Label).first() {
        return Ok((name.to_string(), TargetSource::Declared));
    }
    candidates
        .first()
        .map(|c| (c.column.clone(), TargetSource::Heuristic))
        .ok_or_else(|| {
            RiskError::Schema("no binary or low-cardinality column can serve as target".into())
        })
}

/// Reads a target column as binary labels.
///
/// Numeric: `0/1` columns use `1` as positive, other two-valued columns the
/// larger value. Strings: a value matching a positive token, otherwise the
/// minority value of a two-valued column. Columns with more than two values
/// treat every non-modal value as positive.
pub fn resolve_labels(col: &Column, config: &ProfilerConfig) -> (Vec<Option<bool>>, String) {
    let raw = col.to_label_options();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for v in raw.iter().flatten() {
        *counts.entry(v.as_str()).or_insert(0) += 1;
    }
    let mut distinct: Vec<&str> = counts.keys().copied().collect();
    distinct.sort_unstable();

    let positive: HashSet<String> = if matches!(col, Column::Numeric { .. }) && distinct.len() == 2 {
        let mut nums: Vec<(f64, &str)> = distinct
            .iter()
            .filter_map(|s| s.parse::<f64>().ok().map(|v| (v, *s)))
            .collect();
        nums.sort_by(|a, b| a.0.total_cmp(&b.0));
        nums.last().map(|(_, s)| s.to_string()).into_iter().collect()
    } else if let Some(tok) = distinct.iter().find(|v| {
        config
            .positive_tokens
            .iter()
            .any(|t| t.eq_ignore_ascii_case(v))
    }) {
        HashSet::from([tok.to_string()])
    } else if distinct.len() == 2 {
        // ties keep the lexicographically later value as positive
        let minority = if counts[distinct[0]] < counts[distinct[1]] {
            distinct[0]
        } else {
            distinct[1]
        };
        HashSet::from([minority.to_string()])
    } else {
        let modal = distinct
            .iter()
            .max_by(|a, b| counts[*a].cmp(&counts[*b]).then(b.cmp(a)))
            .copied();
        distinct
            .iter()
            .filter(|v| Some(**v) != modal)
            .map(|v| v.to_string())
            .collect()
    };

    let mut names: Vec<&String> = positive.iter().collect();
    names.sort();
    let description = names
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(" | ");
    let labels = raw
        .into_iter()
        .map(|v| v.map(|s| positive.contains(&s)))
        .collect();
    (labels, description)
}

// ── Class balance ─────────────────────────────────────────────────────

/// Severity of class imbalance (negatives per positive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImbalanceSeverity {
    /// Ratio below 2:1.
    Balanced,
    /// Ratio below 10:1.
    Moderate,
    /// Ratio below 100:1.
    Severe,
    /// Ratio 100:1 or more, or no positives at all.
    Extreme,
}

/// Positive/negative balance of the labeled population.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassBalance {
    pub labeled: usize,
    pub unlabeled: usize,
    pub positives: usize,
    pub negatives: usize,
    pub positive_rate: Option<f64>,
    /// Negatives ÷ positives.
    pub imbalance_ratio: Option<f64>,
    pub severity: ImbalanceSeverity,
}

/// Computes the class balance of resolved labels.
///
/// ```
/// use u_modelrisk::profiler::{class_balance, ImbalanceSeverity};
///
/// let labels: Vec<Option<bool>> = (0..1000).map(|i| Some(i < 20)).collect();
/// let balance = class_balance(&labels);
/// assert_eq!(balance.imbalance_ratio, Some(49.0));
/// assert_eq!(balance.severity, ImbalanceSeverity::Severe);
/// ```
pub fn class_balance(labels: &[Option<bool>]) -> ClassBalance {
    let positives = labels.iter().filter(|l| **l == Some(true)).count();
    let negatives = labels.iter().filter(|l| **l == Some(false)).count();
    let labeled = positives + negatives;
    let imbalance_ratio = stats::count_ratio(negatives, positives);
    let severity = match imbalance_ratio {
        // a lone class is as skewed as it gets
        None => ImbalanceSeverity::Extreme,
        Some(r) => {
            let r = r.max(1.0 / r);
            banding::fixed(
                &[2.0, 10.0, 100.0],
                &[
                    ImbalanceSeverity::Balanced,
                    ImbalanceSeverity::Moderate,
                    ImbalanceSeverity::Severe,
                    ImbalanceSeverity::Extreme,
                ],
                Closed::Left,
            )
            .classify(r)
            .unwrap_or(ImbalanceSeverity::Extreme)
        }
    };
    ClassBalance {
        labeled,
        unlabeled: labels.len() - labeled,
        positives,
        negatives,
        positive_rate: stats::count_ratio(positives, labeled),
        imbalance_ratio,
        severity,
    }
}

// ── Dataset profile ───────────────────────────────────────────────────

/// Full profiler output for one dataset and target choice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetProfile {
    pub dataset_id: String,
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<ColumnProfile>,
    pub candidates: Vec<TargetCandidate>,
    pub target: TargetSelection,
    pub roles: RoleAssignment,
    pub class_balance: ClassBalance,
}

impl DatasetProfile {
    /// Profile of a named column.
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Profiles the dataset and resolves its target.
///
/// Returns the profile together with the resolved labels.
pub fn profile_with_labels(
    ds: &Dataset,
    target_override: Option<&str>,
    config: &ProfilerConfig,
) -> Result<(DatasetProfile, Vec<Option<bool>>), RiskError> {
    if ds.row_count() == 0 || ds.frame().column_count() == 0 {
        return Err(RiskError::Schema(format!("dataset '{}' is empty", ds.id())));
    }
    let columns = profile_columns(ds);
    let candidates = rank_target_candidates(ds, &columns, config);
    let (target_column, source) = resolve_target(ds, &candidates, target_override)?;

    let target_col = ds.frame().require(&target_column)?;
    if target_col.null_count() == target_col.len() {
        return Err(RiskError::Schema(format!(
            "target column '{target_column}' has no values"
        )));
    }
    let (labels, positive_class) = resolve_labels(target_col, config);
    let roles = infer_roles(ds, &columns, &target_column, config);
    tracing::debug!(
        dataset = ds.id(),
        target = %target_column,
        ?source,
        features = roles.features.len(),
        "profiled dataset"
    );

    let profile = DatasetProfile {
        dataset_id: ds.id().to_string(),
        row_count: ds.row_count(),
        column_count: ds.frame().column_count(),
        columns,
        candidates,
        target: TargetSelection {
            column: target_column,
            source,
            positive_class,
        },
        roles,
        class_balance: class_balance(&labels),
    };
    Ok((profile, labels))
}

/// Profiles the dataset and resolves its target.
pub fn profile_dataset(
    ds: &Dataset,
    target_override: Option<&str>,
    config: &ProfilerConfig,
) -> Result<DatasetProfile, RiskError> {
    profile_with_labels(ds, target_override, config).map(|(p, _)| p)
}

// ── Analysis context ──────────────────────────────────────────────────

/// A named, row-aligned numeric column.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericSeries {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// A named, row-aligned categorical column.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorySeries {
    pub name: String,
    pub values: Vec<Option<String>>,
}

/// Per-request resolved view of a dataset that every analysis module reads.
///
/// Built once per request from the immutable snapshot; all vectors are
/// row-aligned with the dataset.
#[derive(Debug, Clone)]
pub struct AnalysisContext<'a> {
    pub dataset: &'a Dataset,
    pub profile: DatasetProfile,
    pub labels: Vec<Option<bool>>,
    pub score: Option<NumericSeries>,
    pub features: Vec<NumericSeries>,
    pub dimensions: Vec<CategorySeries>,
    /// Row indices in temporal order (record position without a time key).
    pub order: Vec<usize>,
    pub monetary: Option<NumericSeries>,
    pub human_decision: Option<Vec<Option<bool>>>,
    /// Problems met while resolving the view that did not stop it.
    pub notes: Vec<String>,
}

impl<'a> AnalysisContext<'a> {
    /// Resolves the per-request view.
    ///
    /// `dimensions` replaces the inferred segment dimensions; names that are
    /// not columns are skipped with a note.
    pub fn build(
        dataset: &'a Dataset,
        target_override: Option<&str>,
        dimensions: Option<&[String]>,
        config: &ProfilerConfig,
    ) -> Result<Self, RiskError> {
        let (profile, labels) = profile_with_labels(dataset, target_override, config)?;
        let frame = dataset.frame();
        let mut notes = Vec::new();

        let numeric = |name: &str| -> Option<NumericSeries> {
            frame
                .column_by_name(name)
                .and_then(Column::to_numeric_options)
                .map(|values| NumericSeries {
                    name: name.to_string(),
                    values,
                })
        };

        let score = profile.roles.score.as_deref().and_then(numeric);
        if let Some(s) = &score {
            let out_of_range = stats::present(&s.values)
                .iter()
                .filter(|v| !(0.0..=1.0).contains(*v))
                .count();
            if out_of_range > 0 {
                notes.push(format!(
                    "score column '{}' has {out_of_range} values outside [0, 1]",
                    s.name
                ));
            }
        }
        let features = profile
            .roles
            .features
            .iter()
            .filter_map(|f| numeric(f.as_str()))
            .collect();
        let monetary = profile.roles.monetary.as_deref().and_then(numeric);
        let human_decision = profile
            .roles
            .human_decision
            .as_deref()
            .and_then(|name| frame.column_by_name(name))
            .map(|col| resolve_labels(col, config).0);

        let requested: Vec<String> = match dimensions {
            Some(dims) => dims.to_vec(),
            None => profile.roles.segments.clone(),
        };
        let mut resolved = Vec::with_capacity(requested.len());
        for name in requested {
            match frame.column_by_name(&name) {
                Some(col) => resolved.push(CategorySeries {
                    values: col.to_label_options(),
                    name,
                }),
                None => notes.push(format!("dimension '{name}' not found; skipped")),
            }
        }

        let order = temporal_order(dataset, profile.roles.time.as_deref());
        for note in &notes {
            tracing::warn!(dataset = dataset.id(), "{note}");
        }

        Ok(Self {
            dataset,
            profile,
            labels,
            score,
            features,
            dimensions: resolved,
            order,
            monetary,
            human_decision,
            notes,
        })
    }

    /// Score column or a degrading error naming the section that needs it.
    pub fn require_score(&self, section: &str) -> Result<&NumericSeries, RiskError> {
        self.score
            .as_ref()
            .ok_or_else(|| RiskError::partial(section, "no score column"))
    }

    /// Rows with both a score and a label.
    pub fn scored_labeled_rows(&self) -> Vec<usize> {
        let Some(score) = &self.score else {
            return Vec::new();
        };
        (0..self.labels.len())
            .filter(|&i| self.labels[i].is_some() && score.values[i].is_some())
            .collect()
    }

    /// Numeric reading of any dataset column.
    pub fn numeric_column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        self.dataset
            .frame()
            .column_by_name(name)
            .and_then(Column::to_numeric_options)
    }

    /// String reading of any dataset column.
    pub fn label_column(&self, name: &str) -> Option<Vec<Option<String>>> {
        self.dataset
            .frame()
            .column_by_name(name)
            .map(Column::to_label_options)
    }

    /// Labels as 0/1 numeric values.
    pub fn target_numeric(&self) -> Vec<Option<f64>> {
        stats::labels_as_numeric(&self.labels)
    }

    /// Model flags at `threshold` (`score >= threshold`).
    pub fn flags(&self, threshold: f64) -> Vec<Option<bool>> {
        match &self.score {
            Some(s) => s.values.iter().map(|v| v.map(|x| x >= threshold)).collect(),
            None => vec![None; self.labels.len()],
        }
    }
}

/// Row order by the time column: numeric keys ascending, otherwise string
/// keys ascending; rows without a key keep their position at the end.
fn temporal_order(ds: &Dataset, time: Option<&str>) -> Vec<usize> {
    let rows: Vec<usize> = (0..ds.row_count()).collect();
    let Some(col) = time.and_then(|t| ds.frame().column_by_name(t)) else {
        return rows;
    };
    let mut keyed: Vec<usize> = rows.iter().copied().filter(|&i| col.is_valid(i)).collect();
    let unkeyed = rows.iter().copied().filter(|&i| !col.is_valid(i));
    match col.to_numeric_options() {
        Some(nums) => keyed.sort_by(|&a, &b| {
            let (ka, kb) = (nums[a].unwrap_or(f64::INFINITY), nums[b].unwrap_or(f64::INFINITY));
            ka.total_cmp(&kb)
        }),
        None => {
            let keys = col.to_label_options();
            keyed.sort_by(|&a, &b| keys[a].cmp(&keys[b]));
        }
    }
    keyed.extend(unkeyed);
    keyed
}

// ── Report ────────────────────────────────────────────────────────────

/// Profiler output as a module report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileReport {
    pub dataset: DatasetProfile,
    /// Segment dimensions in effect for this request.
    pub dimensions: Vec<String>,
    pub ordered_by: Option<String>,
    pub status: ReportStatus,
}

/// Wraps the context's profile as a report.
pub fn profile_report(ctx: &AnalysisContext) -> ProfileReport {
    ProfileReport {
        dataset: ctx.profile.clone(),
        dimensions: ctx.dimensions.iter().map(|d| d.name.clone()).collect(),
        ordered_by: ctx.profile.roles.time.clone(),
        status: ReportStatus::with_notes(&ctx.notes),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
