//! Binary decision metrics at a score threshold.
//!
//! - [`ConfusionMatrix`]: TP/FP/FN/TN with derived rates
//! - [`CostModel`]: monetary value of a decision policy
//! - [`threshold_sweep`]: metrics across a percentile grid of cut points
//!
//! A record is *flagged* when `score >= threshold`.
//!
//! ```
//! use u_modelrisk::classification::ConfusionMatrix;
//!
//! let cm = ConfusionMatrix::from_scores(&[0.9, 0.8, 0.2, 0.1], &[true, false, true, false], 0.5)
//!     .unwrap();
//! assert_eq!(cm.total(), 4);
//! assert_eq!(cm.precision(), Some(0.5));
//! assert_eq!(cm.recall(), Some(0.5));
//! ```

use crate::error::RiskError;
use crate::stats::{self, count_ratio, ratio};
use serde::{Deserialize, Serialize};

// ── Confusion matrix ──────────────────────────────────────────────────

/// Counts of a binary decision against observed outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub true_positive: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_negative: usize,
}

impl ConfusionMatrix {
    /// Builds the matrix from paired labels and decisions.
    pub fn from_labels(labels: &[bool], flags: &[bool]) -> Result<Self, RiskError> {
        if labels.len() != flags.len() {
            return Err(RiskError::DimensionMismatch {
                expected: labels.len(),
                actual: flags.len(),
            });
        }
        let mut cm = Self::default();
        for (&label, &flag) in labels.iter().zip(flags.iter()) {
            cm.record(label, flag);
        }
        Ok(cm)
    }

    /// Builds the matrix by flagging `score >= threshold`.
    pub fn from_scores(scores: &[f64], labels: &[bool], threshold: f64) -> Result<Self, RiskError> {
        let flags: Vec<bool> = scores.iter().map(|&s| s >= threshold).collect();
        Self::from_labels(labels, &flags)
    }

    /// Adds one observation.
    #[inline]
    pub fn record(&mut self, label: bool, flag: bool) {
        match (label, flag) {
            (true, true) => self.true_positive += 1,
            (false, true) => self.false_positive += 1,
            (true, false) => self.false_negative += 1,
            (false, false) => self.true_negative += 1,
        }
    }

    /// Population size.
    pub fn total(&self) -> usize {
        self.true_positive + self.false_positive + self.false_negative + self.true_negative
    }

    /// Flagged count.
    pub fn flagged(&self) -> usize {
        self.true_positive + self.false_positive
    }

    /// Positive count.
    pub fn positives(&self) -> usize {
        self.true_positive + self.false_negative
    }

    /// Negative count.
    pub fn negatives(&self) -> usize {
        self.false_positive + self.true_negative
    }

    /// TP / flagged.
    pub fn precision(&self) -> Option<f64> {
        count_ratio(self.true_positive, self.flagged())
    }

    /// TP / positives (catch rate).
    pub fn recall(&self) -> Option<f64> {
        count_ratio(self.true_positive, self.positives())
    }

    /// Harmonic mean of precision and recall.
    pub fn f1(&self) -> Option<f64> {
        let p = self.precision()?;
        let r = self.recall()?;
        ratio(2.0 * p * r, p + r)
    }

    /// FP / negatives.
    pub fn false_positive_rate(&self) -> Option<f64> {
        count_ratio(self.false_positive, self.negatives())
    }

    /// Flagged / total (decline rate).
    pub fn flag_rate(&self) -> Option<f64> {
        count_ratio(self.flagged(), self.total())
    }

    /// Positives / total.
    pub fn positive_rate(&self) -> Option<f64> {
        count_ratio(self.positives(), self.total())
    }
}

// ── Cost model ────────────────────────────────────────────────────────

/// Unit economics of declining a transaction.
///
/// When per-record amounts are available they replace the average amounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModel {
    /// Average loss of one fraudulent transaction. Default: 250.0.
    pub avg_fraud_amount: f64,
    /// Average spend of one legitimate transaction. Default: 100.0.
    pub avg_legit_amount: f64,
    /// Fraction of blocked legitimate spend that is actually lost
    /// (margin plus churn). Default: 0.3.
    pub good_spend_loss_rate: f64,
    /// Fraction of fraud a step-up challenge stops. Default: 0.7.
    pub step_up_catch_rate: f64,
    /// Fraction of legitimate customers a step-up challenge drives away.
    /// Default: 0.1.
    pub step_up_friction_rate: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            avg_fraud_amount: 250.0,
            avg_legit_amount: 100.0,
            good_spend_loss_rate: 0.3,
            step_up_catch_rate: 0.7,
            step_up_friction_rate: 0.1,
        }
    }
}

impl CostModel {
    /// Sets the average fraud amount.
    pub fn avg_fraud_amount(mut self, v: f64) -> Self {
        self.avg_fraud_amount = v;
        self
    }

    /// Sets the average legitimate amount.
    pub fn avg_legit_amount(mut self, v: f64) -> Self {
        self.avg_legit_amount = v;
        self
    }

    /// Amount of record `idx`, falling back to the average for its class.
    pub fn amount(&self, amounts: Option<&[Option<f64>]>, idx: usize, is_fraud: bool) -> f64 {
        amounts
            .and_then(|a| a.get(idx).copied().flatten())
            .unwrap_or(if is_fraud {
                self.avg_fraud_amount
            } else {
                self.avg_legit_amount
            })
    }

    /// Monetary outcome of declining the flagged records.
    pub fn decline_outcome(&self, fraud_declined: f64, legit_declined: f64) -> MonetaryOutcome {
        let fraud_prevented = fraud_declined;
        let good_spend_blocked = legit_declined * self.good_spend_loss_rate;
        MonetaryOutcome {
            fraud_prevented,
            good_spend_blocked,
            net_value: fraud_prevented - good_spend_blocked,
        }
    }
}

/// Money saved and lost by a decision policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MonetaryOutcome {
    pub fraud_prevented: f64,
    pub good_spend_blocked: f64,
    pub net_value: f64,
}

// ── Threshold sweep ───────────────────────────────────────────────────

/// Metrics at one cut point of a threshold sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SweepPoint {
    /// Score percentile of the cut point (0–100).
    pub percentile: f64,
    /// Score threshold at that percentile.
    pub threshold: f64,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1: Option<f64>,
    /// Fraction of scored records flagged.
    pub decline_rate: Option<f64>,
    pub matrix: ConfusionMatrix,
    pub monetary: MonetaryOutcome,
}

/// Evaluates every percentile cut point in `grid` over labeled rows.
///
/// `scores` and `labels` are row-aligned; rows with a missing score or label
/// are skipped. `amounts`, when given, is row-aligned with the same input.
pub fn threshold_sweep(
    scores: &[Option<f64>],
    labels: &[Option<bool>],
    grid: &[f64],
    cost: &CostModel,
    amounts: Option<&[Option<f64>]>,
) -> Result<Vec<SweepPoint>, RiskError> {
    if scores.len() != labels.len() {
        return Err(RiskError::DimensionMismatch {
            expected: scores.len(),
            actual: labels.len(),
        });
    }
    let rows: Vec<(usize, f64, bool)> = scores
        .iter()
        .zip(labels.iter())
        .enumerate()
        .filter_map(|(i, (s, l))| Some((i, (*s)?, (*l)?)))
        .collect();
    if rows.is_empty() {
        return Err(RiskError::partial("threshold sweep", "no rows with both score and label"));
    }
    let all_scores: Vec<f64> = rows.iter().map(|r| r.1).collect();

    let mut points = Vec::with_capacity(grid.len());
    for &pct in grid {
        let Some(threshold) = stats::quantile(&all_scores, pct / 100.0) else {
            continue;
        };
        let mut matrix = ConfusionMatrix::default();
        let (mut fraud_amt, mut legit_amt) = (0.0, 0.0);
        for &(idx, score, label) in &rows {
            let flag = score >= threshold;
            matrix.record(label, flag);
            if flag {
                let amt = cost.amount(amounts, idx, label);
                if label {
                    fraud_amt += amt;
                } else {
                    legit_amt += amt;
                }
            }
        }
        points.push(SweepPoint {
            percentile: pct,
            threshold,
            precision: matrix.precision(),
            recall: matrix.recall(),
            f1: matrix.f1(),
            decline_rate: matrix.flag_rate(),
            matrix,
            monetary: cost.decline_outcome(fraud_amt, legit_amt),
        });
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn undefined_rates_are_none() {
        let cm = ConfusionMatrix::from_scores(&[0.1, 0.2], &[false, false], 0.5).unwrap();
        assert_eq!(cm.precision(), None);
        assert_eq!(cm.recall(), None);
        assert_eq!(cm.f1(), None);
        assert_eq!(cm.false_positive_rate(), Some(0.0));
    }

    #[test]
    fn mismatched_lengths_rejected() {
        assert!(ConfusionMatrix::from_labels(&[true], &[true, false]).is_err());
    }

    #[test]
    fn cost_model_prefers_record_amounts() {
        let cost = CostModel::default();
        let amounts = vec![Some(40.0), None];
        assert_eq!(cost.amount(Some(&amounts), 0, true), 40.0);
        assert_eq!(cost.amount(Some(&amounts), 1, true), 250.0);
        assert_eq!(cost.amount(None, 0, false), 100.0);
    }

    #[test]
    fn decline_outcome_nets_blocked_spend() {
        let out = CostModel::default().decline_outcome(1000.0, 500.0);
        assert_eq!(out.good_spend_blocked, 150.0);
        assert_eq!(out.net_value, 850.0);
    }

    #[test]
    fn sweep_higher_percentile_flags_fewer() {
        let scores: Vec<Option<f64>> = (0..100).map(|i| Some(i as f64 / 100.0)).collect();
        let labels: Vec<Option<bool>> = (0..100).map(|i| Some(i >= 80)).collect();
        let points =
            threshold_sweep(&scores, &labels, &[50.0, 90.0], &CostModel::default(), None).unwrap();
        assert_eq!(points.len(), 2);
        assert!(points[0].matrix.flagged() > points[1].matrix.flagged());
        assert_eq!(points[1].precision, Some(1.0));
        assert!(points[1].recall.unwrap() < 1.0);
        assert!(points[0].recall == Some(1.0));
    }

    #[test]
    fn sweep_requires_labeled_rows() {
        let err = threshold_sweep(&[Some(0.4)], &[None], &[50.0], &CostModel::default(), None)
            .unwrap_err();
        assert!(err.is_degrading());
    }

    proptest! {
        #[test]
        fn confusion_counts_sum_to_population(
            rows in prop::collection::vec((0.0f64..1.0, any::<bool>()), 0..300),
            threshold in 0.0f64..1.0,
        ) {
            let scores: Vec<f64> = rows.iter().map(|r| r.0).collect();
            let labels: Vec<bool> = rows.iter().map(|r| r.1).collect();
            let cm = ConfusionMatrix::from_scores(&scores, &labels, threshold).unwrap();
            prop_assert_eq!(cm.total(), rows.len());
        }
    }
}
