//! Group-by aggregation of decision quality per segment value.
//!
//! Every record lands in exactly one segment of a dimension: missing values
//! form [`MISSING_SEGMENT`] and values beyond the cap fold into
//! [`OTHER_SEGMENT`], so segment counts always sum to the population.
//!
//! ```
//! use u_modelrisk::segment::{segment_aggregate, SegmentConfig};
//!
//! let region: Vec<Option<String>> = ["eu", "eu", "us", "us"].iter().map(|s| Some(s.to_string())).collect();
//! let scores = vec![Some(0.9), Some(0.1), Some(0.8), Some(0.2)];
//! let labels = vec![Some(true), Some(false), Some(false), Some(false)];
//! let table = segment_aggregate("region", &region, &scores, &labels, 0.5, &SegmentConfig::default()).unwrap();
//! assert_eq!(table.segments.iter().map(|s| s.count).sum::<usize>(), 4);
//! ```

use crate::classification::ConfusionMatrix;
use crate::error::RiskError;
use crate::stats::count_ratio;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Segment key for records with no value in the dimension.
pub const MISSING_SEGMENT: &str = "(missing)";
/// Segment key collecting values beyond `max_segments`.
pub const OTHER_SEGMENT: &str = "(other)";

/// Configuration for segment aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Maximum explicit segments per dimension. Default: 50.
    pub max_segments: usize,
    /// A segment is a local disaster when its precision or recall is more
    /// than this fraction below the global value. Default: 0.5.
    pub disaster_fraction: f64,
    /// Minimum labeled, scored records for a segment to be judged. Default: 5.
    pub min_segment_size: usize,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_segments: 50,
            disaster_fraction: 0.5,
            min_segment_size: 5,
        }
    }
}

impl SegmentConfig {
    /// Sets the segment cap.
    pub fn max_segments(mut self, n: usize) -> Self {
        self.max_segments = n;
        self
    }

    /// Sets the local-disaster fraction.
    pub fn disaster_fraction(mut self, f: f64) -> Self {
        self.disaster_fraction = f;
        self
    }

    /// Sets the minimum judged segment size.
    pub fn min_segment_size(mut self, n: usize) -> Self {
        self.min_segment_size = n;
        self
    }
}

/// Groups row indices by value.
///
/// Groups come back largest first (ties by value). The `max_segments` most
/// frequent values keep their own group; the rest share [`OTHER_SEGMENT`].
/// Missing values always get [`MISSING_SEGMENT`].
pub fn group_by(values: &[Option<String>], max_segments: usize) -> Vec<(String, Vec<usize>)> {
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    let mut missing = Vec::new();
    for (i, v) in values.iter().enumerate() {
        match v {
            Some(v) => groups.entry(v.as_str()).or_default().push(i),
            None => missing.push(i),
        }
    }

    let mut ordered: Vec<(String, Vec<usize>)> = groups
        .into_iter()
        .map(|(k, rows)| (k.to_string(), rows))
        .collect();
    ordered.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(&b.0)));

    if ordered.len() > max_segments {
        let mut other: Vec<usize> = ordered
            .drain(max_segments..)
            .flat_map(|(_, rows)| rows)
            .collect();
        other.sort_unstable();
        ordered.push((OTHER_SEGMENT.to_string(), other));
    }
    if !missing.is_empty() {
        ordered.push((MISSING_SEGMENT.to_string(), missing));
    }
    ordered
}

/// Decision quality of one segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentStats {
    pub value: String,
    /// All records in the segment.
    pub count: usize,
    /// Records with a label.
    pub labeled: usize,
    pub positive_rate: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    /// Counts over records with both score and label.
    pub matrix: ConfusionMatrix,
    pub local_disaster: bool,
    /// Which metrics collapsed, e.g. `"precision 0.00 vs global 0.90"`.
    pub disaster_reasons: Vec<String>,
}

/// Segment table for one dimension.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentTable {
    pub dimension: String,
    pub threshold: f64,
    pub population: usize,
    pub global_precision: Option<f64>,
    pub global_recall: Option<f64>,
    pub global_positive_rate: Option<f64>,
    pub segments: Vec<SegmentStats>,
}

impl SegmentTable {
    /// Segments flagged as local disasters.
    pub fn disasters(&self) -> impl Iterator<Item = &SegmentStats> {
        self.segments.iter().filter(|s| s.local_disaster)
    }
}

fn matrix_over(rows: &[usize], scores: &[Option<f64>], labels: &[Option<bool>], threshold: f64) -> ConfusionMatrix {
    let mut cm = ConfusionMatrix::default();
    for &i in rows {
        if let (Some(s), Some(l)) = (scores[i], labels[i]) {
            cm.record(l, s >= threshold);
        }
    }
    cm
}

fn collapsed(local: Option<f64>, global: Option<f64>, fraction: f64) -> Option<(f64, f64)> {
    let (l, g) = (local?, global?);
    (l < g * (1.0 - fraction)).then_some((l, g))
}

/// Aggregates count, positive rate, precision and recall per value of one
/// dimension, flagging local disasters.
///
/// All three slices are row-aligned.
pub fn segment_aggregate(
    dimension: &str,
    values: &[Option<String>],
    scores: &[Option<f64>],
    labels: &[Option<bool>],
    threshold: f64,
    config: &SegmentConfig,
) -> Result<SegmentTable, RiskError> {
    for len in [scores.len(), labels.len()] {
        if len != values.len() {
            return Err(RiskError::DimensionMismatch {
                expected: values.len(),
                actual: len,
            });
        }
    }

    let all_rows: Vec<usize> = (0..values.len()).collect();
    let global = matrix_over(&all_rows, scores, labels, threshold);
    let labeled_total = labels.iter().filter(|l| l.is_some()).count();
    let positives_total = labels.iter().filter(|l| **l == Some(true)).count();

    let segments = group_by(values, config.max_segments)
        .into_iter()
        .map(|(value, rows)| {
            let matrix = matrix_over(&rows, scores, labels, threshold);
            let labeled = rows.iter().filter(|&&i| labels[i].is_some()).count();
            let positives = rows.iter().filter(|&&i| labels[i] == Some(true)).count();

            let mut disaster_reasons = Vec::new();
            if matrix.total() >= config.min_segment_size {
                let checks = [
                    ("precision", matrix.precision(), global.precision()),
                    ("recall", matrix.recall(), global.recall()),
                ];
                for (metric, local, global) in checks {
                    if let Some((l, g)) = collapsed(local, global, config.disaster_fraction) {
                        disaster_reasons.push(format!("{metric} {l:.2} vs global {g:.2}"));
                    }
                }
            }

            SegmentStats {
                value,
                count: rows.len(),
                labeled,
                positive_rate: count_ratio(positives, labeled),
                precision: matrix.precision(),
                recall: matrix.recall(),
                matrix,
                local_disaster: !disaster_reasons.is_empty(),
                disaster_reasons,
            }
        })
        .collect();

    Ok(SegmentTable {
        dimension: dimension.to_string(),
        threshold,
        population: values.len(),
        global_precision: global.precision(),
        global_recall: global.recall(),
        global_positive_rate: count_ratio(positives_total, labeled_total),
        segments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strings(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|v| v.map(String::from)).collect()
    }

    #[test]
    fn missing_values_get_their_own_segment() {
        let groups = group_by(&strings(&[Some("a"), None, Some("b"), Some("a")]), 10);
        assert_eq!(groups[0], ("a".to_string(), vec![0, 3]));
        assert_eq!(groups[1], ("b".to_string(), vec![2]));
        assert_eq!(groups[2], (MISSING_SEGMENT.to_string(), vec![1]));
    }

    #[test]
    fn overflow_folds_into_other() {
        let values = strings(&[Some("a"), Some("a"), Some("b"), Some("c"), Some("d")]);
        let groups = group_by(&values, 2);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[2], (OTHER_SEGMENT.to_string(), vec![3, 4]));
    }

    #[test]
    fn low_precision_segment_is_disaster() {
        // 90 records in "good": 90% precision; 10 records in "bad": all false alarms
        let mut values = Vec::new();
        let mut scores = Vec::new();
        let mut labels = Vec::new();
        for i in 0..90 {
            values.push(Some("good".to_string()));
            scores.push(Some(0.9));
            labels.push(Some(i % 10 != 0));
        }
        for _ in 0..10 {
            values.push(Some("bad".to_string()));
            scores.push(Some(0.9));
            labels.push(Some(false));
        }
        let table =
            segment_aggregate("merchant", &values, &scores, &labels, 0.5, &SegmentConfig::default())
                .unwrap();
        let bad = table.segments.iter().find(|s| s.value == "bad").unwrap();
        assert_eq!(bad.precision, Some(0.0));
        assert!(bad.local_disaster, "reasons: {:?}", bad.disaster_reasons);
        let good = table.segments.iter().find(|s| s.value == "good").unwrap();
        assert!(!good.local_disaster);
        assert_eq!(table.disasters().count(), 1);
    }

    #[test]
    fn tiny_segments_are_not_judged() {
        let values = strings(&[Some("x"), Some("y"), Some("y"), Some("y"), Some("y"), Some("y")]);
        let scores = vec![Some(0.9); 6];
        let labels = vec![Some(false), Some(true), Some(true), Some(true), Some(true), Some(true)];
        let table =
            segment_aggregate("d", &values, &scores, &labels, 0.5, &SegmentConfig::default()).unwrap();
        assert!(table.segments.iter().all(|s| !s.local_disaster));
    }

    #[test]
    fn length_mismatch_rejected() {
        let err = segment_aggregate("d", &strings(&[Some("a")]), &[], &[None], 0.5, &SegmentConfig::default())
            .unwrap_err();
        assert!(matches!(err, RiskError::DimensionMismatch { .. }));
    }

    proptest! {
        #[test]
        fn segment_counts_sum_to_population(
            rows in prop::collection::vec((prop::option::of(0u8..8), 0.0f64..1.0, any::<bool>()), 0..200),
            cap in 1usize..6,
        ) {
            let values: Vec<Option<String>> = rows.iter().map(|r| r.0.map(|v| format!("v{v}"))).collect();
            let scores: Vec<Option<f64>> = rows.iter().map(|r| Some(r.1)).collect();
            let labels: Vec<Option<bool>> = rows.iter().map(|r| Some(r.2)).collect();
            let cfg = SegmentConfig::default().max_segments(cap);
            let table = segment_aggregate("d", &values, &scores, &labels, 0.5, &cfg).unwrap();
            prop_assert_eq!(table.segments.iter().map(|s| s.count).sum::<usize>(), rows.len());
        }
    }
}
