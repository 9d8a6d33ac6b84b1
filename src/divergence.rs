//! Distribution divergence between two samples of the same variable.
//!
//! - **PSI** (population stability index) over equal-width buckets spanning
//!   the combined range of both samples
//! - **Two-sample Kolmogorov–Smirnov** statistic over the `u-analytics`
//!   empirical CDFs, with an asymptotic p-value
//!
//! ```
//! use u_modelrisk::divergence::{psi, PsiBand};
//!
//! let base: Vec<f64> = (0..100).map(|i| i as f64 / 100.0).collect();
//! assert_eq!(psi(&base, &base, 10), Some(0.0));
//!
//! let shifted: Vec<f64> = base.iter().map(|v| v + 0.5).collect();
//! let value = psi(&base, &shifted, 10).unwrap();
//! assert_eq!(PsiBand::of(value), Some(PsiBand::Significant));
//! ```

use crate::banding::{self, Closed};
use serde::Serialize;

/// Proportion floor applied to every bucket before the log term.
pub const PSI_FLOOR: f64 = 1e-4;

/// Stability band of a PSI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PsiBand {
    /// PSI ≤ 0.1.
    Stable,
    /// 0.1 < PSI ≤ 0.25.
    Moderate,
    /// PSI > 0.25.
    Significant,
}

impl PsiBand {
    /// Band for a PSI value; `None` for NaN.
    pub fn of(psi: f64) -> Option<Self> {
        banding::fixed(
            &[0.1, 0.25],
            &[Self::Stable, Self::Moderate, Self::Significant],
            Closed::Right,
        )
        .classify(psi)
    }
}

/// Population stability index of `actual` against `expected`.
///
/// Non-finite values are ignored. Returns `None` when either sample is empty
/// or `buckets` is zero. Identical samples give exactly `0.0`.
pub fn psi(expected: &[f64], actual: &[f64], buckets: usize) -> Option<f64> {
    let e: Vec<f64> = expected.iter().copied().filter(|v| v.is_finite()).collect();
    let a: Vec<f64> = actual.iter().copied().filter(|v| v.is_finite()).collect();
    if e.is_empty() || a.is_empty() || buckets == 0 {
        return None;
    }

    let (min, max) = e
        .iter()
        .chain(a.iter())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if max - min < 1e-15 {
        return Some(0.0);
    }

    let e_props = bucket_proportions(&e, min, max, buckets);
    let a_props = bucket_proportions(&a, min, max, buckets);

    let value = e_props
        .iter()
        .zip(a_props.iter())
        .map(|(&pe, &pa)| {
            let pe = pe.max(PSI_FLOOR);
            let pa = pa.max(PSI_FLOOR);
            (pa - pe) * (pa / pe).ln()
        })
        .sum::<f64>();
    Some(value.max(0.0))
}

fn bucket_proportions(values: &[f64], min: f64, max: f64, buckets: usize) -> Vec<f64> {
    let width = (max - min) / buckets as f64;
    let mut counts = vec![0usize; buckets];
    for &v in values {
        let idx = (((v - min) / width).floor() as usize).min(buckets - 1);
        counts[idx] += 1;
    }
    let n = values.len() as f64;
    counts.into_iter().map(|c| c as f64 / n).collect()
}

// ── Kolmogorov–Smirnov ────────────────────────────────────────────────

/// Two-sample Kolmogorov–Smirnov result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KsResult {
    /// Maximum distance between the two empirical CDFs.
    pub statistic: f64,
    /// Asymptotic p-value of the statistic.
    pub p_value: f64,
}

/// Two-sample KS test.
///
/// Returns `None` when either sample has no finite values.
///
/// ```
/// use u_modelrisk::divergence::ks_two_sample;
///
/// let a: Vec<f64> = (0..50).map(|i| i as f64).collect();
/// let same = ks_two_sample(&a, &a).unwrap();
/// assert_eq!(same.statistic, 0.0);
/// assert!(same.p_value > 0.99);
/// ```
pub fn ks_two_sample(a: &[f64], b: &[f64]) -> Option<KsResult> {
    let xs: Vec<f64> = a.iter().copied().filter(|v| v.is_finite()).collect();
    let ys: Vec<f64> = b.iter().copied().filter(|v| v.is_finite()).collect();
    if xs.is_empty() || ys.is_empty() {
        return None;
    }
    let (n, m) = (xs.len(), ys.len());
    let (xa, pa) = u_analytics::distribution::ecdf(&xs)?;
    let (xb, pb) = u_analytics::distribution::ecdf(&ys)?;
    let cdf = |values: &[f64], probs: &[f64], x: f64| match values.partition_point(|v| *v <= x) {
        0 => 0.0,
        k => probs[k - 1],
    };
    let d = xa
        .iter()
        .chain(xb.iter())
        .map(|&x| (cdf(&xa, &pa, x) - cdf(&xb, &pb, x)).abs())
        .fold(0.0f64, f64::max);

    let en = (n as f64 * m as f64 / (n + m) as f64).sqrt();
    let lambda = (en + 0.12 + 0.11 / en) * d;
    Some(KsResult {
        statistic: d,
        p_value: kolmogorov_q(lambda),
    })
}

/// Survival function of the Kolmogorov distribution.
fn kolmogorov_q(lambda: f64) -> f64 {
    if lambda < 1e-3 {
        return 1.0;
    }
    let mut sum = 0.0;
    let mut sign = 1.0;
    for k in 1..=100 {
        let kf = k as f64;
        let term = sign * (-2.0 * kf * kf * lambda * lambda).exp();
        sum += term;
        if term.abs() < 1e-12 {
            break;
        }
        sign = -sign;
    }
    (2.0 * sum).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn psi_empty_inputs() {
        assert_eq!(psi(&[], &[1.0], 10), None);
        assert_eq!(psi(&[1.0], &[1.0], 0), None);
    }

    #[test]
    fn psi_constant_samples_are_stable() {
        assert_eq!(psi(&[3.0; 10], &[3.0; 4], 10), Some(0.0));
    }

    #[test]
    fn psi_is_finite_with_empty_buckets() {
        let base = vec![0.0, 0.0, 0.0, 1.0];
        let recent = vec![1.0, 1.0, 1.0, 1.0];
        let value = psi(&base, &recent, 10).unwrap();
        assert!(value.is_finite() && value > 0.25, "psi = {value}");
    }

    #[test]
    fn psi_bands() {
        assert_eq!(PsiBand::of(0.1), Some(PsiBand::Stable));
        assert_eq!(PsiBand::of(0.2), Some(PsiBand::Moderate));
        assert_eq!(PsiBand::of(0.26), Some(PsiBand::Significant));
        assert_eq!(PsiBand::of(f64::NAN), None);
    }

    #[test]
    fn ks_detects_shift() {
        let a: Vec<f64> = (0..200).map(|i| i as f64 / 200.0).collect();
        let b: Vec<f64> = a.iter().map(|v| v + 0.5).collect();
        let r = ks_two_sample(&a, &b).unwrap();
        assert!((r.statistic - 0.5).abs() < 0.01, "D = {}", r.statistic);
        assert!(r.p_value < 1e-6);
    }

    #[test]
    fn ks_handles_ties() {
        let r = ks_two_sample(&[1.0, 1.0, 2.0, 2.0], &[1.0, 2.0, 2.0, 2.0]).unwrap();
        assert!((r.statistic - 0.25).abs() < 1e-12, "D = {}", r.statistic);
    }

    #[test]
    fn ks_large_unequal_samples() {
        let a: Vec<f64> = (0..120_000).map(|i| (i % 1000) as f64).collect();
        let b: Vec<f64> = (0..90_000).map(|i| (i % 1000) as f64).collect();
        let r = ks_two_sample(&a, &b).unwrap();
        assert!(r.statistic < 1e-9, "D = {}", r.statistic);
        assert!(r.p_value > 0.99);
    }

    #[test]
    fn ks_missing_sample() {
        assert!(ks_two_sample(&[f64::NAN], &[1.0]).is_none());
    }

    proptest! {
        #[test]
        fn psi_of_identical_distribution_is_zero(
            data in prop::collection::vec(-1e6f64..1e6, 1..200),
            buckets in 1usize..30,
        ) {
            prop_assert_eq!(psi(&data, &data, buckets), Some(0.0));
        }

        #[test]
        fn psi_is_non_negative(
            a in prop::collection::vec(0.0f64..1.0, 1..100),
            b in prop::collection::vec(0.0f64..1.0, 1..100),
        ) {
            let v = psi(&a, &b, 10).unwrap();
            prop_assert!(v >= 0.0);
        }
    }
}
