//! Shared descriptive statistics over possibly-missing data.
//!
//! Thin wrappers over `u-numflow` and `u-analytics` plus the pieces the
//! analysis modules need repeatedly: pairwise-complete Pearson correlation,
//! standardized mean deviation of a subset, least-squares slope and
//! equal-frequency binning.
//! Every function returns `None` instead of NaN when its result is undefined.

use serde::Serialize;

/// Mean of the values; `None` when empty.
pub fn mean(values: &[f64]) -> Option<f64> {
    u_numflow::stats::mean(values).filter(|v| v.is_finite())
}

/// Sample standard deviation; `None` for fewer than two values.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    u_numflow::stats::std_dev(values).filter(|v| v.is_finite())
}

/// Median; `None` when empty.
pub fn median(values: &[f64]) -> Option<f64> {
    u_numflow::stats::median(values).filter(|v| v.is_finite())
}

/// Quantile `q` in [0, 1]; `None` when empty.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    u_numflow::stats::quantile(values, q.clamp(0.0, 1.0)).filter(|v| v.is_finite())
}

/// `num / den`, or `None` when `den` is zero.
#[inline]
pub fn ratio(num: f64, den: f64) -> Option<f64> {
    if den == 0.0 {
        None
    } else {
        Some(num / den)
    }
}

/// `num / den` over counts, or `None` when `den` is zero.
#[inline]
pub fn count_ratio(num: usize, den: usize) -> Option<f64> {
    ratio(num as f64, den as f64)
}

/// Present values of an optional column.
pub fn present(values: &[Option<f64>]) -> Vec<f64> {
    values.iter().filter_map(|v| *v).collect()
}

/// Present values of an optional column restricted to `rows`.
pub fn present_at(values: &[Option<f64>], rows: &[usize]) -> Vec<f64> {
    rows.iter().filter_map(|&i| values.get(i).copied().flatten()).collect()
}

/// Pearson correlation of two equal-length slices.
///
/// `None` when fewer than 3 pairs or either side has zero variance.
///
/// ```
/// use u_modelrisk::stats::pearson;
///
/// let r = pearson(&[1.0, 2.0, 3.0, 4.0], &[2.0, 4.0, 6.0, 8.0]).unwrap();
/// assert!((r - 1.0).abs() < 1e-9);
/// assert!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_none());
/// ```
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 3 {
        return None;
    }
    let (x, y) = (&x[..n], &y[..n]);
    if !has_spread(x) || !has_spread(y) {
        return None;
    }
    let matrix = u_analytics::correlation::correlation_matrix(&[x, y])?;
    let r = matrix.get(0, 1);
    r.is_finite().then_some(r.clamp(-1.0, 1.0))
}

fn has_spread(values: &[f64]) -> bool {
    std_dev(values).is_some_and(|s| s > 1e-12)
}

/// Pearson correlation over rows where both sides are present.
pub fn pearson_pairwise(x: &[Option<f64>], y: &[Option<f64>]) -> Option<f64> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y.iter())
        .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
        .unzip();
    pearson(&xs, &ys)
}

/// Pearson correlation over the given rows where both sides are present.
pub fn pearson_rows(x: &[Option<f64>], y: &[Option<f64>], rows: &[usize]) -> Option<f64> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = rows
        .iter()
        .filter_map(|&i| Some((x.get(i).copied().flatten()?, y.get(i).copied().flatten()?)))
        .unzip();
    pearson(&xs, &ys)
}

/// Labels as a 0/1 numeric column.
pub fn labels_as_numeric(labels: &[Option<bool>]) -> Vec<Option<f64>> {
    labels
        .iter()
        .map(|l| l.map(|b| if b { 1.0 } else { 0.0 }))
        .collect()
}

// ── Z-score deviation ─────────────────────────────────────────────────

/// Standardized mean shift of a feature inside a subset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZScoreDeviation {
    /// Mean inside the subset.
    pub subset_mean: f64,
    /// Mean over the full population.
    pub population_mean: f64,
    /// Population standard deviation.
    pub population_std: f64,
    /// `(subset_mean - population_mean) / population_std`.
    pub z: f64,
    /// Present values inside the subset.
    pub subset_count: usize,
}

/// Standardized mean shift of `feature` inside `subset_mask` vs the whole
/// column.
///
/// `None` when the subset has no present values or the population has zero
/// variance.
///
/// ```
/// use u_modelrisk::stats::zscore_deviation;
///
/// let feature: Vec<Option<f64>> = (0..10).map(|i| Some(i as f64)).collect();
/// let mask: Vec<bool> = (0..10).map(|i| i >= 8).collect();
/// let dev = zscore_deviation(&feature, &mask).unwrap();
/// assert!(dev.z > 1.0);
/// ```
pub fn zscore_deviation(feature: &[Option<f64>], subset_mask: &[bool]) -> Option<ZScoreDeviation> {
    let population = present(feature);
    let subset: Vec<f64> = feature
        .iter()
        .zip(subset_mask.iter())
        .filter_map(|(v, &m)| if m { *v } else { None })
        .collect();
    let population_mean = mean(&population)?;
    let population_std = std_dev(&population).filter(|s| *s > 1e-12)?;
    let subset_mean = mean(&subset)?;
    Some(ZScoreDeviation {
        subset_mean,
        population_mean,
        population_std,
        z: (subset_mean - population_mean) / population_std,
        subset_count: subset.len(),
    })
}

// ── Trend ─────────────────────────────────────────────────────────────

/// Least-squares slope of `(x, y)` points.
///
/// `None` with fewer than two points or no spread in `x`.
pub fn linear_slope(points: &[(f64, f64)]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }
    let (xs, ys): (Vec<f64>, Vec<f64>) = points.iter().copied().unzip();
    if !has_spread(&xs) {
        return None;
    }
    if !has_spread(&ys) {
        return Some(0.0);
    }
    // regression needs at least three points
    if let [(x0, y0), (x1, y1)] = points {
        return Some((y1 - y0) / (x1 - x0));
    }
    u_analytics::regression::simple_linear_regression(&xs, &ys)
        .map(|fit| fit.slope)
        .filter(|s| s.is_finite())
}

/// Slope of a series indexed by position, skipping missing entries.
pub fn index_slope(series: &[Option<f64>]) -> Option<f64> {
    let points: Vec<(f64, f64)> = series
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|y| (i as f64, y)))
        .collect();
    linear_slope(&points)
}

// ── Binning ───────────────────────────────────────────────────────────

/// Splits row indices into `n` ordered, nearly equal-sized groups after
/// sorting by `key` (ties keep original order). Empty groups are dropped, so
/// fewer than `n` groups come back when there are fewer rows than groups.
pub fn equal_frequency_groups(rows: &[usize], key: &[f64], n: usize) -> Vec<Vec<usize>> {
    if rows.is_empty() || n == 0 {
        return Vec::new();
    }
    let mut sorted: Vec<usize> = rows.to_vec();
    sorted.sort_by(|&a, &b| key[a].total_cmp(&key[b]));
    contiguous_chunks(&sorted, n)
}

/// Splits an ordered slice into `n` contiguous, nearly equal-sized chunks.
pub fn contiguous_chunks(ordered: &[usize], n: usize) -> Vec<Vec<usize>> {
    if ordered.is_empty() || n == 0 {
        return Vec::new();
    }
    let len = ordered.len();
    (0..n)
        .map(|g| {
            let start = g * len / n;
            let end = (g + 1) * len / n;
            ordered[start..end].to_vec()
        })
        .filter(|g| !g.is_empty())
        .collect()
}

/// Sorts by `|value|` descending, NaN last.
pub fn sort_by_magnitude_desc<T>(items: &mut [T], key: impl Fn(&T) -> f64) {
    items.sort_by(|a, b| {
        let (ka, kb) = (key(a).abs(), key(b).abs());
        match (ka.is_nan(), kb.is_nan()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            _ => kb.total_cmp(&ka),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_guards_zero_denominator() {
        assert_eq!(ratio(1.0, 0.0), None);
        assert_eq!(count_ratio(1, 4), Some(0.25));
    }

    #[test]
    fn pairwise_correlation_skips_missing() {
        let x = vec![Some(1.0), Some(2.0), None, Some(3.0), Some(4.0)];
        let y = vec![Some(-1.0), Some(-2.0), Some(100.0), Some(-3.0), Some(-4.0)];
        let r = pearson_pairwise(&x, &y).unwrap();
        assert!((r + 1.0).abs() < 1e-9, "r = {r}");
    }

    #[test]
    fn zscore_undefined_for_constant_population() {
        let feature = vec![Some(2.0); 5];
        assert!(zscore_deviation(&feature, &[true, false, false, false, false]).is_none());
    }

    #[test]
    fn zscore_empty_subset_is_none() {
        let feature = vec![Some(1.0), Some(2.0), Some(3.0)];
        assert!(zscore_deviation(&feature, &[false, false, false]).is_none());
    }

    #[test]
    fn slope_of_flat_and_rising_series() {
        assert_eq!(index_slope(&[Some(0.5), Some(0.5), Some(0.5)]), Some(0.0));
        let s = index_slope(&[Some(0.1), None, Some(0.3)]).unwrap();
        assert!((s - 0.1).abs() < 1e-12);
        assert_eq!(index_slope(&[Some(1.0)]), None);
    }

    #[test]
    fn slope_fits_noisy_series() {
        let s = index_slope(&[Some(1.0), Some(2.5), Some(2.5), Some(4.0)]).unwrap();
        assert!((s - 0.9).abs() < 1e-9, "slope = {s}");
    }

    #[test]
    fn pearson_needs_spread_in_both_inputs() {
        assert_eq!(pearson(&[1.0, 2.0, 3.0], &[5.0, 5.0, 5.0]), None);
        let r = pearson(&[1.0, 2.0, 3.0, 4.0], &[2.0, 4.0, 5.0, 9.0]).unwrap();
        assert!(r > 0.9 && r <= 1.0, "r = {r}");
    }

    #[test]
    fn equal_frequency_groups_cover_all_rows() {
        let key: Vec<f64> = (0..23).map(|i| ((i * 7) % 23) as f64).collect();
        let rows: Vec<usize> = (0..23).collect();
        let groups = equal_frequency_groups(&rows, &key, 5);
        assert_eq!(groups.len(), 5);
        assert_eq!(groups.iter().map(Vec::len).sum::<usize>(), 23);
        // ordered by key across groups
        let last_of_first = groups[0].iter().map(|&i| key[i]).fold(f64::MIN, f64::max);
        let first_of_second = groups[1].iter().map(|&i| key[i]).fold(f64::MAX, f64::min);
        assert!(last_of_first <= first_of_second);
    }

    #[test]
    fn fewer_rows_than_groups() {
        let groups = contiguous_chunks(&[4, 5], 4);
        assert_eq!(groups, vec![vec![4], vec![5]]);
    }

    #[test]
    fn magnitude_sort_puts_nan_last() {
        let mut v = vec![0.2, f64::NAN, -0.9, 0.5];
        sort_by_magnitude_desc(&mut v, |x| *x);
        assert_eq!(v[0], -0.9);
        assert!(v[3].is_nan());
    }
}
