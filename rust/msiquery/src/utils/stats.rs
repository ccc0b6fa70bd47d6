//! Order statistics over intensity samples.
//!
//! Both functions reorder the slice they are given: they use an O(n)
//! selection (`select_nth_unstable_by`) instead of a full sort, which
//! matters when the sample is the concatenation of every intensity
//! in a dataset.

/// Percentile with linear interpolation between the two closest ranks
/// (the same convention as numpy's default `percentile`).
///
/// `percentage` is expected in `[0, 100]`. Returns `None` on an empty slice.
///
/// ```
/// use msiquery::utils::stats::percentile_in_place;
///
/// let mut values = vec![4.0, 1.0, 3.0, 2.0];
/// assert_eq!(percentile_in_place(&mut values, 50.0), Some(2.5));
/// assert_eq!(percentile_in_place(&mut values, 100.0), Some(4.0));
/// ```
pub fn percentile_in_place(values: &mut [f64], percentage: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let last = values.len() - 1;
    let rank = (percentage / 100.0).clamp(0.0, 1.0) * last as f64;
    let lo_idx = (rank.floor() as usize).min(last);
    let frac = rank - lo_idx as f64;

    let (_, lo, right) = values.select_nth_unstable_by(lo_idx, f64::total_cmp);
    let lo = *lo;
    if frac == 0.0 || right.is_empty() {
        return Some(lo);
    }
    let hi = right.iter().copied().min_by(f64::total_cmp)?;
    Some(lerp(lo, hi, frac))
}

/// Median, averaging the two middle values for even lengths.
pub fn median_in_place(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let len = values.len();
    let mid = len / 2;
    let (left, upper, _) = values.select_nth_unstable_by(mid, f64::total_cmp);
    let upper = *upper;
    if len % 2 == 1 {
        return Some(upper);
    }
    let lower = left.iter().copied().max_by(f64::total_cmp)?;
    Some((lower + upper) / 2.0)
}

// Stays exact at both ends of the interval
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    let diff = b - a;
    if t >= 0.5 {
        b - diff * (1.0 - t)
    } else {
        a + diff * t
    }
}
