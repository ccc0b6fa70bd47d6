use serde::{
    Deserialize,
    Serialize,
};
use thiserror::Error;

/// Finds the index range of elements in a sorted slice whose keys fall
/// within the closed range `[start, end]`.
///
/// The slice has to be sorted (non-decreasing) by `key_fn`. Two binary
/// searches are done, so this is O(log n).
///
/// # Examples
///
/// ```
/// use msiquery::utils::binary_search_range_by_key;
///
/// let mzs = [100.0, 100.5, 101.0, 101.5, 102.0];
/// let range = binary_search_range_by_key(&mzs, 100.5, 101.5, |x| *x);
/// assert_eq!(range, 1..4);
///
/// // Empty range when no matches
/// let range = binary_search_range_by_key(&mzs, 200.0, 201.0, |x| *x);
/// assert!(mzs[range].is_empty());
/// ```
pub fn binary_search_range_by_key<T, K, F>(
    slice: &[T],
    start: K,
    end: K,
    key_fn: F,
) -> std::ops::Range<usize>
where
    F: Fn(&T) -> K,
    K: PartialOrd,
{
    let start_idx = slice.partition_point(|x| key_fn(x) < start);
    let end_idx = start_idx + slice[start_idx..].partition_point(|x| key_fn(x) <= end);

    start_idx..end_idx
}

/// TupleRange represents a closed-closed range `[a, b]`.
///
/// The first element is always less than or equal to the second, so a
/// range that would select nothing is rejected when it is built instead
/// of being propagated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "(T, T)", into = "(T, T)")]
pub struct TupleRange<T: Copy + PartialOrd + std::fmt::Debug>(T, T);

#[derive(Error, Debug)]
pub enum TupleRangeError<T: Copy + PartialOrd + std::fmt::Debug> {
    #[error(
        "Expected the first element to be less than or equal to the second, got ({0:?}, {1:?})"
    )]
    ExpectedOrderedRange(T, T),
}

impl<T: Copy + PartialOrd + std::fmt::Debug> TupleRange<T> {
    pub fn try_new(left: T, right: T) -> Result<Self, TupleRangeError<T>> {
        // NaN bounds fail the comparison as well
        if left <= right {
            Ok(Self(left, right))
        } else {
            Err(TupleRangeError::ExpectedOrderedRange(left, right))
        }
    }

    pub fn as_tuple(&self) -> (T, T) {
        (self.0, self.1)
    }

    pub fn contains(&self, x: T) -> bool {
        self.0 <= x && x <= self.1
    }

    pub fn start(&self) -> T {
        self.0
    }

    pub fn end(&self) -> T {
        self.1
    }
}

impl<T: Copy + PartialOrd + std::fmt::Debug> TryFrom<(T, T)> for TupleRange<T> {
    type Error = TupleRangeError<T>;

    fn try_from(value: (T, T)) -> Result<Self, Self::Error> {
        Self::try_new(value.0, value.1)
    }
}

impl<T: Copy + PartialOrd + std::fmt::Debug> From<TupleRange<T>> for (T, T) {
    fn from(value: TupleRange<T>) -> Self {
        value.as_tuple()
    }
}

/// Closed m/z window, in daltons.
pub type MzRange = TupleRange<f64>;

/// Builds the window `[mz - |tol|, mz + |tol|]`.
///
/// Returns `None` for non-finite inputs.
pub fn abs_tol_range(mz: f64, tolerance: f64) -> Option<MzRange> {
    let tol = tolerance.abs();
    if !mz.is_finite() || !tol.is_finite() {
        return None;
    }
    TupleRange::try_new(mz - tol, mz + tol).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_range_rejects_unordered() {
        assert!(TupleRange::try_new(2.0, 1.0).is_err());
        assert!(TupleRange::try_new(f64::NAN, 1.0).is_err());
        let range = TupleRange::try_new(1.0, 1.0).unwrap();
        assert!(range.contains(1.0));
    }

    #[test]
    fn test_tuple_range_serde_as_pair() {
        let range: MzRange = serde_json::from_str("[100.0, 200.0]").unwrap();
        assert_eq!(range.as_tuple(), (100.0, 200.0));
        assert!(serde_json::from_str::<MzRange>("[200.0, 100.0]").is_err());
    }

    #[test]
    fn test_binary_search_duplicates_and_edges() {
        let mzs = [1.0, 2.0, 2.0, 2.0, 3.0];
        assert_eq!(binary_search_range_by_key(&mzs, 2.0, 2.0, |x| *x), 1..4);
        assert_eq!(binary_search_range_by_key(&mzs, 0.0, 0.5, |x| *x), 0..0);
        assert_eq!(binary_search_range_by_key(&mzs, 3.5, 4.0, |x| *x), 5..5);
        assert_eq!(binary_search_range_by_key(&mzs, 0.0, 10.0, |x| *x), 0..5);
    }

    #[test]
    fn test_abs_tol_range() {
        let range = abs_tol_range(100.0, -0.5).unwrap();
        assert_eq!(range.as_tuple(), (99.5, 100.5));
        assert!(abs_tol_range(f64::NAN, 0.1).is_none());
    }
}
