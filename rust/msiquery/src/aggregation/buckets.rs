use nohash_hasher::IntMap;

use crate::errors::{
    DataProcessingError,
    MsiQueryError,
    Result,
};
use crate::models::Spectrum;

/// Largest supported number of decimals, keeps `mz * 10^d` well inside
/// the exact integer range of an `f64`.
pub const MAX_DECIMALS: u32 = 8;

/// Maps m/z values to integer bucket keys by rounding to a fixed number of
/// decimals (ties to even, like numpy's `round`).
///
/// Two m/z values land in the same bucket when they round to the same
/// value, the bucket m/z is that rounded value.
///
/// ```
/// use msiquery::aggregation::MzBucketer;
///
/// let bucketer = MzBucketer::new(4).unwrap();
/// let a = bucketer.key(100.00004).unwrap();
/// let b = bucketer.key(99.99996).unwrap();
/// assert_eq!(a, b);
/// assert_eq!(bucketer.mz_of(a), 100.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MzBucketer {
    scale: f64,
}

impl MzBucketer {
    pub fn new(decimals: u32) -> Result<Self> {
        if decimals > MAX_DECIMALS {
            return Err(MsiQueryError::invalid(
                "decimals",
                decimals,
                "at most 8 decimals are supported",
            ));
        }
        Ok(Self {
            scale: 10f64.powi(decimals as i32),
        })
    }

    /// `None` for m/z values that cannot be bucketed (NaN, infinities).
    pub fn key(&self, mz: f64) -> Option<i64> {
        let scaled = (mz * self.scale).round_ties_even();
        if scaled.is_finite() && scaled.abs() < (1u64 << 53) as f64 {
            Some(scaled as i64)
        } else {
            None
        }
    }

    pub fn mz_of(&self, key: i64) -> f64 {
        key as f64 / self.scale
    }
}

/// Bucket sums of part of the spectra, sorted by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialAggregate {
    pub keys: Vec<i64>,
    pub sums: Vec<f64>,
    /// Number of spectra that went into this partial.
    pub n_spectra: usize,
    /// Points dropped because their m/z could not be bucketed.
    pub skipped_points: usize,
}

impl PartialAggregate {
    /// Group-by-sum over `(spectrum, weight)` pairs.
    ///
    /// Contributions to a bucket are added in input order, so the result
    /// only depends on the order of `spectra`.
    pub fn accumulate<'a>(
        bucketer: &MzBucketer,
        spectra: impl IntoIterator<Item = (&'a Spectrum, f64)>,
    ) -> Self {
        let mut sums: IntMap<i64, f64> = IntMap::default();
        let mut n_spectra = 0;
        let mut skipped_points = 0;
        for (spectrum, weight) in spectra {
            n_spectra += 1;
            for (mz, intensity) in spectrum.iter() {
                match bucketer.key(mz) {
                    Some(key) => *sums.entry(key).or_insert(0.0) += intensity * weight,
                    None => skipped_points += 1,
                }
            }
        }

        let mut pairs: Vec<(i64, f64)> = sums.into_iter().collect();
        pairs.sort_unstable_by_key(|(k, _)| *k);
        let (keys, sums) = pairs.into_iter().unzip();
        Self {
            keys,
            sums,
            n_spectra,
            skipped_points,
        }
    }

    /// Sorted merge that adds the sums of equal keys.
    pub fn merge(self, other: &Self) -> Self {
        let (keys, sums) = merge_sorted(&self.keys, &self.sums, &other.keys, &other.sums);
        Self {
            keys,
            sums,
            n_spectra: self.n_spectra + other.n_spectra,
            skipped_points: self.skipped_points + other.skipped_points,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Converts the buckets back into a spectrum, dividing every sum by
    /// `divisor`.
    pub fn into_spectrum(self, bucketer: &MzBucketer, divisor: f64) -> Result<Spectrum> {
        let mz: Vec<f64> = self.keys.iter().map(|k| bucketer.mz_of(*k)).collect();
        let intensity: Vec<f64> = if divisor == 1.0 {
            self.sums
        } else {
            self.sums.iter().map(|x| x / divisor).collect()
        };
        Ok(Spectrum::try_new(mz, intensity)?)
    }
}

/// Linear merge of two key-sorted series, summing the values of keys
/// present in both.
pub fn merge_sorted<K: PartialOrd + Copy>(
    left_keys: &[K],
    left_values: &[f64],
    right_keys: &[K],
    right_values: &[f64],
) -> (Vec<K>, Vec<f64>) {
    let mut keys = Vec::with_capacity(left_keys.len() + right_keys.len());
    let mut values = Vec::with_capacity(left_keys.len() + right_keys.len());
    let (mut i, mut j) = (0, 0);
    while i < left_keys.len() && j < right_keys.len() {
        if left_keys[i] < right_keys[j] {
            keys.push(left_keys[i]);
            values.push(left_values[i]);
            i += 1;
        } else if right_keys[j] < left_keys[i] {
            keys.push(right_keys[j]);
            values.push(right_values[j]);
            j += 1;
        } else {
            keys.push(left_keys[i]);
            values.push(left_values[i] + right_values[j]);
            i += 1;
            j += 1;
        }
    }
    keys.extend_from_slice(&left_keys[i..]);
    values.extend_from_slice(&left_values[i..]);
    keys.extend_from_slice(&right_keys[j..]);
    values.extend_from_slice(&right_values[j..]);
    (keys, values)
}

/// Merges two spectra into one, adding intensities at identical m/z.
///
/// Both inputs must have non-decreasing m/z.
///
/// ```
/// use msiquery::Spectrum;
/// use msiquery::aggregation::merge_spectra;
///
/// let a = Spectrum::try_new(vec![100.0, 101.0], vec![5.0, 10.0]).unwrap();
/// let b = Spectrum::try_new(vec![100.5, 101.0], vec![1.0, 2.0]).unwrap();
/// let merged = merge_spectra(&a, &b).unwrap();
/// assert_eq!(merged.mz(), &[100.0, 100.5, 101.0]);
/// assert_eq!(merged.intensity(), &[5.0, 1.0, 12.0]);
/// ```
pub fn merge_spectra(left: &Spectrum, right: &Spectrum) -> Result<Spectrum> {
    for spec in [left, right] {
        if let Some(position) = spec.mz().windows(2).position(|w| w[1] < w[0]) {
            return Err(DataProcessingError::UnsortedMz {
                position: position + 1,
            }
            .into());
        }
    }
    let (mz, intensity) = merge_sorted(left.mz(), left.intensity(), right.mz(), right.intensity());
    Ok(Spectrum::try_new(mz, intensity)?)
}
