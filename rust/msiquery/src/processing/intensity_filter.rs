//! Dataset-wide percentile filters.
//!
//! The limit of both filters is a percentile over every intensity of the
//! dataset. Zeros are padding in profile data and are left out of the
//! sample, centroid spectra have no padding so every value counts.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{
    debug,
    instrument,
};

use crate::errors::{
    DataProcessingError,
    MsiQueryError,
    Result,
};
use crate::models::Spectrum;
use crate::utils::stats::percentile_in_place;

/// Fails unless `percentage` is a number in `[0, 100]`.
pub fn validate_percentile(percentage: f64) -> Result<()> {
    if !percentage.is_finite() || !(0.0..=100.0).contains(&percentage) {
        return Err(MsiQueryError::invalid(
            "percentile",
            percentage,
            "must be a number between 0 and 100",
        ));
    }
    Ok(())
}

/// Concatenated intensities the percentile is computed over.
///
/// Non-finite values are always dropped.
pub fn intensity_sample(spectra: &[Spectrum], keep_zeros: bool) -> Vec<f64> {
    let total: usize = spectra.iter().map(|s| s.len()).sum();
    let mut out = Vec::with_capacity(total);
    for spec in spectra {
        out.extend(
            spec.intensity()
                .iter()
                .copied()
                .filter(|x| x.is_finite() && (keep_zeros || *x != 0.0)),
        );
    }
    out
}

/// Percentile of the intensities across all spectra.
///
/// The sample is materialized once and the percentile found by selection,
/// O(total points) time and one `f64` per point of memory.
#[instrument(level = "debug", skip(spectra))]
pub fn dataset_percentile(spectra: &[Spectrum], percentage: f64, keep_zeros: bool) -> Result<f64> {
    validate_percentile(percentage)?;
    let mut sample = intensity_sample(spectra, keep_zeros);
    debug!("Percentile sample size: {}", sample.len());
    percentile_in_place(&mut sample, percentage).ok_or_else(|| {
        DataProcessingError::ExpectedNonEmptyData {
            context: Some("(no intensities to compute a percentile over)".into()),
        }
        .into()
    })
}

/// What a filter run did.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FilterOutcome {
    pub percentile: f64,
    pub limit: f64,
    /// Number of intensities that were changed.
    pub points_changed: usize,
}

/// Zeros every non-zero intensity strictly below `limit`.
pub fn apply_noise_floor(spectra: &mut [Spectrum], limit: f64) -> usize {
    spectra
        .par_iter_mut()
        .map(|spec| {
            let mut changed = 0;
            for x in spec.intensity_mut() {
                if *x != 0.0 && *x < limit {
                    *x = 0.0;
                    changed += 1;
                }
            }
            changed
        })
        .sum()
}

/// Clips every intensity above `limit` down to `limit`.
pub fn apply_hotspot_clip(spectra: &mut [Spectrum], limit: f64) -> usize {
    spectra
        .par_iter_mut()
        .map(|spec| {
            let mut changed = 0;
            for x in spec.intensity_mut() {
                if *x > limit {
                    *x = limit;
                    changed += 1;
                }
            }
            changed
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectra() -> Vec<Spectrum> {
        vec![
            Spectrum::try_new(vec![1.0, 2.0, 3.0], vec![0.0, 1.0, 2.0]).unwrap(),
            Spectrum::try_new(vec![1.0, 2.0, 3.0], vec![3.0, 0.0, 4.0]).unwrap(),
        ]
    }

    #[test]
    fn test_validate_percentile() {
        assert!(validate_percentile(0.0).is_ok());
        assert!(validate_percentile(100.0).is_ok());
        assert!(validate_percentile(-0.1).is_err());
        assert!(validate_percentile(100.1).is_err());
        assert!(validate_percentile(f64::NAN).is_err());
    }

    #[test]
    fn test_percentile_excludes_zeros() {
        let spectra = spectra();
        // sample [1, 2, 3, 4]
        assert_eq!(dataset_percentile(&spectra, 50.0, false).unwrap(), 2.5);
        // sample [0, 0, 1, 2, 3, 4]
        assert_eq!(dataset_percentile(&spectra, 50.0, true).unwrap(), 1.5);
    }

    #[test]
    fn test_percentile_empty_sample() {
        let spectra = vec![Spectrum::try_new(vec![1.0], vec![0.0]).unwrap()];
        assert!(matches!(
            dataset_percentile(&spectra, 50.0, false),
            Err(MsiQueryError::DataProcessing(
                DataProcessingError::ExpectedNonEmptyData { .. }
            ))
        ));
    }

    #[test]
    fn test_noise_floor_and_clip() {
        let mut spectra = spectra();
        assert_eq!(apply_noise_floor(&mut spectra, 2.5), 2);
        assert_eq!(spectra[0].intensity(), &[0.0, 0.0, 0.0]);
        assert_eq!(spectra[1].intensity(), &[3.0, 0.0, 4.0]);

        assert_eq!(apply_hotspot_clip(&mut spectra, 3.5), 1);
        assert_eq!(spectra[1].intensity(), &[3.0, 0.0, 3.5]);
    }
}
