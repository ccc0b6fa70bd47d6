use rand::SeedableRng;
use rand::seq::index::sample;
use rand_chacha::ChaCha8Rng;
use tracing::{
    debug,
    instrument,
};

use super::config::{
    AggregationConfig,
    AggregationMode,
};
use super::engine::{
    AggregationPlan,
    run_sequential,
};
use crate::errors::{
    MsiQueryError,
    Result,
};
use crate::models::Spectrum;
use crate::utils::stats::median_in_place;

/// m/z precision of the quick-look mean spectrum.
pub const SAMPLED_MEAN_DECIMALS: u32 = 3;

/// Quick-look mean spectrum over `n` randomly chosen spectra.
///
/// Every sampled spectrum is scaled so its TIC equals the median TIC of the
/// whole dataset, then the scaled spectra are summed into m/z buckets of
/// 3 decimals. Spectra with a TIC of 0 contribute nothing. When `n` is at
/// least the number of spectra all of them are used.
///
/// The sample only depends on `seed`.
#[instrument(skip(spectra), fields(n_spectra = spectra.len()))]
pub fn sample_mean_spectrum(spectra: &[Spectrum], n: usize, seed: u64) -> Result<Spectrum> {
    if n == 0 || spectra.is_empty() {
        return Err(MsiQueryError::EmptySelection {
            context: "sampled mean spectrum needs at least one spectrum".into(),
        });
    }

    let tic: Vec<f64> = spectra.iter().map(|s| s.tic()).collect();
    let mut buffer = tic.clone();
    let median = median_in_place(&mut buffer).unwrap_or(0.0);

    let indices: Vec<usize> = if n < spectra.len() {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut picked = sample(&mut rng, spectra.len(), n).into_vec();
        picked.sort_unstable();
        picked
    } else {
        (0..spectra.len()).collect()
    };
    let weights: Vec<f64> = indices
        .iter()
        .map(|&i| {
            let factor = median / tic[i];
            if factor.is_finite() { factor } else { 0.0 }
        })
        .collect();
    debug!("Median TIC {} over {} sampled spectra", median, indices.len());

    let config = AggregationConfig {
        decimals: SAMPLED_MEAN_DECIMALS,
        mode: AggregationMode::Sum,
        ..Default::default()
    };
    let plan = AggregationPlan {
        spectra,
        indices: &indices,
        weights: Some(&weights),
    };
    Ok(run_sequential(&plan, &config)?.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectra() -> Vec<Spectrum> {
        vec![
            Spectrum::try_new(vec![100.0, 200.0], vec![1.0, 1.0]).unwrap(),
            Spectrum::try_new(vec![100.0001, 200.0], vec![2.0, 2.0]).unwrap(),
            Spectrum::try_new(vec![100.0, 300.0], vec![4.0, 4.0]).unwrap(),
            Spectrum::try_new(vec![150.0], vec![0.0]).unwrap(),
        ]
    }

    #[test]
    fn test_all_spectra_scaled_to_median_tic() {
        // TIC [2, 4, 8, 0], median 3
        let out = sample_mean_spectrum(&spectra(), 10, 0).unwrap();
        assert_eq!(out.mz(), &[100.0, 150.0, 200.0, 300.0]);
        assert_eq!(out.intensity(), &[1.5 + 1.5 + 1.5, 0.0, 1.5 + 1.5, 1.5]);
    }

    #[test]
    fn test_sample_is_seeded() {
        let spectra = spectra();
        let a = sample_mean_spectrum(&spectra, 2, 42).unwrap();
        let b = sample_mean_spectrum(&spectra, 2, 42).unwrap();
        assert_eq!(a, b);
        assert!(sample_mean_spectrum(&spectra, 0, 42).is_err());
    }
}
