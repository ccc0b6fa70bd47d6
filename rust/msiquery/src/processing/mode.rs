use serde::Serialize;

use crate::models::Spectrum;
use crate::utils::stats::median_in_place;

/// Acquisition mode guessed from a spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectrumMode {
    Centroid,
    Profile,
    Undetermined,
}

/// Guesses the mode from the intensities of one spectrum.
///
/// A centroid spectrum has no zero padding: either its minimum is above
/// zero, or it is mostly zeros (minimum and median both 0). A profile
/// spectrum has zero padding between peaks and a positive median.
///
/// This is a heuristic over a single spectrum. Negative or non-finite
/// intensities, and empty spectra, are `Undetermined`.
pub fn detect_mode(spectrum: &Spectrum) -> SpectrumMode {
    let intensity = spectrum.intensity();
    if intensity.is_empty() || intensity.iter().any(|x| !x.is_finite()) {
        return SpectrumMode::Undetermined;
    }
    let min = intensity.iter().copied().fold(f64::INFINITY, f64::min);
    let mut buffer = intensity.to_vec();
    let Some(median) = median_in_place(&mut buffer) else {
        return SpectrumMode::Undetermined;
    };

    if min > 0.0 || (min == 0.0 && median == 0.0) {
        SpectrumMode::Centroid
    } else if median > 0.0 {
        SpectrumMode::Profile
    } else {
        SpectrumMode::Undetermined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(intensity: &[f64]) -> Spectrum {
        let mz: Vec<f64> = (0..intensity.len()).map(|x| x as f64).collect();
        Spectrum::try_new(mz, intensity.to_vec()).unwrap()
    }

    #[test]
    fn test_detect_mode() {
        assert_eq!(detect_mode(&spec(&[1.0, 5.0, 2.0])), SpectrumMode::Centroid);
        assert_eq!(
            detect_mode(&spec(&[0.0, 0.0, 0.0, 5.0])),
            SpectrumMode::Centroid
        );
        assert_eq!(
            detect_mode(&spec(&[0.0, 3.0, 4.0, 5.0, 0.0])),
            SpectrumMode::Profile
        );
        assert_eq!(detect_mode(&spec(&[])), SpectrumMode::Undetermined);
        assert_eq!(
            detect_mode(&spec(&[-1.0, -2.0, 3.0])),
            SpectrumMode::Undetermined
        );
    }
}
