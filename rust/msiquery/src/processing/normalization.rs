use std::fmt::Display;
use std::str::FromStr;
use std::time::{
    Duration,
    Instant,
};

use rayon::prelude::*;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::{
    info,
    instrument,
    warn,
};

use crate::errors::{
    MsiQueryError,
    Result,
};
use crate::models::Spectrum;
use crate::utils::abs_tol_range;
use crate::utils::stats::median_in_place;

pub const DEFAULT_REFERENCE_MZ: f64 = 121.0444;
pub const DEFAULT_REFERENCE_TOLERANCE: f64 = 0.003;

/// Per-spectrum intensity scaling.
///
/// All the statistics (mean, rms, median) only look at the non-zero
/// intensities, zeros are padding between peaks. Zeros stay zero after
/// scaling.
///
/// In a config file the plain methods are strings (`"tic"`) and the
/// reference-peak method is an object:
/// `{"peak": {"reference_mz": 121.0444, "tolerance": 0.003}}`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMethod {
    /// No scaling, the spectra as loaded.
    #[default]
    Original,
    /// Divide by the mean of the non-zero intensities.
    Tic,
    /// Divide by the root mean square of the non-zero intensities.
    Rms,
    /// Divide by the median of the non-zero intensities.
    Median,
    /// Scale so the highest point within `reference_mz ± tolerance` is 100.
    /// Spectra without signal in that window are zeroed.
    Peak {
        #[serde(default = "default_reference_mz")]
        reference_mz: f64,
        #[serde(default = "default_reference_tolerance")]
        tolerance: f64,
    },
}

fn default_reference_mz() -> f64 {
    DEFAULT_REFERENCE_MZ
}

fn default_reference_tolerance() -> f64 {
    DEFAULT_REFERENCE_TOLERANCE
}

impl NormalizationMethod {
    pub fn peak(reference_mz: f64, tolerance: f64) -> Self {
        Self::Peak {
            reference_mz,
            tolerance,
        }
    }

    /// Human readable name, the tolerance of `Peak` is left out.
    ///
    /// ```
    /// use msiquery::NormalizationMethod;
    ///
    /// assert_eq!(NormalizationMethod::Tic.label(), "tic");
    /// assert_eq!(NormalizationMethod::peak(121.0444, 0.003).label(), "peak 121.0444");
    /// ```
    pub fn label(&self) -> String {
        match self {
            Self::Original => "original".to_string(),
            Self::Tic => "tic".to_string(),
            Self::Rms => "rms".to_string(),
            Self::Median => "median".to_string(),
            Self::Peak { reference_mz, .. } => format!("peak {}", reference_mz),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Self::Peak {
            reference_mz,
            tolerance,
        } = self
        {
            if !reference_mz.is_finite() || *reference_mz <= 0.0 {
                return Err(MsiQueryError::invalid(
                    "reference_mz",
                    reference_mz,
                    "must be a positive number",
                ));
            }
            if !tolerance.is_finite() {
                return Err(MsiQueryError::invalid(
                    "tolerance",
                    tolerance,
                    "must be a finite number",
                ));
            }
        }
        Ok(())
    }

    fn scaling(&self, spectrum: &Spectrum, buffer: &mut Vec<f64>) -> Scaling {
        match self {
            Self::Original => Scaling::Multiply(1.0),
            Self::Tic => {
                let (sum, count) = spectrum
                    .nonzero_intensities()
                    .fold((0.0, 0usize), |(s, c), x| (s + x, c + 1));
                Scaling::divide(mean(sum, count))
            }
            Self::Rms => {
                let (sum, count) = spectrum
                    .nonzero_intensities()
                    .fold((0.0, 0usize), |(s, c), x| (s + x * x, c + 1));
                Scaling::divide(mean(sum, count).sqrt())
            }
            Self::Median => {
                buffer.clear();
                buffer.extend(spectrum.nonzero_intensities());
                Scaling::divide(median_in_place(buffer).unwrap_or(0.0))
            }
            Self::Peak {
                reference_mz,
                tolerance,
            } => {
                let peak_max = abs_tol_range(*reference_mz, *tolerance)
                    .map(|range| {
                        let idx = spectrum.indices_in_range(&range);
                        spectrum.intensity()[idx]
                            .iter()
                            .copied()
                            .fold(0.0, f64::max)
                    })
                    .unwrap_or(0.0);
                if peak_max > 0.0 {
                    Scaling::Multiply(100.0 / peak_max)
                } else {
                    Scaling::Multiply(0.0)
                }
            }
        }
    }
}

fn mean(sum: f64, count: usize) -> f64 {
    if count == 0 { 0.0 } else { sum / count as f64 }
}

impl FromStr for NormalizationMethod {
    type Err = MsiQueryError;

    /// Accepts `original`, `tic`, `rms`, `median`, `peak` and `peak <mz>`,
    /// in any case.
    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_lowercase();
        let mut parts = lowered.split_whitespace();
        let out = match (parts.next(), parts.next(), parts.next()) {
            (Some("original"), None, None) => Self::Original,
            (Some("tic"), None, None) => Self::Tic,
            (Some("rms"), None, None) => Self::Rms,
            (Some("median"), None, None) => Self::Median,
            (Some("peak"), None, None) => {
                Self::peak(DEFAULT_REFERENCE_MZ, DEFAULT_REFERENCE_TOLERANCE)
            }
            (Some("peak"), Some(mz), None) => {
                let reference_mz = mz.parse::<f64>().map_err(|_| {
                    MsiQueryError::invalid("reference_mz", mz, "must be a number")
                })?;
                Self::peak(reference_mz, DEFAULT_REFERENCE_TOLERANCE)
            }
            _ => {
                return Err(MsiQueryError::invalid(
                    "normalization",
                    s,
                    "expected one of original, tic, rms, median, peak",
                ));
            }
        };
        out.validate()?;
        Ok(out)
    }
}

/// Either a divisor or a factor, dividing keeps the results identical to
/// `x / statistic`.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Scaling {
    Divide(f64),
    Multiply(f64),
}

impl Scaling {
    // A degenerate statistic zeroes the spectrum
    fn divide(divisor: f64) -> Self {
        if divisor == 0.0 || !divisor.is_finite() {
            Scaling::Multiply(0.0)
        } else {
            Scaling::Divide(divisor)
        }
    }

    fn is_zeroing(&self) -> bool {
        matches!(self, Scaling::Multiply(f) if *f == 0.0)
    }

    fn apply(&self, x: f64) -> f64 {
        match self {
            Scaling::Divide(d) => x / d,
            Scaling::Multiply(f) => x * f,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NormalizationSummary {
    pub label: String,
    pub spectra_processed: usize,
    /// Spectra scaled by zero (no signal, or no reference peak).
    pub zeroed: usize,
    /// Indices of malformed spectra, left untouched.
    pub flagged: Vec<usize>,
    pub elapsed: Duration,
}

impl Display for NormalizationSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Normalization: {}", self.label)?;
        writeln!(f, "Spectra processed: {}", self.spectra_processed)?;
        writeln!(f, "Spectra zeroed: {}", self.zeroed)?;
        writeln!(f, "Spectra flagged: {}", self.flagged.len())?;
        writeln!(f, "Elapsed: {:#.2?}", self.elapsed)?;
        Ok(())
    }
}

/// Scales every spectrum with `method`, producing new spectra that share
/// the m/z arrays of `spectra`.
#[instrument(skip_all, fields(method = %method.label()))]
pub fn normalize_spectra(
    spectra: &[Spectrum],
    method: &NormalizationMethod,
) -> (Vec<Spectrum>, NormalizationSummary) {
    let st = Instant::now();
    let results: Vec<(Spectrum, SpectrumOutcome)> = spectra
        .par_iter()
        .with_min_len(64)
        .map_init(Vec::new, |buffer, spectrum| {
            if spectrum.validate().is_err() {
                return (spectrum.clone(), SpectrumOutcome::Flagged);
            }
            let scaling = method.scaling(spectrum, buffer);
            let intensity = spectrum
                .intensity()
                .iter()
                .map(|x| scaling.apply(*x))
                .collect();
            // Same length as the source, cannot fail
            let out = spectrum
                .with_intensity(intensity)
                .unwrap_or_else(|_| spectrum.clone());
            let outcome = if scaling.is_zeroing() && spectrum.count_nonzero() > 0 {
                SpectrumOutcome::Zeroed
            } else {
                SpectrumOutcome::Scaled
            };
            (out, outcome)
        })
        .collect();

    let mut summary = NormalizationSummary {
        label: method.label(),
        spectra_processed: results.len(),
        ..Default::default()
    };
    let mut out = Vec::with_capacity(results.len());
    for (i, (spectrum, outcome)) in results.into_iter().enumerate() {
        match outcome {
            SpectrumOutcome::Flagged => summary.flagged.push(i),
            SpectrumOutcome::Zeroed => summary.zeroed += 1,
            SpectrumOutcome::Scaled => {}
        }
        out.push(spectrum);
    }
    summary.elapsed = st.elapsed();

    if !summary.flagged.is_empty() {
        warn!(
            "{} malformed spectra left unnormalized, first at index {}",
            summary.flagged.len(),
            summary.flagged[0]
        );
    }
    info!(
        "Normalized {} spectra ({}) in {:#.2?}",
        summary.spectra_processed, summary.label, summary.elapsed
    );
    (out, summary)
}

#[derive(Debug, Clone, Copy)]
enum SpectrumOutcome {
    Scaled,
    Zeroed,
    Flagged,
}
