use std::fmt::Display;
use std::time::{
    Duration,
    Instant,
};

use rayon::prelude::*;
use tracing::{
    info,
    instrument,
    warn,
};

use crate::errors::DataProcessingError;
use crate::models::Spectrum;

/// Buffer that gets re-used on each thread to store the intermediates
/// of the centroiding for a single spectrum.
///
/// Every peak is a run of non-zero intensities. The run is bounded by the
/// last zero before it and the first zero after it (or by the array edges
/// when the run touches them). For each run:
///
/// - intensity: the trapezoid integral of intensity over m/z between the
///   two bounds, `Q[end] - Q[start]`.
/// - m/z: the intensity weighted mean m/z of the points between the bounds.
///
/// Both come out of prefix sums over the whole spectrum, so a spectrum
/// costs O(n) no matter how many peaks it has.
#[derive(Debug, Default)]
pub struct ProfileCentroider {
    csum_mz_int: Vec<f64>,
    csum_int: Vec<f64>,
    quadrature: Vec<f64>,
    runs: Vec<(usize, usize)>,
}

impl ProfileCentroider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            csum_mz_int: Vec::with_capacity(capacity + 1),
            csum_int: Vec::with_capacity(capacity + 1),
            quadrature: Vec::with_capacity(capacity),
            runs: Vec::new(),
        }
    }

    /// Converts one profile spectrum into a centroid spectrum.
    ///
    /// ```
    /// use msiquery::Spectrum;
    /// use msiquery::processing::ProfileCentroider;
    ///
    /// let profile = Spectrum::try_new(
    ///     vec![1.0, 2.0, 3.0, 4.0, 5.0],
    ///     vec![0.0, 2.0, 2.0, 0.0, 0.0],
    /// )
    /// .unwrap();
    /// let centroid = ProfileCentroider::new().centroid(&profile).unwrap();
    /// assert_eq!(centroid.mz(), &[2.5]);
    /// assert_eq!(centroid.intensity(), &[4.0]);
    /// ```
    pub fn centroid(&mut self, spectrum: &Spectrum) -> Result<Spectrum, DataProcessingError> {
        spectrum.validate()?;
        let mz = spectrum.mz();
        let intensity = spectrum.intensity();

        self.find_runs(intensity);
        if self.runs.is_empty() {
            return Ok(Spectrum::empty());
        }
        self.fill_prefix_sums(mz, intensity);

        let mut new_mz = Vec::with_capacity(self.runs.len());
        let mut new_intensity = Vec::with_capacity(self.runs.len());
        for &(start, end) in self.runs.iter() {
            // Inclusive sums over [start, end], bounding zeros add nothing
            let sum_mz_int = self.csum_mz_int[end + 1] - self.csum_mz_int[start];
            let sum_int = self.csum_int[end + 1] - self.csum_int[start];
            let centroid_mz = if sum_int != 0.0 {
                sum_mz_int / sum_int
            } else {
                (mz[start] + mz[end]) / 2.0
            };
            new_mz.push(centroid_mz);
            new_intensity.push(self.quadrature[end] - self.quadrature[start]);
        }

        Spectrum::try_new(new_mz, new_intensity)
    }

    /// Number of non-zero runs, i.e. the length of the centroided spectrum.
    pub fn count_peaks(&mut self, intensity: &[f64]) -> usize {
        self.find_runs(intensity);
        self.runs.len()
    }

    fn find_runs(&mut self, intensity: &[f64]) {
        self.runs.clear();
        let n = intensity.len();
        let mut i = 0;
        while i < n {
            if intensity[i] == 0.0 {
                i += 1;
                continue;
            }
            let first = i;
            while i < n && intensity[i] != 0.0 {
                i += 1;
            }
            let last = i - 1;
            let start = first.saturating_sub(1);
            let end = if last + 1 < n { last + 1 } else { last };
            self.runs.push((start, end));
        }
    }

    fn fill_prefix_sums(&mut self, mz: &[f64], intensity: &[f64]) {
        self.csum_mz_int.clear();
        self.csum_int.clear();
        self.csum_mz_int.push(0.0);
        self.csum_int.push(0.0);
        let mut acc_mz_int = 0.0;
        let mut acc_int = 0.0;
        for (m, i) in mz.iter().zip(intensity.iter()) {
            acc_mz_int += m * i;
            acc_int += i;
            self.csum_mz_int.push(acc_mz_int);
            self.csum_int.push(acc_int);
        }
        cumulative_trapezoid_into(intensity, mz, &mut self.quadrature);
    }
}

/// Running trapezoid integral of `y` over `x`, starting at 0.
///
/// The output has the same length as the inputs.
pub fn cumulative_trapezoid_into(y: &[f64], x: &[f64], out: &mut Vec<f64>) {
    out.clear();
    if y.is_empty() {
        return;
    }
    out.push(0.0);
    let mut acc = 0.0;
    for k in 1..y.len().min(x.len()) {
        acc += (x[k] - x[k - 1]) * (y[k] + y[k - 1]) / 2.0;
        out.push(acc);
    }
}

/// Summary of centroiding over many spectra.
#[derive(Debug, Clone, Default)]
pub struct CentroidingSummary {
    pub spectra_processed: usize,
    pub input_points: usize,
    pub output_peaks: usize,
    /// Malformed spectra, replaced with empty spectra.
    pub flagged: Vec<usize>,
    pub elapsed: Duration,
}

impl CentroidingSummary {
    fn fold_spectrum(mut self, index: usize, input_len: usize, output: Option<&Spectrum>) -> Self {
        self.spectra_processed += 1;
        self.input_points += input_len;
        match output {
            Some(spec) => self.output_peaks += spec.len(),
            None => self.flagged.push(index),
        }
        self
    }
}

impl Display for CentroidingSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Spectra centroided: {}", self.spectra_processed)?;
        writeln!(f, "Elapsed: {:#.2?}", self.elapsed)?;
        writeln!(f, "Input points: {}", self.input_points)?;
        writeln!(f, "Output peaks: {}", self.output_peaks)?;
        if self.output_peaks > 0 {
            writeln!(
                f,
                "Average reduction: {:.2}x",
                self.input_points as f64 / self.output_peaks as f64
            )?;
        }
        writeln!(f, "Spectra flagged: {}", self.flagged.len())?;
        Ok(())
    }
}

/// Centroids every spectrum in parallel, keeping the input order.
#[instrument(skip_all, fields(n_spectra = spectra.len()))]
pub fn centroid_spectra(spectra: &[Spectrum]) -> (Vec<Spectrum>, CentroidingSummary) {
    let st = Instant::now();
    let results: Vec<Result<Spectrum, DataProcessingError>> = spectra
        .par_iter()
        .with_min_len(64)
        .map_init(ProfileCentroider::new, |centroider, spectrum| {
            centroider.centroid(spectrum)
        })
        .collect();

    let mut summary = CentroidingSummary::default();
    let mut out = Vec::with_capacity(results.len());
    for (i, (result, input)) in results.into_iter().zip(spectra.iter()).enumerate() {
        match result {
            Ok(spec) => {
                summary = summary.fold_spectrum(i, input.len(), Some(&spec));
                out.push(spec);
            }
            Err(e) => {
                if summary.flagged.is_empty() {
                    warn!("Spectrum {} could not be centroided: {}", i, e);
                }
                summary = summary.fold_spectrum(i, input.len(), None);
                out.push(Spectrum::empty());
            }
        }
    }
    summary.elapsed = st.elapsed();

    if !summary.flagged.is_empty() {
        warn!(
            "{} malformed spectra replaced with empty centroid spectra",
            summary.flagged.len()
        );
    }
    info!(
        "Calculated centroid data for {} spectra in {:#.2?}",
        summary.spectra_processed, summary.elapsed
    );
    (out, summary)
}
