use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use indicatif::ProgressBar;
use tracing::{
    info,
    instrument,
    warn,
};

use super::base::IonImage;
use super::coordinate::Coordinate;
use super::metadata::Metadata;
use super::pipeline::{
    ProcessingState,
    ProcessingStep,
};
use super::spectrum::Spectrum;
use crate::aggregation::engine::{
    AggregationPlan,
    run_batched,
};
use crate::aggregation::{
    AggregationConfig,
    AggregationJob,
    AggregationMode,
    AggregationOutput,
    CancellationToken,
    Selection,
    sample_mean_spectrum,
};
use crate::errors::{
    DataProcessingError,
    MsiQueryError,
    Result,
};
use crate::processing::intensity_filter::{
    apply_hotspot_clip,
    apply_noise_floor,
};
use crate::processing::{
    CentroidingSummary,
    FilterOutcome,
    IonImageQuery,
    NormalizationMethod,
    NormalizationSummary,
    SpectrumMode,
    centroid_spectra,
    dataset_percentile,
    detect_mode,
    extract_ion_image,
    normalize_spectra,
    validate_percentile,
};
use crate::traits::SpectrumSource;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MeanSpectrumKey {
    pipeline: String,
    decimals: u32,
    mode: AggregationMode,
}

impl MeanSpectrumKey {
    fn new(pipeline: String, config: &AggregationConfig) -> Self {
        Self {
            pipeline,
            decimals: config.decimals,
            mode: config.mode,
        }
    }
}

/// A mass spectrometry imaging acquisition: one spectrum per pixel.
///
/// The dataset keeps three views of the spectra:
///
/// - the spectra as loaded, restored by [`Dataset::reset_processing`];
/// - the base spectra, the loaded ones plus any filter applied while no
///   overlay was active. Normalization always starts from these;
/// - an optional overlay, the output of the last normalization and the
///   steps after it. When present it is what every read sees.
///
/// The spectra are held behind [`Arc`]s and modified copy-on-write, a
/// snapshot handed to a background job never changes under it.
#[derive(Debug, Clone)]
pub struct Dataset {
    loaded: Arc<Vec<Spectrum>>,
    base: Arc<Vec<Spectrum>>,
    overlay: Option<Arc<Vec<Spectrum>>>,
    coordinates: Vec<Coordinate>,
    coordinate_index: HashMap<Coordinate, usize>,
    metadata: Metadata,
    state: ProcessingState,
    mean_spectra: HashMap<MeanSpectrumKey, Spectrum>,
}

impl Dataset {
    /// Builds a dataset from spectra and their coordinates.
    ///
    /// ```
    /// use msiquery::{Coordinate, Dataset, Metadata, Spectrum};
    ///
    /// let spectra = vec![
    ///     Spectrum::try_new(vec![100.0, 101.0], vec![5.0, 10.0]).unwrap(),
    ///     Spectrum::try_new(vec![100.0, 101.0], vec![3.0, 7.0]).unwrap(),
    /// ];
    /// let coords = vec![Coordinate::planar(1, 1), Coordinate::planar(2, 1)];
    /// let dataset = Dataset::new(spectra, coords, Metadata::new()).unwrap();
    ///
    /// assert_eq!(dataset.get_index(1, 2), 1);
    /// assert_eq!(dataset.get_index(5, 5), -1);
    /// // Out of range indices are clamped
    /// assert_eq!(dataset.get_spectrum(-3), dataset.get_spectrum(0));
    /// ```
    pub fn new(
        spectra: Vec<Spectrum>,
        coordinates: Vec<Coordinate>,
        metadata: Metadata,
    ) -> Result<Self> {
        if spectra.len() != coordinates.len() {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: spectra.len(),
                other: coordinates.len(),
                context: "(spectra and coordinates of a dataset)".into(),
            }
            .into());
        }
        if spectra.is_empty() {
            return Err(DataProcessingError::ExpectedNonEmptyData {
                context: Some("(a dataset needs at least one spectrum)".into()),
            }
            .into());
        }

        let mut coordinate_index = HashMap::with_capacity(coordinates.len());
        let mut duplicates = 0;
        for (i, coord) in coordinates.iter().enumerate() {
            match coordinate_index.entry(*coord) {
                Entry::Vacant(e) => {
                    e.insert(i);
                }
                Entry::Occupied(_) => duplicates += 1,
            }
        }
        if duplicates > 0 {
            warn!(
                "{} spectra share a coordinate with an earlier spectrum, lookups return the first one",
                duplicates
            );
        }

        match metadata.pixel_extents() {
            Ok(extents) => info!(
                "Loaded {} spectra, {}x{} pixels",
                spectra.len(),
                extents.width,
                extents.height
            ),
            Err(e) => {
                info!("Loaded {} spectra", spectra.len());
                warn!("Ion images will not be available: {}", e);
            }
        }

        let loaded = Arc::new(spectra);
        Ok(Self {
            base: Arc::clone(&loaded),
            loaded,
            overlay: None,
            coordinates,
            coordinate_index,
            metadata,
            state: ProcessingState::default(),
            mean_spectra: HashMap::new(),
        })
    }

    /// Reads every spectrum of `source`.
    #[instrument(skip_all)]
    pub fn from_source<S: SpectrumSource + ?Sized>(source: &S) -> Result<Self> {
        let n = source.num_spectra();
        let mut spectra = Vec::with_capacity(n);
        let mut coordinates = Vec::with_capacity(n);
        for i in 0..n {
            let (mz, intensity) = source.read_spectrum(i)?;
            let spectrum = Spectrum::try_new(mz, intensity)
                .map_err(|e| e.append_to_context(&format!(" at spectrum {}", i)))?;
            spectra.push(spectrum);
            coordinates.push(source.coordinate(i)?);
        }
        Self::new(spectra, coordinates, source.metadata())
    }

    pub fn num_spectra(&self) -> usize {
        self.loaded.len()
    }

    fn check_i(&self, i: i64) -> usize {
        i.clamp(0, self.num_spectra() as i64 - 1) as usize
    }

    fn current(&self) -> &Arc<Vec<Spectrum>> {
        self.overlay.as_ref().unwrap_or(&self.base)
    }

    /// Spectrum `i` of the current processing state. `i` is clamped into
    /// `[0, N - 1]`.
    pub fn get_spectrum(&self, i: i64) -> &Spectrum {
        &self.current()[self.check_i(i)]
    }

    pub fn get_all_spectra(&self) -> &[Spectrum] {
        self.current()
    }

    /// The spectra as loaded, before any processing.
    pub fn loaded_spectra(&self) -> &[Spectrum] {
        &self.loaded
    }

    /// Shared handle to the current spectra, unaffected by later processing.
    pub fn snapshot(&self) -> Arc<Vec<Spectrum>> {
        Arc::clone(self.current())
    }

    /// Index of the spectrum at pixel `(x, y, 1)`, or `-1`.
    pub fn get_index(&self, y: i32, x: i32) -> i64 {
        self.find_index(&Coordinate::planar(x, y))
            .map_or(-1, |i| i as i64)
    }

    pub fn find_index(&self, coordinate: &Coordinate) -> Option<usize> {
        self.coordinate_index.get(coordinate).copied()
    }

    /// Coordinate of spectrum `i`, with the same clamping as
    /// [`Dataset::get_spectrum`].
    pub fn get_coordinates(&self, i: i64) -> Coordinate {
        self.coordinates[self.check_i(i)]
    }

    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_json(&self) -> Result<String> {
        self.metadata.to_json_pretty()
    }

    pub fn state(&self) -> &ProcessingState {
        &self.state
    }

    pub fn is_normalized(&self) -> bool {
        self.state.is_normalized()
    }

    pub fn is_centroided(&self) -> bool {
        self.state.is_centroided()
    }

    pub fn normalization_label(&self) -> String {
        self.state.normalization_label()
    }

    pub fn generation(&self) -> u64 {
        self.state.generation()
    }

    /// Per-spectrum summed intensity of the current spectra.
    pub fn tic(&self) -> Vec<f64> {
        self.current().iter().map(|s| s.tic()).collect()
    }

    /// Replaces the overlay with the base spectra scaled by `method`.
    ///
    /// `Original` drops the overlay instead. Any centroiding is discarded
    /// either way.
    pub fn normalize(&mut self, method: &NormalizationMethod) -> Result<NormalizationSummary> {
        method.validate()?;
        if let NormalizationMethod::Original = method {
            self.overlay = None;
            self.state.replace_overlay(Vec::new());
            info!("Normalization cleared, using the loaded spectra");
            return Ok(NormalizationSummary {
                label: method.label(),
                ..Default::default()
            });
        }

        let (spectra, summary) = normalize_spectra(&self.base, method);
        self.overlay = Some(Arc::new(spectra));
        self.state
            .replace_overlay(vec![ProcessingStep::Normalize { method: *method }]);
        Ok(summary)
    }

    /// Centroids the current spectra (normalized ones if normalized).
    pub fn centroid_data(&mut self) -> CentroidingSummary {
        let (spectra, summary) = centroid_spectra(self.current());
        self.overlay = Some(Arc::new(spectra));
        self.state.push_overlay(ProcessingStep::Centroid);
        summary
    }

    /// Dataset-wide intensity percentile of the current spectra.
    ///
    /// Zeros are left out unless the data is centroided.
    pub fn percentile(&self, percentage: f64) -> Result<f64> {
        dataset_percentile(self.current(), percentage, self.is_centroided())
    }

    fn current_mut(&mut self) -> &mut Vec<Spectrum> {
        match self.overlay.as_mut() {
            Some(overlay) => Arc::make_mut(overlay),
            None => Arc::make_mut(&mut self.base),
        }
    }

    fn push_filter_step(&mut self, step: ProcessingStep) {
        if self.overlay.is_some() {
            self.state.push_overlay(step);
        } else {
            self.state.push_base(step);
        }
    }

    /// Zeros the non-zero intensities below the `percentage` percentile.
    #[instrument(skip(self))]
    pub fn noise_reduction(&mut self, percentage: f64) -> Result<FilterOutcome> {
        validate_percentile(percentage)?;
        let limit = self.percentile(percentage)?;
        info!("Noise reduction: limit = {}", limit);
        let points_changed = apply_noise_floor(self.current_mut(), limit);
        self.push_filter_step(ProcessingStep::NoiseReduction {
            percentile: percentage,
            limit,
        });
        Ok(FilterOutcome {
            percentile: percentage,
            limit,
            points_changed,
        })
    }

    /// Clips intensities above the `percentage` percentile down to it.
    #[instrument(skip(self))]
    pub fn remove_hotspots(&mut self, percentage: f64) -> Result<FilterOutcome> {
        validate_percentile(percentage)?;
        let limit = self.percentile(percentage)?;
        info!("Hotspot removal: limit = {}", limit);
        let points_changed = apply_hotspot_clip(self.current_mut(), limit);
        self.push_filter_step(ProcessingStep::HotspotRemoval {
            percentile: percentage,
            limit,
        });
        Ok(FilterOutcome {
            percentile: percentage,
            limit,
            points_changed,
        })
    }

    /// Mode of the spectrum in the middle of the base spectra.
    pub fn detect_mode(&self) -> SpectrumMode {
        detect_mode(&self.base[self.num_spectra() / 2])
    }

    /// True once centroided, otherwise a guess from one spectrum
    /// (see [`detect_mode`]).
    pub fn check_centroid(&self) -> bool {
        self.is_centroided() || self.detect_mode() == SpectrumMode::Centroid
    }

    /// Back to the spectra as loaded: no overlay, no filters.
    pub fn reset_processing(&mut self) {
        self.base = Arc::clone(&self.loaded);
        self.overlay = None;
        self.state.reset();
        info!("Processing reset");
    }

    /// Ion image of the current spectra, sized by the metadata extents.
    pub fn get_ion_image(&self, query: &IonImageQuery) -> Result<IonImage> {
        let extents = self.metadata.pixel_extents()?;
        extract_ion_image(self.current(), &self.coordinates, extents, query)
    }

    /// Aggregates a selection of the current spectra on the calling thread.
    ///
    /// The whole-dataset result goes through the mean-spectrum cache,
    /// selections of indices are never cached.
    pub fn aggregate(
        &mut self,
        selection: &Selection,
        config: &AggregationConfig,
    ) -> Result<Spectrum> {
        if selection.is_all() {
            return self.mean_spectrum(config);
        }
        let indices = selection.resolve(self.num_spectra())?;
        let plan = AggregationPlan::new(self.current(), &indices);
        let (spectrum, _) = run_batched(
            &plan,
            config,
            &CancellationToken::new(),
            &ProgressBar::hidden(),
        )?;
        Ok(spectrum)
    }

    /// Aggregated spectrum of the pixels `(y, x)` of a region of interest.
    ///
    /// Pixels without a spectrum are ignored.
    pub fn aggregate_roi(
        &mut self,
        roi: &[(i32, i32)],
        config: &AggregationConfig,
    ) -> Result<Spectrum> {
        let mut indices: Vec<usize> = roi
            .iter()
            .filter_map(|&(y, x)| usize::try_from(self.get_index(y, x)).ok())
            .collect();
        indices.sort_unstable();
        if indices.is_empty() {
            return Err(MsiQueryError::EmptySelection {
                context: "The ROI is empty".into(),
            });
        }
        info!("ROI with {} spectra", indices.len());
        self.aggregate(&Selection::Indices(indices), config)
    }

    /// Whole-dataset aggregate of the current spectra, memoized per
    /// processing state.
    pub fn mean_spectrum(&mut self, config: &AggregationConfig) -> Result<Spectrum> {
        let key = MeanSpectrumKey::new(self.state.cache_key(), config);
        if let Some(hit) = self.mean_spectra.get(&key) {
            info!("Using cached mean spectrum for '{}'", self.state.label());
            return Ok(hit.clone());
        }
        let indices: Vec<usize> = (0..self.num_spectra()).collect();
        let plan = AggregationPlan::new(self.current(), &indices);
        let (spectrum, _) = run_batched(
            &plan,
            config,
            &CancellationToken::new(),
            &ProgressBar::hidden(),
        )?;
        self.mean_spectra.insert(key, spectrum.clone());
        Ok(spectrum)
    }

    pub fn cached_mean_spectrum(&self, config: &AggregationConfig) -> Option<&Spectrum> {
        self.mean_spectra
            .get(&MeanSpectrumKey::new(self.state.cache_key(), config))
    }

    /// Starts the whole-dataset aggregate on a background thread, over a
    /// snapshot of the current spectra.
    ///
    /// Hand the output back through [`Dataset::store_mean_spectrum`].
    pub fn spawn_mean_spectrum(
        &self,
        config: AggregationConfig,
        progress: ProgressBar,
    ) -> Result<AggregationJob> {
        AggregationJob::spawn(
            self.snapshot(),
            (0..self.num_spectra()).collect(),
            self.state.cache_key(),
            self.generation(),
            config,
            progress,
        )
    }

    /// Caches the output of a background aggregation.
    ///
    /// Fails with [`MsiQueryError::Stale`] when the spectra were processed
    /// again after the job was started.
    pub fn store_mean_spectrum(&mut self, output: AggregationOutput) -> Result<&Spectrum> {
        if output.generation != self.generation() {
            return Err(MsiQueryError::Stale {
                produced: output.generation,
                current: self.generation(),
            });
        }
        let key = MeanSpectrumKey::new(output.cache_key, &output.config);
        let entry = self.mean_spectra.entry(key);
        Ok(match entry {
            Entry::Occupied(mut e) => {
                e.insert(output.spectrum);
                e.into_mut()
            }
            Entry::Vacant(e) => e.insert(output.spectrum),
        })
    }

    pub fn clear_mean_spectra(&mut self) {
        self.mean_spectra.clear();
    }

    /// Quick-look mean spectrum over `n` random spectra, see
    /// [`sample_mean_spectrum`].
    pub fn sample_mean_spectrum(&self, n: usize, seed: u64) -> Result<Spectrum> {
        sample_mean_spectrum(self.current(), n, seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::metadata::{
        MAX_PIXELS_X_KEY,
        MAX_PIXELS_Y_KEY,
    };

    fn dataset() -> Dataset {
        let spectra = vec![
            Spectrum::try_new(vec![100.0, 101.0, 102.0], vec![0.0, 4.0, 0.0]).unwrap(),
            Spectrum::try_new(vec![100.0, 101.0, 102.0], vec![2.0, 2.0, 0.0]).unwrap(),
            Spectrum::try_new(vec![100.0, 101.0, 102.0], vec![0.0, 8.0, 8.0]).unwrap(),
        ];
        let coords = vec![
            Coordinate::planar(1, 1),
            Coordinate::planar(2, 1),
            Coordinate::planar(1, 2),
        ];
        let meta: Metadata = [(MAX_PIXELS_X_KEY, "2"), (MAX_PIXELS_Y_KEY, "2")]
            .into_iter()
            .collect();
        Dataset::new(spectra, coords, meta).unwrap()
    }

    #[test]
    fn test_construction_errors() {
        let spec = Spectrum::try_new(vec![1.0], vec![1.0]).unwrap();
        assert!(Dataset::new(vec![spec], vec![], Metadata::new()).is_err());
        assert!(Dataset::new(vec![], vec![], Metadata::new()).is_err());
    }

    #[test]
    fn test_duplicate_coordinates_first_wins() {
        let spec = Spectrum::try_new(vec![1.0], vec![1.0]).unwrap();
        let ds = Dataset::new(
            vec![spec.clone(), spec],
            vec![Coordinate::planar(1, 1), Coordinate::planar(1, 1)],
            Metadata::new(),
        )
        .unwrap();
        assert_eq!(ds.get_index(1, 1), 0);
    }

    #[test]
    fn test_clamped_lookups() {
        let ds = dataset();
        assert_eq!(ds.get_coordinates(-1), Coordinate::planar(1, 1));
        assert_eq!(ds.get_coordinates(99), Coordinate::planar(1, 2));
        assert_eq!(ds.get_spectrum(99), ds.get_spectrum(2));
    }

    #[test]
    fn test_normalize_then_centroid_then_original() {
        let mut ds = dataset();
        ds.normalize(&NormalizationMethod::Tic).unwrap();
        assert!(ds.is_normalized());
        assert_eq!(ds.get_spectrum(0).intensity(), &[0.0, 1.0, 0.0]);

        ds.centroid_data();
        assert!(ds.is_centroided());
        assert!(ds.is_normalized());
        assert_eq!(ds.state().label(), "tic | centroid");

        // A new normalization starts over from the loaded spectra
        ds.normalize(&NormalizationMethod::Median).unwrap();
        assert!(!ds.is_centroided());
        assert_eq!(ds.get_spectrum(0).len(), 3);

        ds.normalize(&NormalizationMethod::Original).unwrap();
        assert!(!ds.is_normalized());
        assert_eq!(ds.get_all_spectra(), ds.loaded_spectra());
    }

    #[test]
    fn test_filters_validate_before_mutating() {
        let mut ds = dataset();
        let generation = ds.generation();
        assert!(matches!(
            ds.noise_reduction(101.0),
            Err(MsiQueryError::InvalidParameter { .. })
        ));
        assert!(ds.remove_hotspots(f64::NAN).is_err());
        assert_eq!(ds.generation(), generation);
        assert_eq!(ds.get_all_spectra(), ds.loaded_spectra());
    }

    #[test]
    fn test_filters_on_base_survive_normalization() {
        let mut ds = dataset();
        // Non-zero sample [4, 2, 2, 8, 8], 0th percentile is 2
        let outcome = ds.noise_reduction(0.0).unwrap();
        assert_eq!(outcome.limit, 2.0);
        assert_eq!(outcome.points_changed, 0);
        let outcome = ds.remove_hotspots(50.0).unwrap();
        assert_eq!(outcome.limit, 4.0);
        assert_eq!(ds.get_spectrum(2).intensity(), &[0.0, 4.0, 4.0]);
        // The loaded spectra are untouched
        assert_eq!(ds.loaded_spectra()[2].intensity(), &[0.0, 8.0, 8.0]);

        ds.normalize(&NormalizationMethod::Tic).unwrap();
        assert_eq!(ds.get_spectrum(2).intensity(), &[0.0, 1.0, 1.0]);

        ds.reset_processing();
        assert_eq!(ds.get_spectrum(2).intensity(), &[0.0, 8.0, 8.0]);
        assert_eq!(ds.state().label(), "original");
    }

    #[test]
    fn test_snapshot_is_isolated() {
        let mut ds = dataset();
        let snapshot = ds.snapshot();
        ds.remove_hotspots(0.0).unwrap();
        assert_eq!(snapshot[2].intensity(), &[0.0, 8.0, 8.0]);
        assert_ne!(ds.get_spectrum(2).intensity(), snapshot[2].intensity());
    }

    #[test]
    fn test_mean_spectrum_cache_and_stale_results() {
        let mut ds = dataset();
        let config = AggregationConfig::default();
        let job = ds
            .spawn_mean_spectrum(config, ProgressBar::hidden())
            .unwrap();
        let output = job.wait().unwrap();
        let stored = ds.store_mean_spectrum(output.clone()).unwrap().clone();
        assert_eq!(stored.intensity(), &[2.0, 14.0, 8.0]);
        assert_eq!(ds.cached_mean_spectrum(&config), Some(&stored));

        ds.normalize(&NormalizationMethod::Tic).unwrap();
        assert!(ds.cached_mean_spectrum(&config).is_none());
        assert!(matches!(
            ds.store_mean_spectrum(output),
            Err(MsiQueryError::Stale { .. })
        ));

        ds.normalize(&NormalizationMethod::Original).unwrap();
        assert_eq!(ds.cached_mean_spectrum(&config), Some(&stored));
        ds.clear_mean_spectra();
        assert!(ds.cached_mean_spectrum(&config).is_none());
    }

    #[test]
    fn test_peak_tolerance_is_part_of_the_cache_key() {
        let spectrum = Spectrum::try_new(vec![99.6, 100.0, 200.0], vec![50.0, 1.0, 10.0]).unwrap();
        let mut ds =
            Dataset::new(vec![spectrum], vec![Coordinate::planar(1, 1)], Metadata::new()).unwrap();
        let config = AggregationConfig::default();

        ds.normalize(&NormalizationMethod::peak(100.0, 0.003)).unwrap();
        let narrow = ds.mean_spectrum(&config).unwrap();
        assert_eq!(narrow.intensity(), &[5000.0, 100.0, 1000.0]);

        // Same label, different window: 99.6 is now the reference peak
        ds.normalize(&NormalizationMethod::peak(100.0, 0.5)).unwrap();
        assert_eq!(ds.normalization_label(), "peak 100");
        assert!(ds.cached_mean_spectrum(&config).is_none());
        let wide = ds.mean_spectrum(&config).unwrap();
        let fresh = ds.aggregate(&Selection::Indices(vec![0]), &config).unwrap();
        assert_eq!(wide, fresh);
        assert_eq!(wide.intensity(), &[100.0, 2.0, 20.0]);
    }

    #[test]
    fn test_aggregate_roi() {
        let mut ds = dataset();
        let config = AggregationConfig::default();
        let roi = ds.aggregate_roi(&[(1, 2), (1, 1), (9, 9)], &config).unwrap();
        assert_eq!(roi.intensity(), &[2.0, 6.0, 0.0]);
        assert!(matches!(
            ds.aggregate_roi(&[(9, 9)], &config),
            Err(MsiQueryError::EmptySelection { .. })
        ));
    }

    #[test]
    fn test_mode_and_ion_image() {
        let mut ds = dataset();
        assert_eq!(ds.detect_mode(), SpectrumMode::Profile);
        assert!(!ds.check_centroid());
        ds.centroid_data();
        assert!(ds.check_centroid());

        let image = ds.get_ion_image(&IonImageQuery::new(101.0, 0.6)).unwrap();
        assert_eq!(image.shape(), (2, 2));
        assert_eq!(image.get(1, 1), Some(0.0));
    }

    #[test]
    fn test_ion_image_without_extents() {
        let spec = Spectrum::try_new(vec![1.0], vec![1.0]).unwrap();
        let ds =
            Dataset::new(vec![spec], vec![Coordinate::planar(1, 1)], Metadata::new()).unwrap();
        assert!(matches!(
            ds.get_ion_image(&IonImageQuery::new(1.0, 0.1)),
            Err(MsiQueryError::MissingPixelExtents)
        ));
    }
}
