use msiquery::aggregation::{
    aggregate_batched,
    aggregate_sequential,
};
use msiquery::models::{
    MAX_PIXELS_X_KEY,
    MAX_PIXELS_Y_KEY,
};
use msiquery::{
    AggregationConfig,
    CancellationToken,
    Coordinate,
    Dataset,
    IonImageQuery,
    Metadata,
    NormalizationMethod,
    Spectrum,
};

const WIDTH: i32 = 6;
const HEIGHT: i32 = 4;
const POINTS: usize = 200;

// Triangle peaks of width 3 separated by at least two zeros. Returns the
// spectrum and its number of peaks.
fn profile_spectrum(pixel: usize) -> (Spectrum, usize) {
    let mz: Vec<f64> = (0..POINTS).map(|k| 100.0 + k as f64 * 0.05).collect();
    let mut intensity = vec![0.0; POINTS];
    let n_peaks = 2 + pixel % 5;
    for p in 0..n_peaks {
        let center = 5 + p * 30 + (pixel % 3);
        let height = 10.0 + ((pixel * 7 + p * 13) % 23) as f64;
        intensity[center - 1] = height / 2.0;
        intensity[center] = height;
        intensity[center + 1] = height / 2.0;
    }
    (Spectrum::try_new(mz, intensity).unwrap(), n_peaks)
}

fn profile_dataset() -> (Dataset, Vec<usize>) {
    let mut spectra = Vec::new();
    let mut coords = Vec::new();
    let mut peaks = Vec::new();
    for y in 1..=HEIGHT {
        for x in 1..=WIDTH {
            let (spec, n) = profile_spectrum(spectra.len());
            spectra.push(spec);
            peaks.push(n);
            coords.push(Coordinate::planar(x, y));
        }
    }
    let meta: Metadata = [
        (MAX_PIXELS_X_KEY, WIDTH.to_string()),
        (MAX_PIXELS_Y_KEY, HEIGHT.to_string()),
    ]
    .into_iter()
    .collect();
    (Dataset::new(spectra, coords, meta).unwrap(), peaks)
}

fn nonzero_counts(dataset: &Dataset) -> Vec<usize> {
    dataset
        .get_all_spectra()
        .iter()
        .map(|s| s.count_nonzero())
        .collect()
}

#[test]
fn test_out_of_range_indices_are_clamped() {
    let (dataset, _) = profile_dataset();
    let n = dataset.num_spectra() as i64;
    assert_eq!(dataset.get_spectrum(-5), dataset.get_spectrum(0));
    assert_eq!(dataset.get_spectrum(n + 100), dataset.get_spectrum(n - 1));

    let single = Dataset::new(
        vec![Spectrum::try_new(vec![1.0], vec![1.0]).unwrap()],
        vec![Coordinate::planar(1, 1)],
        Metadata::new(),
    )
    .unwrap();
    assert_eq!(single.get_spectrum(-5), single.get_spectrum(7));
}

#[test]
fn test_original_restores_loaded_spectra() {
    let (mut dataset, _) = profile_dataset();
    let before = dataset.get_all_spectra().to_vec();
    for method in [
        NormalizationMethod::Tic,
        NormalizationMethod::Rms,
        NormalizationMethod::Median,
        NormalizationMethod::peak(105.25, 0.003),
    ] {
        dataset.normalize(&method).unwrap();
        dataset.centroid_data();
        dataset.normalize(&NormalizationMethod::Original).unwrap();
        assert_eq!(dataset.get_all_spectra(), before.as_slice());
    }
}

#[test]
fn test_tic_normalized_mean_is_one() {
    let (mut dataset, _) = profile_dataset();
    dataset.normalize(&NormalizationMethod::Tic).unwrap();
    for spectrum in dataset.get_all_spectra() {
        let nonzero: Vec<f64> = spectrum.nonzero_intensities().collect();
        let mean = nonzero.iter().sum::<f64>() / nonzero.len() as f64;
        assert!((mean - 1.0).abs() < 1e-12, "mean was {}", mean);
    }
}

#[test]
fn test_one_centroid_per_run() {
    let (mut dataset, peaks) = profile_dataset();
    let summary = dataset.centroid_data();
    assert!(summary.flagged.is_empty());
    for (spectrum, n) in dataset.get_all_spectra().iter().zip(peaks.iter()) {
        assert_eq!(spectrum.len(), *n);
        assert!(spectrum.mz().windows(2).all(|w| w[0] < w[1]));
    }
    assert_eq!(summary.output_peaks, peaks.iter().sum::<usize>());
}

#[test]
fn test_batched_and_sequential_aggregates_are_identical() {
    let (dataset, _) = profile_dataset();
    let spectra = dataset.get_all_spectra();
    let indices: Vec<usize> = (0..spectra.len()).rev().collect();
    for batch_size in [1, 5, 7, 1000] {
        let config = AggregationConfig {
            batch_size,
            ..Default::default()
        };
        let seq = aggregate_sequential(spectra, &indices, &config).unwrap();
        let (par, _) = aggregate_batched(
            spectra,
            &indices,
            &config,
            &CancellationToken::new(),
            &indicatif::ProgressBar::hidden(),
        )
        .unwrap();
        assert_eq!(seq.mz(), par.mz());
        let seq_bits: Vec<u64> = seq.intensity().iter().map(|x| x.to_bits()).collect();
        let par_bits: Vec<u64> = par.intensity().iter().map(|x| x.to_bits()).collect();
        assert_eq!(seq_bits, par_bits);
    }
}

#[test]
fn test_three_spectra_aggregate() {
    let spectra = vec![
        Spectrum::try_new(vec![100.0, 101.0], vec![5.0, 10.0]).unwrap(),
        Spectrum::try_new(vec![100.0, 101.0], vec![3.0, 7.0]).unwrap(),
        Spectrum::try_new(vec![101.0], vec![2.0]).unwrap(),
    ];
    let coords = (1..=3).map(|x| Coordinate::planar(x, 1)).collect();
    let mut dataset = Dataset::new(spectra, coords, Metadata::new()).unwrap();
    let config = AggregationConfig {
        decimals: 4,
        ..Default::default()
    };
    let out = dataset.mean_spectrum(&config).unwrap();
    assert_eq!(out.mz(), &[100.0, 101.0]);
    assert_eq!(out.intensity(), &[8.0, 19.0]);
}

#[test]
fn test_ion_image_without_matches_is_blank() {
    let (dataset, _) = profile_dataset();
    let image = dataset
        .get_ion_image(&IonImageQuery::new(5000.0, 0.5))
        .unwrap();
    assert_eq!(image.shape(), (HEIGHT as usize, WIDTH as usize));
    assert_eq!(image.count_nonzero(), 0);
}

#[test]
fn test_ion_image_with_undersized_metadata() {
    let (dataset, _) = profile_dataset();
    let mut meta = dataset.metadata().clone();
    meta.insert(MAX_PIXELS_X_KEY, "2");
    let shrunk = Dataset::new(
        dataset.get_all_spectra().to_vec(),
        dataset.coordinates().to_vec(),
        meta,
    )
    .unwrap();
    let err = shrunk
        .get_ion_image(&IonImageQuery::new(100.25, 0.1))
        .unwrap_err();
    assert!(err.to_string().starts_with("Metadata is incorrect"));
}

#[test]
fn test_noise_reduction_is_monotone() {
    let (mut dataset, _) = profile_dataset();
    let mut previous = nonzero_counts(&dataset);
    for p in [0.0, 5.0, 20.0, 40.0, 60.0, 80.0, 99.0] {
        dataset.noise_reduction(p).unwrap();
        let current = nonzero_counts(&dataset);
        for (now, before) in current.iter().zip(previous.iter()) {
            assert!(now <= before);
        }
        previous = current;
    }
}

#[test]
fn test_hotspot_clip_bounds_the_percentile() {
    let (mut dataset, _) = profile_dataset();
    let outcome = dataset.remove_hotspots(99.0).unwrap();
    let after = dataset.percentile(99.0).unwrap();
    assert!(after <= outcome.limit);
    let max = dataset
        .get_all_spectra()
        .iter()
        .flat_map(|s| s.intensity().iter().copied())
        .fold(0.0, f64::max);
    assert!(max <= outcome.limit);
}
