use std::time::Duration;

use indicatif::ProgressBar;
use msiquery::errors::MsiQueryError;
use msiquery::serde::{
    JsonDataset,
    read_spectrum_csv,
    write_spectrum_csv,
};
use msiquery::{
    AggregationConfig,
    AggregationMode,
    Coordinate,
    Dataset,
    Metadata,
    MzRange,
    NormalizationMethod,
    Selection,
    Spectrum,
};

fn dataset(n: usize) -> Dataset {
    let spectra = (0..n)
        .map(|i| {
            let mz: Vec<f64> = (0..40)
                .map(|k| 300.0 + k as f64 * 0.5 + (i % 4) as f64 * 1e-6)
                .collect();
            let intensity: Vec<f64> = (0..40)
                .map(|k| (1 + (i * 3 + k * 11) % 17) as f64)
                .collect();
            Spectrum::try_new(mz, intensity).unwrap()
        })
        .collect();
    let coords = (0..n as i32)
        .map(|i| Coordinate::planar(i % 10 + 1, i / 10 + 1))
        .collect();
    Dataset::new(spectra, coords, Metadata::new()).unwrap()
}

#[test]
fn test_job_result_is_cached() {
    let mut ds = dataset(120);
    let config = AggregationConfig {
        batch_size: 8,
        ..Default::default()
    };
    let job = ds.spawn_mean_spectrum(config, ProgressBar::hidden()).unwrap();
    let output = job.wait_timeout(Duration::from_secs(60)).unwrap();
    assert_eq!(output.stats.batches, 15);
    assert_eq!(output.stats.n_spectra, 120);

    let stored = ds.store_mean_spectrum(output).unwrap().clone();
    // The synchronous call is served from the cache
    assert_eq!(ds.mean_spectrum(&config).unwrap(), stored);
    assert_eq!(ds.aggregate(&Selection::All, &config).unwrap(), stored);
}

#[test]
fn test_snapshot_survives_later_processing() {
    let mut ds = dataset(60);
    let config = AggregationConfig::default();
    let expected = ds.mean_spectrum(&config).unwrap();
    ds.clear_mean_spectra();

    let job = ds.spawn_mean_spectrum(config, ProgressBar::hidden()).unwrap();
    ds.normalize(&NormalizationMethod::Rms).unwrap();
    ds.remove_hotspots(50.0).unwrap();

    let output = job.wait().unwrap();
    // Computed against the spectra at spawn time
    assert_eq!(output.spectrum, expected);
    // But refused by the dataset, which moved on
    assert!(matches!(
        ds.store_mean_spectrum(output),
        Err(MsiQueryError::Stale { .. })
    ));
}

#[test]
fn test_cancelled_job() {
    let ds = dataset(200);
    let config = AggregationConfig {
        batch_size: 1,
        ..Default::default()
    };
    let job = ds.spawn_mean_spectrum(config, ProgressBar::hidden()).unwrap();
    job.cancel();
    // Either the cancellation landed before the merge or the job already
    // finished, it never returns a partial spectrum
    match job.wait() {
        Ok(output) => assert_eq!(output.stats.n_spectra, 200),
        Err(e) => assert!(matches!(e, MsiQueryError::Cancelled)),
    }
}

#[test]
fn test_mean_mode_and_index_selection() {
    let mut ds = dataset(10);
    let config = AggregationConfig {
        mode: AggregationMode::Mean,
        ..Default::default()
    };
    let one = ds.aggregate(&Selection::Indices(vec![3]), &config).unwrap();
    assert_eq!(one.intensity(), ds.get_spectrum(3).intensity());
    assert!(matches!(
        ds.aggregate(&Selection::Indices(vec![10]), &config),
        Err(MsiQueryError::InvalidParameter { .. })
    ));
}

#[test]
fn test_sampled_mean_is_seeded() {
    let ds = dataset(50);
    let a = ds.sample_mean_spectrum(10, 42).unwrap();
    let b = ds.sample_mean_spectrum(10, 42).unwrap();
    assert_eq!(a, b);
    let all = ds.sample_mean_spectrum(500, 0).unwrap();
    assert!(all.len() >= a.len());
    assert!(matches!(
        ds.sample_mean_spectrum(0, 1),
        Err(MsiQueryError::EmptySelection { .. })
    ));
}

#[test]
fn test_export_displayed_slice() {
    let dir = tempfile::tempdir().unwrap();
    let mut ds = dataset(20);
    ds.normalize(&NormalizationMethod::Tic).unwrap();
    let spectrum = ds.get_spectrum(4).clone();
    let range = MzRange::try_new(305.0, 310.0).unwrap();

    let path = dir.path().join("slice.csv");
    let n = write_spectrum_csv(&path, &spectrum, Some(&range)).unwrap();
    assert_eq!(n, 11);
    let back = read_spectrum_csv(&path).unwrap();
    let (mz, intensity) = spectrum.slice_mz_range(Some(&range));
    assert_eq!(back.mz(), mz);
    assert_eq!(back.intensity(), intensity);

    let json_path = dir.path().join("dataset.json");
    JsonDataset::from_dataset(&ds).write(&json_path).unwrap();
    let reloaded = msiquery::serde::read_json_dataset(&json_path).unwrap();
    // Processing is not persisted, only the loaded spectra
    assert_eq!(reloaded.get_all_spectra(), ds.loaded_spectra());
}
