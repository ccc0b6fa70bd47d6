use indicatif::{
    ProgressBar,
    ProgressStyle,
};
use msiquery::serde::{
    read_json_dataset,
    write_metadata_csv,
    write_spectrum_csv,
};
use msiquery::{
    Dataset,
    IonImage,
    IonImageQuery,
    ProcessingState,
};
use serde::Serialize;
use std::path::Path;
use std::time::{
    Duration,
    Instant,
};
use tracing::{
    info,
    instrument,
    warn,
};

use crate::cli::{
    InspectArgs,
    ProcessArgs,
    WriteTemplateArgs,
};
use crate::config::{
    CONFIG_TEMPLATE,
    ProcessingConfig,
};
use crate::error::CliError;
use crate::processing::{
    StepReport,
    run_pipeline,
};

#[derive(Debug, Serialize)]
struct IonImageOutput<'a> {
    query: &'a IonImageQuery,
    /// (height, width)
    shape: (usize, usize),
    max: f64,
    image: IonImage,
}

#[derive(Debug, Serialize)]
struct ProcessingReport<'a> {
    state: &'a ProcessingState,
    steps: Vec<StepReport>,
    mean_spectrum_points: usize,
}

fn progress_bar(hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} batches ({eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    ProgressBar::new(0).with_style(style)
}

/// Main function for the 'process' subcommand.
#[instrument(skip_all)]
pub fn main_process(args: ProcessArgs) -> Result<(), CliError> {
    let start = Instant::now();
    let config = ProcessingConfig::read(&args.config)?;
    config.validate()?;
    info!("Using configuration: {:#?}", config);

    let mut dataset = read_json_dataset(&args.input)?;
    let output_path = args.output_path;
    std::fs::create_dir_all(&output_path)?;

    let steps = run_pipeline(&mut dataset, &config.processing)?;

    let job = dataset.spawn_mean_spectrum(config.aggregation, progress_bar(args.no_progress))?;
    let output = match args.timeout_secs {
        Some(secs) => job.wait_timeout(Duration::from_secs(secs))?,
        None => job.wait()?,
    };
    info!(
        "Mean spectrum of {} spectra in {} batches on {} workers",
        output.stats.n_spectra, output.stats.batches, output.stats.workers
    );
    let mean = dataset.store_mean_spectrum(output)?.clone();
    let range = config.export.mz_range.as_ref();
    write_spectrum_csv(output_path.join("mean_spectrum.csv"), &mean, range)?;

    if let Some(roi) = &config.roi {
        let roi_mean = dataset.aggregate_roi(roi, &config.aggregation)?;
        write_spectrum_csv(output_path.join("roi_mean_spectrum.csv"), &roi_mean, range)?;
    }

    if let Some(n) = config.export.sampled_spectra {
        let sampled = dataset.sample_mean_spectrum(n, config.export.seed)?;
        write_spectrum_csv(output_path.join("sampled_mean_spectrum.csv"), &sampled, range)?;
    }

    write_ion_images(&dataset, &config.ion_images, &output_path)?;

    write_metadata_csv(output_path.join("metadata.csv"), dataset.metadata())?;
    std::fs::write(output_path.join("metadata.json"), dataset.metadata_json()?)?;

    let report = ProcessingReport {
        state: dataset.state(),
        steps,
        mean_spectrum_points: mean.len(),
    };
    std::fs::write(
        output_path.join("processing_report.json"),
        serde_json::to_string_pretty(&report)?,
    )?;

    println!("Wrote outputs to {}", output_path.display());
    println!("Total processing took {:#?}", start.elapsed());
    Ok(())
}

fn write_ion_images(
    dataset: &Dataset,
    queries: &[IonImageQuery],
    output_path: &Path,
) -> Result<(), CliError> {
    if queries.is_empty() {
        return Ok(());
    }
    let mut images = Vec::with_capacity(queries.len());
    for query in queries {
        let image = dataset.get_ion_image(query)?;
        if image.count_nonzero() == 0 {
            warn!("Ion image at m/z {} is blank", query.mz);
        }
        images.push(IonImageOutput {
            query,
            shape: image.shape(),
            max: image.max_value(),
            image,
        });
    }
    let path = output_path.join("ion_images.json");
    std::fs::write(&path, serde_json::to_string(&images)?)?;
    info!("Wrote {} ion images to {}", images.len(), path.display());
    Ok(())
}

#[derive(Debug, Serialize)]
struct DatasetSummary {
    num_spectra: usize,
    width: Option<usize>,
    height: Option<usize>,
    mode: msiquery::SpectrumMode,
    min_tic: f64,
    max_tic: f64,
    total_points: usize,
}

fn summarize(dataset: &Dataset) -> DatasetSummary {
    let extents = match dataset.metadata().pixel_extents() {
        Ok(x) => Some(x),
        Err(e) => {
            warn!("{}", e);
            None
        }
    };
    let tic = dataset.tic();
    DatasetSummary {
        num_spectra: dataset.num_spectra(),
        width: extents.map(|x| x.width),
        height: extents.map(|x| x.height),
        mode: dataset.detect_mode(),
        min_tic: tic.iter().copied().fold(f64::INFINITY, f64::min),
        max_tic: tic.iter().copied().fold(0.0, f64::max),
        total_points: dataset.get_all_spectra().iter().map(|s| s.len()).sum(),
    }
}

/// Main function for the 'inspect' subcommand.
pub fn main_inspect(args: InspectArgs) -> Result<(), CliError> {
    let dataset = read_json_dataset(&args.input)?;
    println!("{}", serde_json::to_string_pretty(&summarize(&dataset))?);
    println!("{}", dataset.metadata_json()?);
    Ok(())
}

/// Main function for the 'write-template' subcommand.
pub fn main_write_template(args: WriteTemplateArgs) -> Result<(), CliError> {
    let target_dir = args.output_path;
    std::fs::create_dir_all(&target_dir)?;

    let config_path = target_dir.join("processing_template.json");
    std::fs::write(&config_path, CONFIG_TEMPLATE)?;
    println!("Wrote processing template to: {}", config_path.display());
    Ok(())
}
