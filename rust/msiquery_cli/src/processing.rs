use msiquery::Dataset;
use serde::Serialize;
use tracing::{
    info,
    warn,
};

use crate::config::StepConfig;
use crate::error::CliError;

/// What one configured step did to the dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepReport {
    Normalized {
        label: String,
        zeroed: usize,
        flagged: Vec<usize>,
    },
    Centroided {
        output_peaks: usize,
        flagged: Vec<usize>,
    },
    /// Centroiding requested on data that already looks centroided.
    Skipped { reason: String },
    Filtered {
        step: String,
        limit: f64,
        points_changed: usize,
    },
}

pub fn apply_step(dataset: &mut Dataset, step: &StepConfig) -> Result<StepReport, CliError> {
    let report = match step {
        StepConfig::Normalize { method } => {
            let summary = dataset.normalize(method)?;
            info!("{}", summary);
            StepReport::Normalized {
                label: summary.label,
                zeroed: summary.zeroed,
                flagged: summary.flagged,
            }
        }
        StepConfig::Centroid => {
            if dataset.check_centroid() {
                warn!("Data is already centroided, skipping centroiding");
                StepReport::Skipped {
                    reason: "data is already centroided".to_string(),
                }
            } else {
                let summary = dataset.centroid_data();
                info!("{}", summary);
                StepReport::Centroided {
                    output_peaks: summary.output_peaks,
                    flagged: summary.flagged,
                }
            }
        }
        StepConfig::NoiseReduction { percentile } => {
            let outcome = dataset.noise_reduction(*percentile)?;
            StepReport::Filtered {
                step: format!("noise_reduction {}", percentile),
                limit: outcome.limit,
                points_changed: outcome.points_changed,
            }
        }
        StepConfig::RemoveHotspots { percentile } => {
            let outcome = dataset.remove_hotspots(*percentile)?;
            StepReport::Filtered {
                step: format!("remove_hotspots {}", percentile),
                limit: outcome.limit,
                points_changed: outcome.points_changed,
            }
        }
    };
    Ok(report)
}

/// Applies the steps in order. Stops at the first failing step, the
/// dataset keeps the steps applied before it.
pub fn run_pipeline(
    dataset: &mut Dataset,
    steps: &[StepConfig],
) -> Result<Vec<StepReport>, CliError> {
    let mut reports = Vec::with_capacity(steps.len());
    for step in steps {
        reports.push(apply_step(dataset, step)?);
    }
    info!("Processing pipeline: {}", dataset.state().label());
    Ok(reports)
}
