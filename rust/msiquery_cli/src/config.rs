use msiquery::processing::validate_percentile;
use msiquery::{
    AggregationConfig,
    IonImageQuery,
    MzRange,
    NormalizationMethod,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::path::Path;

use crate::error::CliError;

/// One processing step, applied in the order they are listed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepConfig {
    Normalize { method: NormalizationMethod },
    Centroid,
    NoiseReduction { percentile: f64 },
    RemoveHotspots { percentile: f64 },
}

impl StepConfig {
    fn validate(&self) -> Result<(), CliError> {
        match self {
            StepConfig::Normalize { method } => method.validate()?,
            StepConfig::Centroid => {}
            StepConfig::NoiseReduction { percentile }
            | StepConfig::RemoveHotspots { percentile } => validate_percentile(*percentile)?,
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Only the points in this m/z range are written to the spectrum CSVs.
    #[serde(default)]
    pub mz_range: Option<MzRange>,
    /// Also write a quick-look mean over this many random spectra.
    #[serde(default)]
    pub sampled_spectra: Option<usize>,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub processing: Vec<StepConfig>,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub ion_images: Vec<IonImageQuery>,
    /// Pixels of a region of interest, as `[y, x]` pairs.
    #[serde(default)]
    pub roi: Option<Vec<(i32, i32)>>,
    #[serde(default)]
    pub export: ExportConfig,
}

impl ProcessingConfig {
    pub fn read(path: &Path) -> Result<Self, CliError> {
        let config: Self = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        Ok(config)
    }

    /// Checks every parameter, nothing is applied until the whole
    /// configuration is known to be usable.
    pub fn validate(&self) -> Result<(), CliError> {
        for step in self.processing.iter() {
            step.validate()?;
        }
        self.aggregation.validate()?;
        for query in self.ion_images.iter() {
            query.validate()?;
        }
        if let Some(roi) = &self.roi {
            if roi.is_empty() {
                return Err(CliError::Config("'roi' is present but empty".to_string()));
            }
        }
        if self.export.sampled_spectra == Some(0) {
            return Err(CliError::Config(
                "'export.sampled_spectra' must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

pub const CONFIG_TEMPLATE: &str = r#"{
  "processing": [
    { "type": "noise_reduction", "percentile": 0.01 },
    { "type": "normalize", "method": "tic" },
    { "type": "centroid" },
    { "type": "remove_hotspots", "percentile": 99.99 }
  ],
  "aggregation": { "decimals": 4, "batch_size": 1000, "worker_fraction": 0.8, "mode": "sum" },
  "ion_images": [
    { "mz": 328.9, "tolerance": 0.25, "z": 1, "reducer": "sum" },
    { "mz": 121.0444, "tolerance": 0.003, "reducer": "max" }
  ],
  "roi": [[1, 1], [1, 2], [2, 1], [2, 2]],
  "export": { "mz_range": [100.0, 1000.0], "sampled_spectra": 500, "seed": 42 }
}"#;
