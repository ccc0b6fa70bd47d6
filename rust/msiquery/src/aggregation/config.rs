use serde::{
    Deserialize,
    Serialize,
};

use super::buckets::MAX_DECIMALS;
use crate::errors::{
    MsiQueryError,
    Result,
};

/// What each m/z bucket of an aggregated spectrum holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// Sum of the intensities of every selected spectrum.
    #[default]
    Sum,
    /// The sum divided by the number of selected spectra.
    Mean,
}

impl AggregationMode {
    pub fn label(&self) -> &'static str {
        match self {
            AggregationMode::Sum => "sum",
            AggregationMode::Mean => "mean",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// m/z values are rounded to this many decimals before grouping.
    pub decimals: u32,
    /// Spectra per independently aggregated batch.
    pub batch_size: usize,
    /// Share of the available cores used by the batched aggregation.
    pub worker_fraction: f64,
    pub mode: AggregationMode,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            decimals: 4,
            batch_size: 1000,
            worker_fraction: 0.8,
            mode: AggregationMode::Sum,
        }
    }
}

impl AggregationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.decimals > MAX_DECIMALS {
            return Err(MsiQueryError::invalid(
                "decimals",
                self.decimals,
                "at most 8 decimals are supported",
            ));
        }
        if self.batch_size == 0 {
            return Err(MsiQueryError::invalid(
                "batch_size",
                self.batch_size,
                "must be at least 1",
            ));
        }
        if !(self.worker_fraction > 0.0 && self.worker_fraction <= 1.0) {
            return Err(MsiQueryError::invalid(
                "worker_fraction",
                self.worker_fraction,
                "must be in (0, 1]",
            ));
        }
        Ok(())
    }

    /// Worker threads for the batched aggregation, never less than one.
    pub fn workers(&self) -> usize {
        let available = std::thread::available_parallelism()
            .map(|x| x.get())
            .unwrap_or(1);
        ((available as f64 * self.worker_fraction).floor() as usize).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_partial_config() {
        let config: AggregationConfig = serde_json::from_str(r#"{"mode": "mean"}"#).unwrap();
        assert_eq!(config.decimals, 4);
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.mode, AggregationMode::Mean);
        assert!(config.validate().is_ok());
        assert!(config.workers() >= 1);
    }

    #[test]
    fn test_validate() {
        let bad = [
            AggregationConfig {
                batch_size: 0,
                ..Default::default()
            },
            AggregationConfig {
                worker_fraction: 0.0,
                ..Default::default()
            },
            AggregationConfig {
                worker_fraction: f64::NAN,
                ..Default::default()
            },
            AggregationConfig {
                decimals: 12,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{:?}", config);
        }
    }
}
