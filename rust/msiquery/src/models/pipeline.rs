use serde::{
    Deserialize,
    Serialize,
};

use crate::processing::NormalizationMethod;

/// One transformation applied to the spectra of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessingStep {
    Normalize { method: NormalizationMethod },
    Centroid,
    /// Zeroed non-zero intensities below `limit`, the `percentile` of the data.
    NoiseReduction { percentile: f64, limit: f64 },
    /// Clipped intensities above `limit`, the `percentile` of the data.
    HotspotRemoval { percentile: f64, limit: f64 },
}

impl ProcessingStep {
    pub fn label(&self) -> String {
        match self {
            ProcessingStep::Normalize { method } => method.label(),
            ProcessingStep::Centroid => "centroid".to_string(),
            ProcessingStep::NoiseReduction { percentile, .. } => {
                format!("noise_reduction {}", percentile)
            }
            ProcessingStep::HotspotRemoval { percentile, .. } => {
                format!("remove_hotspots {}", percentile)
            }
        }
    }
}

/// Which transformations produced the current spectra.
///
/// `base_steps` were applied directly to the loaded spectra (filters run
/// while no overlay was active). `overlay_steps` produced the overlay, in
/// order: an optional normalization first, then centroiding and filters as
/// the user applied them.
///
/// `generation` increases on every change, so results computed from an
/// older snapshot can be told apart.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingState {
    base_steps: Vec<ProcessingStep>,
    overlay_steps: Vec<ProcessingStep>,
    generation: u64,
}

impl ProcessingState {
    pub fn base_steps(&self) -> &[ProcessingStep] {
        &self.base_steps
    }

    pub fn overlay_steps(&self) -> &[ProcessingStep] {
        &self.overlay_steps
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn normalization(&self) -> Option<&NormalizationMethod> {
        self.overlay_steps.iter().find_map(|s| match s {
            ProcessingStep::Normalize { method } => Some(method),
            _ => None,
        })
    }

    pub fn is_normalized(&self) -> bool {
        self.normalization().is_some()
    }

    pub fn is_centroided(&self) -> bool {
        self.overlay_steps
            .iter()
            .any(|s| matches!(s, ProcessingStep::Centroid))
    }

    /// `"original"`, `"tic"`, `"rms"`, `"median"` or `"peak <mz>"`.
    pub fn normalization_label(&self) -> String {
        self.normalization()
            .map(|m| m.label())
            .unwrap_or_else(|| NormalizationMethod::Original.label())
    }

    /// Every applied step in order, `"original"` when there are none.
    pub fn label(&self) -> String {
        let labels: Vec<String> = self
            .base_steps
            .iter()
            .chain(self.overlay_steps.iter())
            .map(|s| s.label())
            .collect();
        if labels.is_empty() {
            NormalizationMethod::Original.label()
        } else {
            labels.join(" | ")
        }
    }

    /// Every applied step with all of its parameters.
    ///
    /// Two states with the same key hold the same data. Unlike [`label`],
    /// parameters such as the peak tolerance are part of it.
    ///
    /// [`label`]: ProcessingState::label
    pub fn cache_key(&self) -> String {
        if self.base_steps.is_empty() && self.overlay_steps.is_empty() {
            return NormalizationMethod::Original.label();
        }
        format!("{:?} {:?}", self.base_steps, self.overlay_steps)
    }

    pub(crate) fn push_base(&mut self, step: ProcessingStep) {
        self.base_steps.push(step);
        self.generation += 1;
    }

    pub(crate) fn push_overlay(&mut self, step: ProcessingStep) {
        self.overlay_steps.push(step);
        self.generation += 1;
    }

    /// A new overlay built from the base spectra.
    pub(crate) fn replace_overlay(&mut self, steps: Vec<ProcessingStep>) {
        self.overlay_steps = steps;
        self.generation += 1;
    }

    pub(crate) fn reset(&mut self) {
        self.base_steps.clear();
        self.overlay_steps.clear();
        self.generation += 1;
    }
}
