use crate::errors::Result;
use crate::models::{
    Coordinate,
    Metadata,
};

/// Anything that can hand over the raw spectra of an acquisition.
///
/// This is the only contract between the engine and the file readers:
/// spectra are addressed by index in `0..num_spectra()`, each one comes
/// with its pixel coordinate, and the file-level metadata is available as
/// key/value pairs.
pub trait SpectrumSource {
    fn num_spectra(&self) -> usize;

    /// Raw `(mz, intensity)` arrays of spectrum `index`.
    fn read_spectrum(&self, index: usize) -> Result<(Vec<f64>, Vec<f64>)>;

    fn coordinate(&self, index: usize) -> Result<Coordinate>;

    fn metadata(&self) -> Metadata;
}
