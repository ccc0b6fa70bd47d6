use std::path::Path;

use serde::{
    Deserialize,
    Serialize,
};
use tracing::info;

use crate::errors::{
    MsiQueryError,
    Result,
};
use crate::models::{
    Coordinate,
    Dataset,
    Metadata,
};
use crate::traits::SpectrumSource;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonPixel {
    pub coordinate: Coordinate,
    pub mz: Vec<f64>,
    pub intensity: Vec<f64>,
}

/// A whole acquisition in one JSON document.
///
/// ```json
/// {
///   "metadata": { "max count of pixels x": 2, "max count of pixels y": 1 },
///   "spectra": [
///     { "coordinate": [1, 1, 1], "mz": [100.0, 101.0], "intensity": [5.0, 10.0] },
///     { "coordinate": [2, 1, 1], "mz": [100.0], "intensity": [3.0] }
///   ]
/// }
/// ```
///
/// Metadata values may be any JSON scalar, they are kept as strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonDataset {
    #[serde(default)]
    pub metadata: Metadata,
    pub spectra: Vec<JsonPixel>,
}

impl JsonDataset {
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let out: Self = serde_json::from_str(&content)?;
        info!(
            "Read {} spectra from {}",
            out.spectra.len(),
            path.as_ref().display()
        );
        Ok(out)
    }

    /// The spectra as loaded, with their coordinates and metadata.
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let spectra = dataset
            .loaded_spectra()
            .iter()
            .zip(dataset.coordinates())
            .map(|(s, c)| JsonPixel {
                coordinate: *c,
                mz: s.mz().to_vec(),
                intensity: s.intensity().to_vec(),
            })
            .collect();
        Self {
            metadata: dataset.metadata().clone(),
            spectra,
        }
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        serde_json::to_writer(std::io::BufWriter::new(file), self)?;
        Ok(())
    }

    fn pixel(&self, index: usize) -> Result<&JsonPixel> {
        self.spectra.get(index).ok_or_else(|| {
            MsiQueryError::invalid("spectrum index", index, "index past the last spectrum")
        })
    }
}

impl SpectrumSource for JsonDataset {
    fn num_spectra(&self) -> usize {
        self.spectra.len()
    }

    fn read_spectrum(&self, index: usize) -> Result<(Vec<f64>, Vec<f64>)> {
        let pixel = self.pixel(index)?;
        Ok((pixel.mz.clone(), pixel.intensity.clone()))
    }

    fn coordinate(&self, index: usize) -> Result<Coordinate> {
        Ok(self.pixel(index)?.coordinate)
    }

    fn metadata(&self) -> Metadata {
        self.metadata.clone()
    }
}

/// Reads a [`JsonDataset`] file into a [`Dataset`].
pub fn read_json_dataset(path: impl AsRef<Path>) -> Result<Dataset> {
    Dataset::from_source(&JsonDataset::read(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DataProcessingError;
    use crate::models::PixelExtents;

    const DOC: &str = r#"{
        "metadata": { "max count of pixels x": 2, "max count of pixels y": "1", "source": "test" },
        "spectra": [
            { "coordinate": [1, 1, 1], "mz": [100.0, 101.0], "intensity": [5.0, 10.0] },
            { "coordinate": [2, 1, 1], "mz": [100.0], "intensity": [3.0] }
        ]
    }"#;

    #[test]
    fn test_read_document() {
        let doc: JsonDataset = serde_json::from_str(DOC).unwrap();
        let ds = Dataset::from_source(&doc).unwrap();
        assert_eq!(ds.num_spectra(), 2);
        assert_eq!(ds.get_index(1, 2), 1);
        assert_eq!(
            ds.metadata().pixel_extents().unwrap(),
            PixelExtents {
                width: 2,
                height: 1
            }
        );
        assert_eq!(ds.metadata().get("source"), Some("test"));
    }

    #[test]
    fn test_length_mismatch_names_the_spectrum() {
        let doc: JsonDataset = serde_json::from_str(
            r#"{"spectra": [{ "coordinate": [1, 1, 1], "mz": [100.0, 101.0], "intensity": [5.0] }]}"#,
        )
        .unwrap();
        match Dataset::from_source(&doc) {
            Err(MsiQueryError::DataProcessing(DataProcessingError::ExpectedSlicesSameLength {
                context,
                ..
            })) => assert!(context.contains("at spectrum 0")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.json");
        let doc: JsonDataset = serde_json::from_str(DOC).unwrap();
        doc.write(&path).unwrap();

        let ds = read_json_dataset(&path).unwrap();
        assert_eq!(JsonDataset::from_dataset(&ds), doc);
    }
}
