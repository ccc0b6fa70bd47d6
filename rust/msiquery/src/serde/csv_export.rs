use std::io::{
    Read,
    Write,
};
use std::path::Path;

use csv::{
    ReaderBuilder,
    Terminator,
    WriterBuilder,
};
use serde::{
    Deserialize,
    Serialize,
};
use tracing::{
    debug,
    info,
};

use crate::errors::Result;
use crate::models::{
    Metadata,
    Spectrum,
};
use crate::utils::MzRange;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct SpectrumRow {
    #[serde(rename = "m/z")]
    mz: f64,
    intensity: f64,
}

/// Writes the points of `spectrum` inside `range` (all of them if `None`)
/// as `m/z,intensity` rows.
///
/// Rows end in `\r\n`, floats are written in their shortest round-trip
/// form, so the same spectrum always produces the same bytes.
pub fn write_spectrum_csv_to<W: Write>(
    writer: W,
    spectrum: &Spectrum,
    range: Option<&MzRange>,
) -> Result<usize> {
    let mut wtr = WriterBuilder::new()
        .has_headers(true)
        .terminator(Terminator::CRLF)
        .from_writer(writer);
    let (mz, intensity) = spectrum.slice_mz_range(range);
    // Header is written with the first record, an empty slice still gets one
    if mz.is_empty() {
        wtr.write_record(["m/z", "intensity"])?;
    }
    for (&mz, &intensity) in mz.iter().zip(intensity.iter()) {
        wtr.serialize(SpectrumRow { mz, intensity })?;
    }
    wtr.flush()?;
    Ok(mz.len())
}

pub fn write_spectrum_csv(
    path: impl AsRef<Path>,
    spectrum: &Spectrum,
    range: Option<&MzRange>,
) -> Result<usize> {
    let file = std::fs::File::create(path.as_ref())?;
    let n = write_spectrum_csv_to(file, spectrum, range)?;
    info!("Wrote {} points to {}", n, path.as_ref().display());
    Ok(n)
}

pub fn read_spectrum_csv_from<R: Read>(reader: R) -> Result<Spectrum> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);
    let mut mz = Vec::new();
    let mut intensity = Vec::new();
    for row in rdr.deserialize() {
        let row: SpectrumRow = row?;
        mz.push(row.mz);
        intensity.push(row.intensity);
    }
    debug!("Read {} points", mz.len());
    Ok(Spectrum::try_new(mz, intensity)?)
}

pub fn read_spectrum_csv(path: impl AsRef<Path>) -> Result<Spectrum> {
    let file = std::fs::File::open(path.as_ref())?;
    read_spectrum_csv_from(file)
}

/// One `key,value` row per metadata entry, no header.
///
/// Entries with an empty key or value are left out.
pub fn write_metadata_csv_to<W: Write>(writer: W, metadata: &Metadata) -> Result<usize> {
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .terminator(Terminator::CRLF)
        .from_writer(writer);
    let mut written = 0;
    for (key, value) in metadata.entries() {
        if key.is_empty() || value.is_empty() {
            continue;
        }
        wtr.write_record([key, value])?;
        written += 1;
    }
    wtr.flush()?;
    Ok(written)
}

pub fn write_metadata_csv(path: impl AsRef<Path>, metadata: &Metadata) -> Result<usize> {
    let file = std::fs::File::create(path.as_ref())?;
    let n = write_metadata_csv_to(file, metadata)?;
    info!("Wrote {} metadata entries to {}", n, path.as_ref().display());
    Ok(n)
}
