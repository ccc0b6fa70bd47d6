use rayon::prelude::*;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::{
    debug,
    instrument,
    warn,
};

use crate::errors::{
    MsiQueryError,
    Result,
};
use crate::models::{
    Coordinate,
    IonImage,
    PixelExtents,
    Spectrum,
};
use crate::utils::abs_tol_range;

/// How the intensities inside the m/z window become one pixel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IonReducer {
    #[default]
    Sum,
    Max,
    Mean,
}

impl IonReducer {
    /// Empty windows reduce to 0 for every reducer.
    pub fn reduce(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        match self {
            IonReducer::Sum => values.iter().sum(),
            IonReducer::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            IonReducer::Mean => values.iter().sum::<f64>() / values.len() as f64,
        }
    }
}

fn default_z() -> i32 {
    1
}

/// One ion image request.
///
/// Every point with `mz - |tolerance| <= x <= mz + |tolerance|` counts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IonImageQuery {
    pub mz: f64,
    pub tolerance: f64,
    #[serde(default = "default_z")]
    pub z: i32,
    #[serde(default)]
    pub reducer: IonReducer,
}

impl Default for IonImageQuery {
    fn default() -> Self {
        Self {
            mz: 0.0,
            tolerance: 0.1,
            z: 1,
            reducer: IonReducer::Sum,
        }
    }
}

impl IonImageQuery {
    pub fn new(mz: f64, tolerance: f64) -> Self {
        Self {
            mz,
            tolerance,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.mz.is_finite() {
            return Err(MsiQueryError::invalid(
                "mz",
                self.mz,
                "must be a finite number",
            ));
        }
        if !self.tolerance.is_finite() {
            return Err(MsiQueryError::invalid(
                "tolerance",
                self.tolerance,
                "must be a finite number",
            ));
        }
        Ok(())
    }
}

/// Builds a `height x width` image where pixel `(x, y)` holds the reduced
/// intensity of the spectrum at that coordinate around the query m/z.
///
/// Only spectra on plane `query.z` are drawn, pixels without a spectrum
/// stay 0. Each spectrum costs two binary searches into its m/z array.
///
/// A coordinate outside the declared extents means the metadata does not
/// describe this dataset, that is reported as
/// [`MsiQueryError::MetadataIntegrity`] and no image is returned.
#[instrument(skip_all, fields(mz = query.mz, tolerance = query.tolerance))]
pub fn extract_ion_image(
    spectra: &[Spectrum],
    coordinates: &[Coordinate],
    extents: PixelExtents,
    query: &IonImageQuery,
) -> Result<IonImage> {
    query.validate()?;
    let Some(range) = abs_tol_range(query.mz, query.tolerance) else {
        return Err(MsiQueryError::invalid(
            "mz",
            query.mz,
            "does not define an m/z window",
        ));
    };

    if coordinates.iter().any(|c| c.z == 0) {
        warn!(
            "z coordinate = 0 present, if you're getting blank images set the ion image z to 0"
        );
    }

    let mut image = IonImage::new_filled(0.0, extents.height, extents.width);

    // Bisection is meaningless on unsorted m/z, those pixels are left at 0
    let pixels: Vec<(Coordinate, Option<f64>)> = spectra
        .par_iter()
        .zip(coordinates.par_iter())
        .filter(|(_, coord)| coord.z == query.z)
        .map(|(spectrum, coord)| {
            if spectrum.validate().is_err() {
                return (*coord, None);
            }
            let idx = spectrum.indices_in_range(&range);
            (*coord, Some(query.reducer.reduce(&spectrum.intensity()[idx])))
        })
        .collect();

    let flagged = pixels.iter().filter(|(_, value)| value.is_none()).count();
    if flagged > 0 {
        warn!(
            "{} spectra with unsorted or non-finite data left blank in the ion image",
            flagged
        );
    }

    for (coord, value) in pixels {
        let value = value.unwrap_or(0.0);
        let inserted = pixel_position(coord)
            .and_then(|(row, col)| image.try_insert(row, col, value));
        if inserted.is_none() {
            return Err(MsiQueryError::MetadataIntegrity {
                x: coord.x,
                y: coord.y,
                width: extents.width,
                height: extents.height,
            });
        }
    }

    debug!("Ion image with {} non-zero pixels", image.count_nonzero());
    Ok(image)
}

// 1-indexed coordinates to (row, col)
fn pixel_position(coord: Coordinate) -> Option<(usize, usize)> {
    let row = usize::try_from(coord.y).ok()?.checked_sub(1)?;
    let col = usize::try_from(coord.x).ok()?.checked_sub(1)?;
    Some((row, col))
}
