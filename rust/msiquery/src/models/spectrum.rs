use std::sync::Arc;

use serde::{
    Deserialize,
    Serialize,
};

use crate::errors::DataProcessingError;
use crate::utils::{
    MzRange,
    binary_search_range_by_key,
};

/// One pixel's mass spectrum.
///
/// The m/z axis is behind an [`Arc`] because most transformations only
/// rescale intensities: a normalized or filtered spectrum shares the m/z
/// array of its source instead of copying it.
///
/// Both arrays always have the same length. Sortedness of the m/z array is
/// checked by [`Spectrum::validate`], processing steps flag spectra that
/// fail it instead of assuming it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSpectrum")]
pub struct Spectrum {
    mz: Arc<[f64]>,
    intensity: Vec<f64>,
}

#[derive(Deserialize)]
struct RawSpectrum {
    mz: Vec<f64>,
    intensity: Vec<f64>,
}

impl TryFrom<RawSpectrum> for Spectrum {
    type Error = DataProcessingError;

    fn try_from(value: RawSpectrum) -> Result<Self, Self::Error> {
        Spectrum::try_new(value.mz, value.intensity)
    }
}

impl Spectrum {
    /// ```
    /// use msiquery::Spectrum;
    ///
    /// let spec = Spectrum::try_new(vec![100.0, 101.0], vec![5.0, 10.0]).unwrap();
    /// assert_eq!(spec.len(), 2);
    /// assert!(Spectrum::try_new(vec![100.0], vec![]).is_err());
    /// ```
    pub fn try_new(
        mz: impl Into<Arc<[f64]>>,
        intensity: Vec<f64>,
    ) -> Result<Self, DataProcessingError> {
        let mz = mz.into();
        if mz.len() != intensity.len() {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: mz.len(),
                other: intensity.len(),
                context: "(m/z and intensity arrays of a spectrum)".into(),
            });
        }
        Ok(Self { mz, intensity })
    }

    pub fn empty() -> Self {
        Self {
            mz: Arc::from(Vec::new()),
            intensity: Vec::new(),
        }
    }

    pub fn mz(&self) -> &[f64] {
        &self.mz
    }

    pub fn intensity(&self) -> &[f64] {
        &self.intensity
    }

    /// Intensities can be rewritten in place, the m/z axis cannot.
    pub fn intensity_mut(&mut self) -> &mut [f64] {
        &mut self.intensity
    }

    pub fn len(&self) -> usize {
        self.mz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz.is_empty()
    }

    /// New spectrum over the same m/z axis.
    pub fn with_intensity(&self, intensity: Vec<f64>) -> Result<Self, DataProcessingError> {
        if intensity.len() != self.mz.len() {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: self.mz.len(),
                other: intensity.len(),
                context: "(replacement intensities)".into(),
            });
        }
        Ok(Self {
            mz: Arc::clone(&self.mz),
            intensity,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.mz.iter().copied().zip(self.intensity.iter().copied())
    }

    /// Total ion current, the plain sum of intensities.
    pub fn tic(&self) -> f64 {
        self.intensity.iter().sum()
    }

    pub fn nonzero_intensities(&self) -> impl Iterator<Item = f64> + '_ {
        self.intensity.iter().copied().filter(|x| *x != 0.0)
    }

    pub fn count_nonzero(&self) -> usize {
        self.intensity.iter().filter(|x| **x != 0.0).count()
    }

    /// Checks that every value is finite and that m/z never decreases.
    pub fn validate(&self) -> Result<(), DataProcessingError> {
        if self.mz.iter().chain(self.intensity.iter()).any(|x| !x.is_finite()) {
            return Err(DataProcessingError::ExpectedFiniteData {
                context: "(spectrum arrays)".into(),
            });
        }
        if let Some(position) = self.mz.windows(2).position(|w| w[1] < w[0]) {
            return Err(DataProcessingError::UnsortedMz {
                position: position + 1,
            });
        }
        Ok(())
    }

    /// Index range of the points whose m/z lies in the closed window.
    pub fn indices_in_range(&self, range: &MzRange) -> std::ops::Range<usize> {
        binary_search_range_by_key(&self.mz, range.start(), range.end(), |x| *x)
    }

    /// The (mz, intensity) slices inside `range`, or everything for `None`.
    pub fn slice_mz_range(&self, range: Option<&MzRange>) -> (&[f64], &[f64]) {
        match range {
            Some(range) => {
                let idx = self.indices_in_range(range);
                (&self.mz[idx.clone()], &self.intensity[idx])
            }
            None => (&self.mz, &self.intensity),
        }
    }
}
