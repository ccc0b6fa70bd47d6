pub mod centroiding;
pub mod intensity_filter;
pub mod ion_image;
pub mod mode;
pub mod normalization;

pub use centroiding::{
    CentroidingSummary,
    ProfileCentroider,
    centroid_spectra,
};
pub use intensity_filter::{
    FilterOutcome,
    dataset_percentile,
    validate_percentile,
};
pub use ion_image::{
    IonImageQuery,
    IonReducer,
    extract_ion_image,
};
pub use mode::{
    SpectrumMode,
    detect_mode,
};
pub use normalization::{
    DEFAULT_REFERENCE_MZ,
    DEFAULT_REFERENCE_TOLERANCE,
    NormalizationMethod,
    NormalizationSummary,
    normalize_spectra,
};
