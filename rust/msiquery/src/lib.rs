#![doc = include_str!("../README.md")]

// Re-export main structures
pub use crate::models::{
    Array2D,
    Coordinate,
    Dataset,
    IonImage,
    Metadata,
    PixelExtents,
    ProcessingState,
    ProcessingStep,
    Spectrum,
};
pub use crate::processing::{
    IonImageQuery,
    IonReducer,
    NormalizationMethod,
    SpectrumMode,
};
pub use crate::aggregation::{
    AggregationConfig,
    AggregationJob,
    AggregationMode,
    CancellationToken,
    Selection,
};

// Re-export traits
pub use crate::traits::SpectrumSource;

// Declare modules
pub mod aggregation;
pub mod errors;
pub mod models;
pub mod processing;
pub mod serde;
pub mod traits;
pub mod utils;
pub use crate::utils::{
    MzRange,
    TupleRange,
};

// Re-export errors
pub use crate::errors::{
    DataProcessingError,
    MsiQueryError,
};
