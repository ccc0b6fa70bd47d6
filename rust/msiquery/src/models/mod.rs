pub mod base;
mod coordinate;
mod dataset;
mod metadata;
mod pipeline;
mod spectrum;

pub use base::{
    Array2D,
    IonImage,
};
pub use coordinate::Coordinate;
pub use dataset::Dataset;
pub use metadata::{
    MAX_PIXELS_X_KEY,
    MAX_PIXELS_Y_KEY,
    Metadata,
    PixelExtents,
};
pub use pipeline::{
    ProcessingState,
    ProcessingStep,
};
pub use spectrum::Spectrum;
