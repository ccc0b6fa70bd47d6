use thiserror::Error;

/// Faults found while processing the arrays of a single spectrum.
///
/// These never abort a whole-dataset run on their own: the processing
/// functions record the offending spectrum index and move on.
#[derive(Debug, Error)]
pub enum DataProcessingError {
    #[error("Expected slices of the same length, got {expected} and {other} {context}")]
    ExpectedSlicesSameLength {
        expected: usize,
        other: usize,
        context: String,
    },
    #[error("Expected non-empty data {}", .context.as_deref().unwrap_or(""))]
    ExpectedNonEmptyData { context: Option<String> },
    #[error("m/z values are not sorted, first inversion at position {position}")]
    UnsortedMz { position: usize },
    #[error("Expected finite, non-NaN data {context}")]
    ExpectedFiniteData { context: String },
}

impl DataProcessingError {
    pub fn append_to_context(mut self, context: &str) -> Self {
        match &mut self {
            DataProcessingError::ExpectedSlicesSameLength {
                context: owned_context,
                ..
            } => {
                owned_context.push_str(context);
            }
            DataProcessingError::ExpectedNonEmptyData {
                context: owned_context,
            } => match owned_context {
                Some(x) => x.push_str(context),
                None => *owned_context = Some(context.to_string()),
            },
            DataProcessingError::ExpectedFiniteData {
                context: owned_context,
            } => {
                owned_context.push_str(context);
            }
            DataProcessingError::UnsortedMz { .. } => {}
        }
        self
    }
}

#[derive(Debug, Error)]
pub enum MsiQueryError {
    /// The pixel extents declared by the metadata do not cover every
    /// coordinate of the dataset.
    #[error(
        "Metadata is incorrect: pixel (x={x}, y={y}) lies outside the declared {width}x{height} image"
    )]
    MetadataIntegrity {
        x: i32,
        y: i32,
        width: usize,
        height: usize,
    },

    #[error("Metadata does not declare the pixel extents ('max count of pixels x/y')")]
    MissingPixelExtents,

    #[error("Empty selection: {context}")]
    EmptySelection { context: String },

    #[error("Invalid value for '{name}': {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Aggregation was cancelled")]
    Cancelled,

    #[error(
        "Aggregation result was computed for processing generation {produced}, current generation is {current}"
    )]
    Stale { produced: u64, current: u64 },

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Data processing error: {0}")]
    DataProcessing(#[from] DataProcessingError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl MsiQueryError {
    pub(crate) fn invalid(
        name: &'static str,
        value: impl std::fmt::Display,
        reason: &'static str,
    ) -> Self {
        Self::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }
}

pub type Result<T> = std::result::Result<T, MsiQueryError>;
