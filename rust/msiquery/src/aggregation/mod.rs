//! Mean and summed spectra across many spectra.
//!
//! Aggregation is a group-by-sum over `(rounded m/z, intensity)` pairs.
//! Spectra are split in fixed-size batches, each batch is reduced to a
//! sorted partial aggregate and the partials are merged in batch order.

pub mod buckets;
pub mod config;
pub mod engine;
pub mod job;
pub mod sampled;

pub use buckets::{
    MzBucketer,
    PartialAggregate,
    merge_spectra,
};
pub use config::{
    AggregationConfig,
    AggregationMode,
};
pub use engine::{
    AggregationStats,
    CancellationToken,
    Selection,
    aggregate_batched,
    aggregate_sequential,
};
pub use job::{
    AggregationJob,
    AggregationOutput,
};
pub use sampled::sample_mean_spectrum;
