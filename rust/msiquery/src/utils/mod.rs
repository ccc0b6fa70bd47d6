pub mod ranges;
pub mod stats;

pub use ranges::{
    MzRange,
    TupleRange,
    abs_tol_range,
    binary_search_range_by_key,
};
