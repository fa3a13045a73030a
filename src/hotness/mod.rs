//! Workload hotness estimation over a dynamic set of key ranges

/// Reservoir-sampled key pool
pub mod samples;
/// Per-range EWMA hotness buckets
pub mod buckets;

pub use buckets::{BucketSnapshot, HeatBuckets};
pub use samples::SamplesPool;
