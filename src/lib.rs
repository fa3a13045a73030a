//! Filter Cache - An Adaptive Bloom-Filter Cache for Log-Structured Stores
//!
//! Every on-disk data segment carries a sequence of independent Bloom
//! filter units; this crate decides, under a fixed memory budget and a
//! shifting workload, how many units to keep enabled per segment so that
//! wasted disk reads are minimized. The hosting LSM engine wires its point
//! lookups, flushes and compactions into one [`AllocationEngine`] and
//! supplies the filter payloads behind the [`cache::FilterUnitSource`]
//! seam; an external classifier service generalizes the reference
//! allocation to new segments.
#![warn(missing_docs)]

// Core foundational modules
pub mod core;

// Main functional modules
pub mod alloc;
pub mod cache;
pub mod classifier;
pub mod engine;
pub mod executor;
pub mod heaps;
pub mod hotness;
pub mod system;
pub mod visits;

// Re-export commonly used items for convenience
pub use crate::core::{Config, Error, Result};
pub use engine::AllocationEngine;

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize tracing and the metrics registry for hosts that do not bring
/// their own subscriber
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Initializing {} v{}", NAME, VERSION);

    system::metrics::init_registry();

    Ok(())
}
