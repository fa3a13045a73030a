//! Core foundations of the filter cache engine
//!
//! This module contains the fundamental building blocks shared by every
//! component: error handling, configuration, constants and common types.

/// Error types and result handling
pub mod error;
/// Configuration management
pub mod config;
/// Canonical default values
pub mod constants;
/// Common identifier and descriptor types
pub mod types;

// Re-export commonly used items
pub use config::Config;
pub use error::{Error, Result};
pub use types::{KeySpan, Level, RangeId, RangeRatePair, SegmentId, UnitCount};
