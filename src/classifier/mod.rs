//! Client side of the external units-prediction service

/// Training dataset serialization
pub mod dataset;
/// TCP client for train/predict requests
pub mod client;

pub use client::ClassifierClient;
pub use dataset::FeatureRow;
