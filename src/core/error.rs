//! Error types and handling for the filter cache engine
//!
//! Hot paths never surface classifier or dataset failures; background tasks
//! log them and fall back (see the engine module). The variants here cover
//! everything that can cross a public API boundary.

use thiserror::Error;

/// Main result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the filter cache engine
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Classifier service communication errors
    #[error("Classifier error: {0}")]
    Classifier(String),

    /// Training dataset write or read-back errors
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Invalid caller-supplied arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors from std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a classifier error
    pub fn classifier(msg: impl Into<String>) -> Self {
        Error::Classifier(msg.into())
    }

    /// Create a dataset error
    pub fn dataset(msg: impl Into<String>) -> Self {
        Error::Dataset(msg.into())
    }

    /// Create an invalid-input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }
}
