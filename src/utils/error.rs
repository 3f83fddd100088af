//! Error Handling Module
//!
//! Defines the error type shared by the model, artifact, dataset, training
//! and inference code. Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for tomato disease classification
#[derive(Error, Debug)]
pub enum TomatoError {
    /// The uploaded bytes could not be decoded as an image
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Error loading or processing an image file from disk
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// The serialized model artifact is missing, malformed or incompatible
    #[error("Artifact error: {0}")]
    Artifact(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error with training
    #[error("Training error: {0}")]
    Training(String),

    /// Error with inference
    #[error("Inference error: {0}")]
    Inference(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for TomatoError {
    fn from(err: serde_json::Error) -> Self {
        TomatoError::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for TomatoError {
    fn from(err: image::ImageError) -> Self {
        TomatoError::InvalidImage(err.to_string())
    }
}

/// Convenience Result type
pub type Result<T> = std::result::Result<T, TomatoError>;
