//! Error Handling Module
//!
//! Defines the error type shared by model construction, registry loading and
//! inference. Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for cropscan operations
#[derive(Error, Debug)]
pub enum CropScanError {
    /// Uploaded bytes could not be decoded as an image
    #[error("Failed to decode image: {0}")]
    ImageDecode(String),

    /// Architecture descriptor is malformed or inconsistent
    #[error("Invalid architecture descriptor: {0}")]
    Descriptor(String),

    /// Weight file is missing
    #[error("Weight file not found: {0}")]
    WeightsNotFound(PathBuf),

    /// Weight file could not be read into the network
    #[error("Failed to load weights from '{path}': {reason}")]
    WeightsLoad { path: PathBuf, reason: String },

    /// Loaded weights do not fit the constructed topology
    #[error("Shape mismatch in layer '{layer}': expected {expected:?}, received {received:?}")]
    ShapeMismatch {
        layer: String,
        expected: Vec<usize>,
        received: Vec<usize>,
    },

    /// Loaded network has a different layer layout than the constructed one
    #[error("Layer layout mismatch: expected {expected} parameterised layers, received {received}")]
    LayerCount { expected: usize, received: usize },

    /// No crop model could be loaded at startup
    #[error("No models were loaded successfully from '{0}'")]
    NoModelsLoaded(PathBuf),

    /// Error during the forward pass
    #[error("Inference error: {0}")]
    Inference(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience Result type for cropscan operations
pub type Result<T> = std::result::Result<T, CropScanError>;
