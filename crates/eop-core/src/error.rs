//! Error types for eopic

use thiserror::Error;

/// eopic error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error (malformed map, weight table, or stored object)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing or inconsistent run configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Channel coordinate or index outside the detector grid
    #[error("Geometry error: {0}")]
    Geometry(String),

    /// Two maps that must share a grid do not
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Observation that cannot enter the accumulation (E or p not positive)
    #[error("Invalid observation: {0}")]
    InvalidObservation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
