//! Error types for the encoder module.

use thiserror::Error;

/// Errors that can occur during encoding operations.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// Invalid input data.
    #[error("Invalid input data: {0}")]
    InvalidInput(String),

    /// Invalid target resolution.
    #[error("Invalid target resolution {width}x{height}")]
    InvalidResolution { width: u32, height: u32 },

    /// Invalid encoder configuration.
    #[error("Invalid encoder configuration: {0}")]
    InvalidConfig(String),

    /// General encoding error.
    #[error("Encoding error: {0}")]
    Encoding(String),
}
