//! Error types for the capture module.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to a camera.
///
/// Every variant is scoped to a single device; none of them concerns
/// sibling devices.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Device enumeration failed.
    #[error("Device discovery failed: {0}")]
    Discovery(String),

    /// Device could not be opened.
    #[error("Failed to open device: {0}")]
    Open(String),

    /// A setting was rejected by the device.
    #[error("Failed to set {parameter}: {message}")]
    Configuration { parameter: String, message: String },

    /// Operation requires an open device.
    #[error("Device is not open")]
    NotOpen,

    /// Acquisition already started.
    #[error("Acquisition already started")]
    AlreadyStarted,

    /// Acquisition is not running, or was stopped while waiting.
    #[error("Device is not grabbing")]
    NotGrabbing,

    /// No result arrived within the retrieval timeout.
    #[error("No frame within {0:?}")]
    Timeout(Duration),

    /// Device lost during capture.
    #[error("Capture device lost: {0}")]
    DeviceLost(String),
}
