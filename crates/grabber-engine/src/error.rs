//! Error types for the engine.

use thiserror::Error;

use grabber_capture::CaptureError;
use grabber_encoder::EncoderError;
use grabber_ipc::{ConfigError, DeviceId, InvalidDeviceLabel};
use grabber_transport::TransportError;

/// Errors that can occur while discovering and registering devices.
///
/// Any of these aborts registration as a whole.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The discovery service itself failed.
    #[error("Device enumeration failed: {0}")]
    Enumerate(#[from] CaptureError),

    /// A device label does not parse as an identity.
    #[error("Device {serial} has an invalid identity: {source}")]
    InvalidIdentity {
        serial: String,
        #[source]
        source: InvalidDeviceLabel,
    },

    /// Two devices carry the same identity.
    #[error("Duplicate device identity {id} (serials {first} and {second})")]
    DuplicateIdentity {
        id: DeviceId,
        first: String,
        second: String,
    },
}

/// Errors that abort pipeline initialization.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The profile failed validation.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Device discovery or registration failed.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// The frame encoder could not be created.
    #[error("Encoder initialization failed: {0}")]
    Encoder(#[from] EncoderError),

    /// The publish sink could not set up the registered devices.
    #[error("Publish sink setup failed: {0}")]
    Sink(#[from] TransportError),

    /// The OS refused to start a worker thread.
    #[error("Failed to spawn worker for device {device}: {source}")]
    Spawn {
        device: DeviceId,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Returns true if the failure stems from the profile or from device
    /// identities rather than from the environment.
    pub fn is_configuration_error(&self) -> bool {
        match self {
            Self::Config(_) | Self::Encoder(EncoderError::InvalidConfig(_)) => true,
            Self::Discovery(err) => !matches!(err, DiscoveryError::Enumerate(_)),
            Self::Encoder(_) | Self::Sink(_) | Self::Spawn { .. } => false,
        }
    }
}
