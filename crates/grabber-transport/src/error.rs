//! Error types for the transport module.

use thiserror::Error;

use crate::message::Channel;

/// Errors that can occur while publishing.
///
/// None of these are fatal to a capture worker; the frame is dropped.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The channel cannot take a message right now.
    #[error("{0} channel is not ready")]
    NotReady(Channel),

    /// No consumer is attached to the channel anymore.
    #[error("{0} channel disconnected")]
    ChannelDisconnected(Channel),

    /// The channel is not configured on this sink.
    #[error("{0} channel is not configured")]
    NotConfigured(Channel),

    /// A received message does not have the expected shape.
    #[error("Malformed {channel} message: {reason}")]
    Malformed { channel: Channel, reason: String },

    /// An endpoint template cannot yield one endpoint per device.
    #[error("Endpoint template {0:?} has no {{id}} placeholder")]
    InvalidEndpoint(String),

    /// Per-device resources were already set up.
    #[error("Sink is already attached to a device set")]
    AlreadyAttached,

    /// ZeroMQ error.
    #[cfg(feature = "zmq")]
    #[error("ZeroMQ error: {0}")]
    Zmq(#[from] zmq::Error),
}
