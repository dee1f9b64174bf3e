//! Best-effort publish sinks.
//!
//! Capture workers publish encoded frames on two logical channels. Publishing
//! never blocks: when a channel cannot take a message the sink refuses it and
//! the caller drops the frame. There is no queueing beyond the sink's own
//! bounded buffer and no retry.

mod channel;
mod error;
mod message;
#[cfg(feature = "zmq")]
mod zmq_sink;

pub use channel::{ChannelSink, SinkReceivers};
pub use error::TransportError;
pub use message::{Channel, MonitorMessage, StreamMessage};
#[cfg(feature = "zmq")]
pub use zmq_sink::{ZmqSink, ZmqSinkConfig};

/// Default buffer per channel for in-process consumers.
pub const PUBLISH_CHANNEL_CAPACITY: usize = 8;

use grabber_ipc::DeviceId;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Non-blocking delivery of encoded frames.
pub trait PublishSink: Send + Sync {
    /// Set up per-device resources for the registered devices.
    ///
    /// Called once, after registration and before any worker starts.
    fn attach(&self, _devices: &[DeviceId]) -> TransportResult<()> {
        Ok(())
    }

    /// Offer a full-fidelity frame. Must return immediately.
    fn publish_stream(&self, message: StreamMessage) -> TransportResult<()>;

    /// Offer a downsampled frame. Must return immediately.
    fn publish_monitor(&self, message: MonitorMessage) -> TransportResult<()>;
}
