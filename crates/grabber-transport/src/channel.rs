//! In-process sink backed by bounded crossbeam channels.

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::error::TransportError;
use crate::message::{Channel, MonitorMessage, StreamMessage};
use crate::{PublishSink, TransportResult};

/// Sink that hands messages to in-process consumers.
///
/// A full channel means the consumer is behind; the message is refused
/// rather than queued further.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    stream_tx: Sender<StreamMessage>,
    monitor_tx: Sender<MonitorMessage>,
}

/// Consumer ends of a [`ChannelSink`].
#[derive(Debug, Clone)]
pub struct SinkReceivers {
    pub stream: Receiver<StreamMessage>,
    pub monitor: Receiver<MonitorMessage>,
}

impl ChannelSink {
    /// Create a sink whose channels each buffer up to `capacity` messages.
    pub fn bounded(capacity: usize) -> (Self, SinkReceivers) {
        let (stream_tx, stream_rx) = crossbeam_channel::bounded(capacity);
        let (monitor_tx, monitor_rx) = crossbeam_channel::bounded(capacity);
        (
            Self {
                stream_tx,
                monitor_tx,
            },
            SinkReceivers {
                stream: stream_rx,
                monitor: monitor_rx,
            },
        )
    }
}

fn map_send_error<T>(channel: Channel, err: TrySendError<T>) -> TransportError {
    match err {
        TrySendError::Full(_) => TransportError::NotReady(channel),
        TrySendError::Disconnected(_) => TransportError::ChannelDisconnected(channel),
    }
}

impl PublishSink for ChannelSink {
    fn publish_stream(&self, message: StreamMessage) -> TransportResult<()> {
        self.stream_tx
            .try_send(message)
            .map_err(|e| map_send_error(Channel::Stream, e))
    }

    fn publish_monitor(&self, message: MonitorMessage) -> TransportResult<()> {
        self.monitor_tx
            .try_send(message)
            .map_err(|e| map_send_error(Channel::Monitor, e))
    }
}
