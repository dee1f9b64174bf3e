//! Output message shapes.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use grabber_ipc::DeviceId;

use crate::error::TransportError;
use crate::TransportResult;

/// Logical output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Full-fidelity encoded frames.
    Stream,

    /// Downsampled encoded frames for live preview.
    Monitor,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream => f.write_str("stream"),
            Self::Monitor => f.write_str("monitor"),
        }
    }
}

/// Stream channel message: `[identity, frame]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    /// Source device.
    pub device: DeviceId,

    /// Encoded frame.
    pub payload: Bytes,
}

impl StreamMessage {
    pub fn new(device: DeviceId, payload: Bytes) -> Self {
        Self { device, payload }
    }

    /// Multipart wire form.
    pub fn into_parts(self) -> Vec<Bytes> {
        vec![Bytes::from(self.device.to_string()), self.payload]
    }

    /// Parse the multipart wire form.
    pub fn from_parts(parts: &[Bytes]) -> TransportResult<Self> {
        match parts {
            [device, payload] => Ok(Self {
                device: parse_device(Channel::Stream, device)?,
                payload: payload.clone(),
            }),
            _ => Err(TransportError::Malformed {
                channel: Channel::Stream,
                reason: format!("expected 2 parts, got {}", parts.len()),
            }),
        }
    }
}

/// Monitor channel message: `[topic, identity, frame]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorMessage {
    /// Subscription topic.
    pub topic: String,

    /// Source device.
    pub device: DeviceId,

    /// Encoded, downsampled frame.
    pub payload: Bytes,
}

impl MonitorMessage {
    pub fn new(topic: impl Into<String>, device: DeviceId, payload: Bytes) -> Self {
        Self {
            topic: topic.into(),
            device,
            payload,
        }
    }

    /// Multipart wire form.
    pub fn into_parts(self) -> Vec<Bytes> {
        vec![
            Bytes::from(self.topic),
            Bytes::from(self.device.to_string()),
            self.payload,
        ]
    }

    /// Parse the multipart wire form.
    pub fn from_parts(parts: &[Bytes]) -> TransportResult<Self> {
        match parts {
            [topic, device, payload] => Ok(Self {
                topic: String::from_utf8(topic.to_vec()).map_err(|_| {
                    TransportError::Malformed {
                        channel: Channel::Monitor,
                        reason: "topic is not UTF-8".into(),
                    }
                })?,
                device: parse_device(Channel::Monitor, device)?,
                payload: payload.clone(),
            }),
            _ => Err(TransportError::Malformed {
                channel: Channel::Monitor,
                reason: format!("expected 3 parts, got {}", parts.len()),
            }),
        }
    }
}

fn parse_device(channel: Channel, part: &Bytes) -> TransportResult<DeviceId> {
    std::str::from_utf8(part)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| TransportError::Malformed {
            channel,
            reason: "device identity is not an integer".into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_wire_shape() {
        let parts = StreamMessage::new(DeviceId::new(12), Bytes::from_static(b"\xFF\xD8"))
            .into_parts();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].as_ref(), b"12");
        assert_eq!(parts[1].as_ref(), b"\xFF\xD8");

        let back = StreamMessage::from_parts(&parts).unwrap();
        assert_eq!(back.device, DeviceId::new(12));
    }

    #[test]
    fn test_monitor_wire_shape() {
        let parts = MonitorMessage::new(
            "grabber/image_stream_monitor_3",
            DeviceId::new(3),
            Bytes::from_static(b"jpg"),
        )
        .into_parts();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].as_ref(), b"grabber/image_stream_monitor_3");
        assert_eq!(parts[1].as_ref(), b"3");
        assert_eq!(parts[2].as_ref(), b"jpg");
    }

    #[test]
    fn test_from_parts_rejects_bad_shapes() {
        let one = [Bytes::from_static(b"1")];
        assert!(matches!(
            StreamMessage::from_parts(&one),
            Err(TransportError::Malformed { .. })
        ));

        let bad_id = [
            Bytes::from_static(b"topic"),
            Bytes::from_static(b"cam"),
            Bytes::new(),
        ];
        assert!(matches!(
            MonitorMessage::from_parts(&bad_id),
            Err(TransportError::Malformed {
                channel: Channel::Monitor,
                ..
            })
        ));
    }
}
