//! ZeroMQ sink: one socket pair per device, multipart messages sent without
//! waiting.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use grabber_ipc::DeviceId;

use crate::error::TransportError;
use crate::message::{Channel, MonitorMessage, StreamMessage};
use crate::{PublishSink, TransportResult};

/// Placeholder replaced by the device identity in endpoint templates.
const DEVICE_PLACEHOLDER: &str = "{id}";

/// Endpoint templates for the ZeroMQ sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZmqSinkConfig {
    /// PUSH endpoint per device for the stream channel,
    /// e.g. `ipc:///tmp/grabber/image_stream_{id}`.
    pub stream_endpoint: Option<String>,

    /// PUB endpoint per device for the monitor channel,
    /// e.g. `ipc:///tmp/grabber/image_stream_monitor_{id}`.
    pub monitor_endpoint: Option<String>,

    /// Send high-water mark per socket.
    #[serde(default = "default_send_hwm")]
    pub send_hwm: i32,
}

fn default_send_hwm() -> i32 {
    2
}

/// Sockets owned by one device. Only that device's worker sends on them.
struct DeviceSockets {
    stream: Option<Mutex<zmq::Socket>>,
    monitor: Option<Mutex<zmq::Socket>>,
}

/// Sink that binds a PUSH socket (stream) and a PUB socket (monitor) for
/// every registered device.
pub struct ZmqSink {
    context: zmq::Context,
    config: ZmqSinkConfig,
    devices: OnceLock<BTreeMap<DeviceId, DeviceSockets>>,
}

impl ZmqSink {
    /// Check the endpoint templates. Sockets are bound in [`PublishSink::attach`].
    pub fn new(config: ZmqSinkConfig) -> TransportResult<Self> {
        let templates = [&config.stream_endpoint, &config.monitor_endpoint];
        for template in templates.into_iter().flatten() {
            if !template.contains(DEVICE_PLACEHOLDER) {
                return Err(TransportError::InvalidEndpoint(template.clone()));
            }
        }

        Ok(Self {
            context: zmq::Context::new(),
            config,
            devices: OnceLock::new(),
        })
    }

    fn socket(&self, device: DeviceId, channel: Channel) -> TransportResult<&Mutex<zmq::Socket>> {
        let sockets = self
            .devices
            .get()
            .and_then(|devices| devices.get(&device))
            .ok_or(TransportError::NotConfigured(channel))?;
        let socket = match channel {
            Channel::Stream => sockets.stream.as_ref(),
            Channel::Monitor => sockets.monitor.as_ref(),
        };
        socket.ok_or(TransportError::NotConfigured(channel))
    }

    fn bind_device(&self, device: DeviceId) -> TransportResult<DeviceSockets> {
        let bind = |template: &Option<String>, kind: zmq::SocketType| {
            template
                .as_deref()
                .map(|template| {
                    let endpoint = template.replace(DEVICE_PLACEHOLDER, &device.to_string());
                    bind_socket(&self.context, kind, &endpoint, self.config.send_hwm)
                        .map(Mutex::new)
                })
                .transpose()
        };

        Ok(DeviceSockets {
            stream: bind(&self.config.stream_endpoint, zmq::PUSH)?,
            monitor: bind(&self.config.monitor_endpoint, zmq::PUB)?,
        })
    }
}

fn bind_socket(
    context: &zmq::Context,
    kind: zmq::SocketType,
    endpoint: &str,
    send_hwm: i32,
) -> TransportResult<zmq::Socket> {
    let socket = context.socket(kind)?;
    socket.set_sndhwm(send_hwm)?;
    socket.set_linger(0)?;
    socket.bind(endpoint)?;
    info!(endpoint, ?kind, "Publish socket bound");
    Ok(socket)
}

fn send_parts(socket: &Mutex<zmq::Socket>, channel: Channel, parts: Vec<Bytes>) -> TransportResult<()> {
    socket
        .lock()
        .send_multipart(parts.iter().map(|part| &part[..]), zmq::DONTWAIT)
        .map_err(|e| match e {
            zmq::Error::EAGAIN => TransportError::NotReady(channel),
            other => TransportError::Zmq(other),
        })
}

impl PublishSink for ZmqSink {
    #[instrument(name = "zmq_sink_attach", skip_all, fields(devices = devices.len()))]
    fn attach(&self, devices: &[DeviceId]) -> TransportResult<()> {
        if self.devices.get().is_some() {
            return Err(TransportError::AlreadyAttached);
        }

        let mut sockets = BTreeMap::new();
        for &device in devices {
            sockets.insert(device, self.bind_device(device)?);
        }
        self.devices
            .set(sockets)
            .map_err(|_| TransportError::AlreadyAttached)
    }

    fn publish_stream(&self, message: StreamMessage) -> TransportResult<()> {
        let socket = self.socket(message.device, Channel::Stream)?;
        send_parts(socket, Channel::Stream, message.into_parts())
    }

    fn publish_monitor(&self, message: MonitorMessage) -> TransportResult<()> {
        let socket = self.socket(message.device, Channel::Monitor)?;
        send_parts(socket, Channel::Monitor, message.into_parts())
    }
}
