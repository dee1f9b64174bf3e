//! Typed configuration, lifecycle states and events for the grabber.
//!
//! This crate defines the profile consumed at initialization and the
//! messages a running pipeline reports to its supervisor.

mod config;
mod events;
mod state;
mod types;

pub use config::{ConfigError, GrabberConfig, DEFAULT_RETRIEVE_TIMEOUT};
pub use events::PipelineEvent;
pub use state::WorkerState;
pub use types::{
    AcquisitionMode, CameraOverride, DeviceId, InvalidDeviceLabel, MonitorPort,
    MonitorResolution, TriggerConfig,
};

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for events (pipeline -> supervisor).
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Creates a bounded event channel.
pub fn event_channel() -> (Sender<PipelineEvent>, Receiver<PipelineEvent>) {
    crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY)
}
