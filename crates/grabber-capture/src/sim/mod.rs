//! Simulated GigE backend.
//!
//! Each simulated camera follows a per-retrieval script, then repeats a
//! fallback step forever. Retrieval blocks like a real device: it waits one
//! frame interval (bounded by the timeout) and returns early with
//! [`CaptureError::NotGrabbing`](crate::CaptureError::NotGrabbing) when
//! acquisition is stopped from another thread.

mod camera;
mod discovery;

pub use camera::SimulatedCamera;
pub use discovery::SimulatedDiscovery;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::device::DeviceSettings;
use crate::frame::PixelFormat;

/// Outcome of one simulated retrieval.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimStep {
    /// Deliver a frame after one frame interval.
    #[default]
    Frame,

    /// Deliver a failed grab result after one frame interval.
    FrameError { code: u32, description: String },

    /// Produce nothing until the retrieval timeout expires.
    Timeout,

    /// Fail the retrieval immediately as if the device dropped off the network.
    Lost { message: String },
}

/// Description of one simulated camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimDeviceSpec {
    /// User-assigned label.
    pub label: String,

    #[serde(default)]
    pub serial: String,

    #[serde(default)]
    pub address: String,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default)]
    pub pixel_format: PixelFormat,

    /// Frame rate of the simulated sensor.
    #[serde(default = "default_fps")]
    pub fps: f64,

    /// Retrieval outcomes, consumed in order.
    #[serde(default)]
    pub script: Vec<SimStep>,

    /// Outcome once the script is exhausted.
    #[serde(default)]
    pub then: SimStep,

    /// Reject `open`.
    #[serde(default)]
    pub fail_open: bool,

    /// Reject `apply_settings`.
    #[serde(default)]
    pub fail_configure: bool,
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_fps() -> f64 {
    30.0
}

impl SimDeviceSpec {
    /// A healthy camera with the given label.
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            serial: format!("SIM{:0>8}", label),
            address: "127.0.0.1".to_string(),
            label,
            width: default_width(),
            height: default_height(),
            pixel_format: PixelFormat::default(),
            fps: default_fps(),
            script: Vec::new(),
            then: SimStep::Frame,
            fail_open: false,
            fail_configure: false,
        }
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_script(mut self, script: impl IntoIterator<Item = SimStep>) -> Self {
        self.script = script.into_iter().collect();
        self
    }

    pub fn then(mut self, step: SimStep) -> Self {
        self.then = step;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn failing_configure(mut self) -> Self {
        self.fail_configure = true;
        self
    }
}

#[derive(Debug, Default)]
struct DeviceFlags {
    open: bool,
    grabbing: bool,
}

/// State shared between a simulated camera, its stop handle and its probe.
#[derive(Debug, Default)]
struct SimShared {
    flags: Mutex<DeviceFlags>,
    wake: Condvar,
    opens: AtomicU64,
    closes: AtomicU64,
    stops: AtomicU64,
    frames: AtomicU64,
    frame_errors: AtomicU64,
    released: AtomicBool,
    settings: Mutex<Option<DeviceSettings>>,
}

/// Read-only view of a simulated camera, usable after the camera moved to
/// another thread or was dropped.
#[derive(Debug, Clone)]
pub struct SimProbe {
    shared: Arc<SimShared>,
}

impl SimProbe {
    pub fn is_open(&self) -> bool {
        self.shared.flags.lock().open
    }

    pub fn is_grabbing(&self) -> bool {
        self.shared.flags.lock().grabbing
    }

    pub fn open_count(&self) -> u64 {
        self.shared.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> u64 {
        self.shared.closes.load(Ordering::SeqCst)
    }

    /// Number of stop requests, from either the owner or a stop handle.
    pub fn stop_count(&self) -> u64 {
        self.shared.stops.load(Ordering::SeqCst)
    }

    pub fn frames_delivered(&self) -> u64 {
        self.shared.frames.load(Ordering::SeqCst)
    }

    pub fn frame_errors_delivered(&self) -> u64 {
        self.shared.frame_errors.load(Ordering::SeqCst)
    }

    /// True once the native handle has been dropped.
    pub fn is_released(&self) -> bool {
        self.shared.released.load(Ordering::SeqCst)
    }

    /// Settings most recently applied.
    pub fn applied_settings(&self) -> Option<DeviceSettings> {
        self.shared.settings.lock().clone()
    }
}
