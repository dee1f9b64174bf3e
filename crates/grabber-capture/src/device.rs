//! Device metadata, applied settings and retrieval results.

use grabber_ipc::{AcquisitionMode, CameraOverride, GrabberConfig, TriggerConfig};

use crate::frame::Frame;
use crate::CameraDevice;

/// Metadata reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// User-assigned label; parsed into the device identity.
    pub label: String,

    /// Serial number.
    pub serial: String,

    /// Network address.
    pub address: String,
}

/// A device found by discovery, not yet opened.
pub struct DiscoveredDevice {
    /// Reported metadata.
    pub info: DeviceInfo,

    /// Native handle.
    pub device: Box<dyn CameraDevice>,
}

impl std::fmt::Debug for DiscoveredDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveredDevice")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Settings written to a device before acquisition starts.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSettings {
    /// Acquisition mode.
    pub acquisition_mode: AcquisitionMode,

    /// Target frame rate.
    pub acquisition_fps: f64,

    /// Whether the device's frame-rate limiter is enabled.
    pub frame_rate_enable: bool,

    /// Trigger wiring.
    pub trigger: TriggerConfig,

    /// Liveness timeout in milliseconds.
    pub heartbeat_timeout_ms: u64,

    /// Manual exposure time in microseconds; auto exposure when absent.
    pub exposure_time: Option<f64>,
}

impl DeviceSettings {
    /// Build the settings for one device from the global profile and its override.
    pub fn from_config(config: &GrabberConfig, camera: Option<&CameraOverride>) -> Self {
        Self {
            acquisition_mode: config.acquisition_mode,
            acquisition_fps: config.acquisition_fps,
            frame_rate_enable: false,
            trigger: config.trigger.clone(),
            heartbeat_timeout_ms: config.heartbeat_timeout,
            exposure_time: camera.map(|c| c.exposure_time),
        }
    }
}

/// Outcome of one successful retrieval call.
#[derive(Debug, Clone)]
pub enum GrabResult {
    /// A complete frame.
    Frame(Frame),

    /// The device delivered a result but the grab itself failed
    /// (incomplete frame, buffer underrun). Not a transport failure.
    Failed { code: u32, description: String },
}
