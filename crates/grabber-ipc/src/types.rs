//! Common types shared across the grabber crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stable integer identity of a camera.
///
/// Derived from the user-assigned label stored on the device, so it survives
/// re-enumeration and network address changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(u32);

impl DeviceId {
    /// Create an identity from a raw value.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw identity value.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a device label is not a non-negative integer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("device label {label:?} is not a non-negative integer")]
pub struct InvalidDeviceLabel {
    pub label: String,
}

impl FromStr for DeviceId {
    type Err = InvalidDeviceLabel;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        label
            .trim()
            .parse::<u32>()
            .map(Self)
            .map_err(|_| InvalidDeviceLabel {
                label: label.to_string(),
            })
    }
}

/// Device acquisition mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionMode {
    /// Free-running or triggered acquisition until stopped.
    #[default]
    Continuous,

    /// A single frame per acquisition start.
    SingleFrame,

    /// A fixed burst of frames per acquisition start.
    MultiFrame,
}

impl AcquisitionMode {
    /// Returns the device-facing name of this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Continuous => "Continuous",
            Self::SingleFrame => "SingleFrame",
            Self::MultiFrame => "MultiFrame",
        }
    }
}

impl fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trigger wiring applied to every device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Which acquisition event the trigger controls.
    #[serde(rename = "trigger_selector", default = "default_trigger_selector")]
    pub selector: String,

    /// Trigger on or off.
    #[serde(rename = "trigger_mode", default = "default_trigger_mode")]
    pub mode: String,

    /// Input line the trigger is wired to.
    #[serde(rename = "trigger_source", default = "default_trigger_source")]
    pub source: String,

    /// Signal edge or level that fires the trigger.
    #[serde(rename = "trigger_activation", default = "default_trigger_activation")]
    pub activation: String,
}

fn default_trigger_selector() -> String {
    "FrameStart".to_string()
}

fn default_trigger_mode() -> String {
    "Off".to_string()
}

fn default_trigger_source() -> String {
    "Line2".to_string()
}

fn default_trigger_activation() -> String {
    "RisingEdge".to_string()
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            selector: default_trigger_selector(),
            mode: default_trigger_mode(),
            source: default_trigger_source(),
            activation: default_trigger_activation(),
        }
    }
}

/// Per-device settings override, matched by identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraOverride {
    /// Identity of the device this override applies to.
    pub id: DeviceId,

    /// Exposure time in microseconds.
    #[serde(default = "default_exposure_time")]
    pub exposure_time: f64,
}

fn default_exposure_time() -> f64 {
    100.0
}

/// Target resolution of the monitor stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorResolution {
    /// Width in pixels.
    #[serde(default = "default_monitor_width")]
    pub width: u32,

    /// Height in pixels.
    #[serde(default = "default_monitor_height")]
    pub height: u32,
}

fn default_monitor_width() -> u32 {
    640
}

fn default_monitor_height() -> u32 {
    480
}

impl Default for MonitorResolution {
    fn default() -> Self {
        Self {
            width: default_monitor_width(),
            height: default_monitor_height(),
        }
    }
}

/// Monitor port declared for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorPort {
    /// Identity of the device publishing on this port.
    pub id: DeviceId,

    /// Downsample target.
    #[serde(flatten)]
    pub resolution: MonitorResolution,
}
