//! Grabber profile: the configuration surface consumed at initialization.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AcquisitionMode, CameraOverride, DeviceId, MonitorPort, TriggerConfig};

/// Configuration for one grabber run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrabberConfig {
    /// Component name, used as the prefix of monitor topics.
    #[serde(default = "default_name")]
    pub name: String,

    /// Publish full-fidelity frames on the stream channel.
    #[serde(default)]
    pub use_image_stream: bool,

    /// Publish downsampled frames on the monitor channel.
    #[serde(default)]
    pub use_image_stream_monitoring: bool,

    /// Device acquisition mode.
    #[serde(default)]
    pub acquisition_mode: AcquisitionMode,

    /// Target frame rate.
    #[serde(default = "default_acquisition_fps")]
    pub acquisition_fps: f64,

    /// Trigger wiring.
    #[serde(flatten)]
    pub trigger: TriggerConfig,

    /// Device liveness timeout in milliseconds.
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_timeout: u64,

    /// Upper bound on a single blocking frame retrieval, in milliseconds.
    #[serde(default = "default_retrieve_timeout_ms")]
    pub retrieve_timeout_ms: u64,

    /// JPEG quality for both channels (1-100).
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Per-device overrides.
    #[serde(default)]
    pub cameras: Vec<CameraOverride>,

    /// Per-device monitor ports.
    #[serde(default)]
    pub monitors: Vec<MonitorPort>,
}

fn default_name() -> String {
    "camera_grabber".to_string()
}

fn default_acquisition_fps() -> f64 {
    30.0
}

/// Default bound on a single blocking retrieval.
pub const DEFAULT_RETRIEVE_TIMEOUT: Duration = Duration::from_millis(5000);

fn default_heartbeat_ms() -> u64 {
    5000
}

fn default_retrieve_timeout_ms() -> u64 {
    DEFAULT_RETRIEVE_TIMEOUT.as_millis() as u64
}

fn default_jpeg_quality() -> u8 {
    90
}

impl Default for GrabberConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            use_image_stream: false,
            use_image_stream_monitoring: false,
            acquisition_mode: AcquisitionMode::default(),
            acquisition_fps: default_acquisition_fps(),
            trigger: TriggerConfig::default(),
            heartbeat_timeout: default_heartbeat_ms(),
            retrieve_timeout_ms: default_retrieve_timeout_ms(),
            jpeg_quality: default_jpeg_quality(),
            cameras: Vec::new(),
            monitors: Vec::new(),
        }
    }
}

impl GrabberConfig {
    /// Load and validate a profile from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::parse(&contents)
    }

    /// Parse and validate a profile from a JSON string.
    pub fn parse(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check field ranges and uniqueness constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Validation("name must not be empty".into()));
        }
        if !(self.acquisition_fps.is_finite() && self.acquisition_fps > 0.0) {
            return Err(ConfigError::Validation(format!(
                "acquisition_fps must be positive, got {}",
                self.acquisition_fps
            )));
        }
        if self.heartbeat_timeout == 0 {
            return Err(ConfigError::Validation(
                "heartbeat_timeout must be positive".into(),
            ));
        }
        if self.retrieve_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "retrieve_timeout_ms must be positive".into(),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::Validation(format!(
                "jpeg_quality must be within 1-100, got {}",
                self.jpeg_quality
            )));
        }

        let mut seen = HashSet::new();
        for camera in &self.cameras {
            if !seen.insert(camera.id) {
                return Err(ConfigError::Validation(format!(
                    "camera #{} is configured more than once",
                    camera.id
                )));
            }
            if !(camera.exposure_time.is_finite() && camera.exposure_time > 0.0) {
                return Err(ConfigError::Validation(format!(
                    "camera #{} exposure_time must be positive",
                    camera.id
                )));
            }
        }

        let mut seen = HashSet::new();
        for port in &self.monitors {
            if !seen.insert(port.id) {
                return Err(ConfigError::Validation(format!(
                    "monitor port for camera #{} is declared more than once",
                    port.id
                )));
            }
            if port.resolution.width == 0 || port.resolution.height == 0 {
                return Err(ConfigError::Validation(format!(
                    "monitor resolution for camera #{} must be non-zero",
                    port.id
                )));
            }
        }

        Ok(())
    }

    /// Retrieval timeout as a duration.
    pub fn retrieve_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieve_timeout_ms)
    }

    /// Find the override entry for a device.
    pub fn camera_override(&self, id: DeviceId) -> Option<&CameraOverride> {
        self.cameras.iter().find(|c| c.id == id)
    }

    /// Find the monitor port declared for a device.
    pub fn monitor_port(&self, id: DeviceId) -> Option<&MonitorPort> {
        self.monitors.iter().find(|m| m.id == id)
    }

    /// Topic string for a device's monitor channel.
    pub fn monitor_topic(&self, id: DeviceId) -> String {
        format!("{}/image_stream_monitor_{}", self.name, id)
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Validation error: {0}")]
    Validation(String),
}
