//! Application profile: the grabber profile plus the device backend and
//! sink selection.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use grabber_capture::sim::SimDeviceSpec;
use grabber_ipc::GrabberConfig;
#[cfg(feature = "zmq")]
use grabber_transport::ZmqSinkConfig;

/// Full application profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Pipeline settings, at the top level of the file.
    #[serde(flatten)]
    pub grabber: GrabberConfig,

    /// Simulated cameras to discover.
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Publish over ZeroMQ instead of to in-process consumers.
    #[cfg(feature = "zmq")]
    #[serde(default)]
    pub zmq: Option<ZmqSinkConfig>,
}

/// Simulated backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub devices: Vec<SimDeviceSpec>,
}

impl AppConfig {
    /// Load and validate a profile.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Invalid profile {}", path.display()))
    }

    /// Parse and validate a profile.
    pub fn parse(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.grabber.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use grabber_capture::sim::SimStep;

    use super::*;

    #[test]
    fn test_parse_profile_with_devices() {
        let json = r#"{
            "name": "line_3",
            "use_image_stream": true,
            "trigger_mode": "On",
            "monitors": [ { "id": 1, "width": 320, "height": 240 } ],
            "simulation": {
                "devices": [
                    { "label": "1" },
                    { "label": "2", "fps": 10, "script": [ { "kind": "timeout" } ] }
                ]
            }
        }"#;

        let config = AppConfig::parse(json).unwrap();
        assert_eq!(config.grabber.name, "line_3");
        assert!(config.grabber.use_image_stream);
        assert_eq!(config.grabber.trigger.mode, "On");
        assert_eq!(config.grabber.monitors.len(), 1);
        assert_eq!(config.simulation.devices.len(), 2);
        assert_eq!(config.simulation.devices[1].script, [SimStep::Timeout]);
    }

    #[test]
    fn test_demo_profile() {
        let config = AppConfig::parse(include_str!("../profiles/demo.json")).unwrap();
        assert_eq!(config.simulation.devices.len(), 3);
        let port = config
            .grabber
            .monitor_port(grabber_ipc::DeviceId::new(2))
            .unwrap();
        assert_eq!(port.resolution.width, 640);
    }

    #[test]
    fn test_invalid_profile_rejected() {
        assert!(AppConfig::parse(r#"{ "acquisition_fps": -1 }"#).is_err());
        assert!(AppConfig::parse("[]").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "simulation": {{ "devices": [ {{ "label": "4" }} ] }} }}"#).unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.simulation.devices[0].label, "4");
        assert!(!config.grabber.use_image_stream);

        assert!(AppConfig::from_file("/nonexistent/profile.json").is_err());
    }
}
