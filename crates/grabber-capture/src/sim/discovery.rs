//! Discovery over simulated cameras.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, instrument};

use super::{SimDeviceSpec, SimProbe, SimulatedCamera};
use crate::device::DiscoveredDevice;
use crate::error::CaptureError;
use crate::{CameraDevice, CaptureResult, DeviceDiscovery};

/// Discovery that yields one [`SimulatedCamera`] per [`SimDeviceSpec`].
pub struct SimulatedDiscovery {
    specs: Vec<SimDeviceSpec>,
    failure: Option<String>,
    probes: Mutex<HashMap<String, SimProbe>>,
}

impl SimulatedDiscovery {
    /// Create a discovery over the given cameras.
    pub fn new(specs: impl IntoIterator<Item = SimDeviceSpec>) -> Self {
        Self {
            specs: specs.into_iter().collect(),
            failure: None,
            probes: Mutex::new(HashMap::new()),
        }
    }

    /// Create a discovery whose enumeration always fails.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            specs: Vec::new(),
            failure: Some(message.into()),
            probes: Mutex::new(HashMap::new()),
        }
    }

    /// Probe of the most recently enumerated camera with this label.
    pub fn probe(&self, label: &str) -> Option<SimProbe> {
        self.probes.lock().get(label).cloned()
    }
}

impl DeviceDiscovery for SimulatedDiscovery {
    #[instrument(name = "sim_enumerate", skip(self))]
    fn enumerate(&self) -> CaptureResult<Vec<DiscoveredDevice>> {
        if let Some(ref message) = self.failure {
            return Err(CaptureError::Discovery(message.clone()));
        }

        let mut probes = self.probes.lock();
        let devices: Vec<DiscoveredDevice> = self
            .specs
            .iter()
            .cloned()
            .map(|spec| {
                let camera = SimulatedCamera::new(spec);
                probes.insert(camera.info().label.clone(), camera.probe());
                DiscoveredDevice {
                    info: camera.info().clone(),
                    device: Box::new(camera),
                }
            })
            .collect();

        debug!(count = devices.len(), "Enumerated simulated cameras");
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumerate() {
        let discovery = SimulatedDiscovery::new([SimDeviceSpec::new("1"), SimDeviceSpec::new("2")]);
        let devices = discovery.enumerate().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].info.label, "1");
        assert_eq!(devices[1].info.serial, "SIM00000002");
        assert!(discovery.probe("2").is_some());
        assert!(discovery.probe("3").is_none());
    }

    #[test]
    fn test_failing_enumerate() {
        let discovery = SimulatedDiscovery::failing("no transport layer");
        assert!(matches!(
            discovery.enumerate(),
            Err(CaptureError::Discovery(_))
        ));
    }
}
