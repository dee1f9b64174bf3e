//! Device discovery and identity assignment.

use std::collections::HashMap;

use tracing::{info, instrument};

use grabber_capture::{CameraDevice, DeviceDiscovery, DeviceInfo};
use grabber_ipc::{CameraOverride, DeviceId, GrabberConfig, MonitorPort};

use crate::error::DiscoveryError;

/// A registered device: validated identity, native handle and the
/// per-device entries of the profile.
pub struct DeviceDescriptor {
    /// Identity parsed from the device label.
    pub id: DeviceId,

    /// Metadata reported at discovery.
    pub info: DeviceInfo,

    /// Native handle, unopened.
    pub device: Box<dyn CameraDevice>,

    /// Exposure override matched by identity.
    pub overrides: Option<CameraOverride>,

    /// Monitor port matched by identity.
    pub monitor: Option<MonitorPort>,
}

impl std::fmt::Debug for DeviceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceDescriptor")
            .field("id", &self.id)
            .field("info", &self.info)
            .field("overrides", &self.overrides)
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

/// Turns discovered devices into registered descriptors.
pub struct DeviceRegistry;

impl DeviceRegistry {
    /// Enumerate devices and assign identities.
    ///
    /// Registration is all-or-nothing: an unparseable label or a duplicate
    /// identity fails the whole call and every handle found so far is
    /// released unopened.
    #[instrument(name = "discover_devices", skip_all)]
    pub fn discover(
        discovery: &dyn DeviceDiscovery,
        config: &GrabberConfig,
    ) -> Result<Vec<DeviceDescriptor>, DiscoveryError> {
        let found = discovery.enumerate()?;

        let mut seen: HashMap<DeviceId, String> = HashMap::with_capacity(found.len());
        let mut descriptors = Vec::with_capacity(found.len());

        for discovered in found {
            let info = discovered.info;
            let id: DeviceId = info
                .label
                .parse()
                .map_err(|source| DiscoveryError::InvalidIdentity {
                    serial: info.serial.clone(),
                    source,
                })?;

            if let Some(first) = seen.get(&id) {
                return Err(DiscoveryError::DuplicateIdentity {
                    id,
                    first: first.clone(),
                    second: info.serial,
                });
            }
            seen.insert(id, info.serial.clone());

            descriptors.push(DeviceDescriptor {
                id,
                overrides: config.camera_override(id).cloned(),
                monitor: config.monitor_port(id).cloned(),
                device: discovered.device,
                info,
            });
        }

        info!(count = descriptors.len(), "Discovered devices");
        for descriptor in &descriptors {
            info!(
                device = %descriptor.id,
                label = %descriptor.info.label,
                serial = %descriptor.info.serial,
                address = %descriptor.info.address,
                "Registered device"
            );
            if let Some(ref port) = descriptor.monitor {
                info!(
                    device = %descriptor.id,
                    width = port.resolution.width,
                    height = port.resolution.height,
                    "Monitor resolution"
                );
            }
        }

        Ok(descriptors)
    }
}
