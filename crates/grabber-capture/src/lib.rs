//! Camera device contract and discovery.
//!
//! Vendor SDKs sit behind [`CameraDevice`] and [`DeviceDiscovery`]. The
//! [`sim`] module provides a scriptable in-process backend with the same
//! blocking-retrieval semantics as a GigE camera.

mod device;
mod error;
mod frame;
pub mod sim;

pub use device::{DeviceInfo, DeviceSettings, DiscoveredDevice, GrabResult};
pub use error::CaptureError;
pub use frame::{CaptureTimestamp, Frame, PixelFormat};

use std::sync::Arc;
use std::time::Duration;

/// Result type for capture operations.
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Native handle of one camera.
///
/// A handle is owned by exactly one capture worker from open to close.
/// The only operation another thread may perform is stopping acquisition,
/// through the [`AcquisitionStop`] handle.
pub trait CameraDevice: Send {
    /// Metadata reported at discovery.
    fn info(&self) -> &DeviceInfo;

    /// Open the device.
    fn open(&mut self) -> CaptureResult<()>;

    /// Check if the device is open.
    fn is_open(&self) -> bool;

    /// Write acquisition settings.
    fn apply_settings(&mut self, settings: &DeviceSettings) -> CaptureResult<()>;

    /// Start acquisition. Results are pulled with [`CameraDevice::retrieve`].
    fn start_acquisition(&mut self) -> CaptureResult<()>;

    /// Check if acquisition is running.
    fn is_grabbing(&self) -> bool;

    /// Block until the next result arrives, acquisition stops, or `timeout` elapses.
    fn retrieve(&mut self, timeout: Duration) -> CaptureResult<GrabResult>;

    /// Stop acquisition. Idempotent.
    fn stop_acquisition(&mut self);

    /// Close the device. Idempotent.
    fn close(&mut self);

    /// Handle that stops acquisition from another thread.
    fn acquisition_stop(&self) -> Arc<dyn AcquisitionStop>;
}

/// Thread-safe handle that stops a device's acquisition.
///
/// Stopping makes a retrieval call blocked on the device return promptly
/// with an error.
pub trait AcquisitionStop: Send + Sync {
    /// Stop acquisition. Idempotent.
    fn stop_acquisition(&self);
}

/// Enumerates reachable cameras.
pub trait DeviceDiscovery {
    /// List every reachable device.
    fn enumerate(&self) -> CaptureResult<Vec<DiscoveredDevice>>;
}
