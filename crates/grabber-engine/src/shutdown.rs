//! Ordered teardown of every worker and device.

use std::collections::BTreeMap;

use tracing::{debug, error, info, instrument};

use grabber_ipc::DeviceId;

use crate::worker::{RunFlags, WorkerHandle};

/// Outcome of a shutdown pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Worker threads joined, including those that panicked.
    pub joined: usize,

    /// Workers whose state machine panicked.
    pub panicked: usize,

    /// Devices the workers left open and the coordinator closed.
    pub closed_by_coordinator: usize,
}

/// Owns the worker arena and tears it down in order:
///
/// 1. stop acquisition on every device,
/// 2. raise the run flags,
/// 3. join every worker,
/// 4. close whatever is still open and release the handles.
///
/// Stopping first is what makes a worker parked in a blocking retrieval
/// return, so the joins are bounded.
pub struct ShutdownCoordinator {
    flags: RunFlags,
    workers: BTreeMap<DeviceId, WorkerHandle>,
}

impl ShutdownCoordinator {
    pub fn new(flags: RunFlags, workers: BTreeMap<DeviceId, WorkerHandle>) -> Self {
        Self { flags, workers }
    }

    /// Number of workers not yet joined.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Identities of the workers not yet joined.
    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.workers.keys().copied().collect()
    }

    /// Returns true once every worker has been joined.
    pub fn is_shut_down(&self) -> bool {
        self.workers.is_empty()
    }

    /// Tear everything down. Calling again after completion does nothing.
    #[instrument(name = "shutdown_all", skip(self), fields(workers = self.workers.len()))]
    pub fn shutdown_all(&mut self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        if self.workers.is_empty() {
            self.flags.request_stop();
            return report;
        }

        info!("Stopping acquisition on all devices");
        for handle in self.workers.values() {
            handle.stop_acquisition();
        }

        self.flags.request_stop();

        let mut devices = Vec::with_capacity(self.workers.len());
        for (id, handle) in std::mem::take(&mut self.workers) {
            report.joined += 1;
            match handle.join() {
                Ok(exit) => {
                    if exit.panicked {
                        report.panicked += 1;
                        error!(device = %id, "Worker joined after a panic");
                    } else {
                        info!(device = %id, "Worker joined");
                    }
                    devices.push((id, exit.device));
                }
                Err(_) => {
                    report.panicked += 1;
                    error!(device = %id, "Worker panicked while releasing its device");
                }
            }
        }

        for (id, mut device) in devices {
            if device.is_open() {
                debug!(device = %id, "Closing device left open");
                device.close();
                report.closed_by_coordinator += 1;
            }
            drop(device);
        }

        info!(
            joined = report.joined,
            panicked = report.panicked,
            closed = report.closed_by_coordinator,
            "Shutdown complete"
        );
        report
    }
}

impl Drop for ShutdownCoordinator {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shutdown_all();
        }
    }
}
