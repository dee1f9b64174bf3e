//! Events emitted by the pipeline while it runs.

use serde::{Deserialize, Serialize};

use crate::state::WorkerState;
use crate::types::DeviceId;

/// Events that the pipeline can send to a supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// A capture worker changed state.
    WorkerStateChanged {
        /// Device owned by the worker.
        device: DeviceId,

        /// Previous state.
        previous: WorkerState,

        /// Current state.
        current: WorkerState,
    },

    /// A device-scoped error ended a worker's acquisition.
    DeviceFailed {
        /// Device owned by the worker.
        device: DeviceId,

        /// Error message.
        message: String,
    },

    /// All workers are running.
    Started {
        /// Number of workers spawned.
        workers: usize,
    },

    /// All workers have been joined and devices released.
    Shutdown,
}
