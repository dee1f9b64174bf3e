//! Multi-device frame acquisition pipeline.
//!
//! One capture worker thread per discovered camera. Each worker retrieves
//! frames with a bounded blocking call and publishes them, best effort, on
//! the stream and monitor channels of a [`grabber_transport::PublishSink`].
//! Shutdown stops every device before joining any worker.

mod error;
mod metrics;
mod pipeline;
mod registry;
mod shutdown;
mod worker;

pub use error::{DiscoveryError, PipelineError};
pub use metrics::{DeviceMetrics, DeviceMetricsSnapshot, MetricsCollector};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use registry::{DeviceDescriptor, DeviceRegistry};
pub use shutdown::{ShutdownCoordinator, ShutdownReport};
pub use worker::{CaptureWorker, RunFlags, WorkerContext, WorkerExit, WorkerHandle};

use std::time::Duration;

/// Interval between per-device stats log lines.
pub const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Result type for pipeline initialization.
pub type PipelineResult<T> = Result<T, PipelineError>;
