//! Per-device counters and reporting.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use grabber_ipc::DeviceId;

/// Counters for one device, written only by its capture worker.
#[derive(Debug)]
pub struct DeviceMetrics {
    device: DeviceId,
    start_time: RwLock<Option<Instant>>,
    frames_captured: AtomicU64,
    frame_errors: AtomicU64,
    stream_published: AtomicU64,
    stream_dropped: AtomicU64,
    monitor_published: AtomicU64,
    monitor_dropped: AtomicU64,
    encode_errors: AtomicU64,
}

impl DeviceMetrics {
    fn new(device: DeviceId) -> Self {
        Self {
            device,
            start_time: RwLock::new(None),
            frames_captured: AtomicU64::new(0),
            frame_errors: AtomicU64::new(0),
            stream_published: AtomicU64::new(0),
            stream_dropped: AtomicU64::new(0),
            monitor_published: AtomicU64::new(0),
            monitor_dropped: AtomicU64::new(0),
            encode_errors: AtomicU64::new(0),
        }
    }

    /// Mark the start of acquisition.
    pub fn start(&self) {
        *self.start_time.write() = Some(Instant::now());
    }

    pub fn record_frame(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_error(&self) {
        self.frame_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stream_published(&self) {
        self.stream_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stream_drop(&self) {
        self.stream_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_monitor_published(&self) {
        self.monitor_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_monitor_drop(&self) {
        self.monitor_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_encode_error(&self) {
        self.encode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> DeviceMetricsSnapshot {
        let frames_captured = self.frames_captured.load(Ordering::Relaxed);
        let uptime = self
            .start_time
            .read()
            .map(|s| s.elapsed().as_secs_f32())
            .unwrap_or(0.0);

        let fps = if uptime > 0.0 {
            frames_captured as f32 / uptime
        } else {
            0.0
        };

        DeviceMetricsSnapshot {
            device: self.device,
            frames_captured,
            frame_errors: self.frame_errors.load(Ordering::Relaxed),
            stream_published: self.stream_published.load(Ordering::Relaxed),
            stream_dropped: self.stream_dropped.load(Ordering::Relaxed),
            monitor_published: self.monitor_published.load(Ordering::Relaxed),
            monitor_dropped: self.monitor_dropped.load(Ordering::Relaxed),
            encode_errors: self.encode_errors.load(Ordering::Relaxed),
            fps,
            uptime_seconds: uptime as u64,
        }
    }
}

/// Point-in-time counters for one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceMetricsSnapshot {
    pub device: DeviceId,
    pub frames_captured: u64,
    pub frame_errors: u64,
    pub stream_published: u64,
    pub stream_dropped: u64,
    pub monitor_published: u64,
    pub monitor_dropped: u64,
    pub encode_errors: u64,
    /// Average capture rate since acquisition started.
    pub fps: f32,
    pub uptime_seconds: u64,
}

impl DeviceMetricsSnapshot {
    /// Frames that reached neither a consumer nor an encoder.
    pub fn dropped_frames(&self) -> u64 {
        self.stream_dropped + self.monitor_dropped + self.encode_errors
    }
}

/// Collects metrics for every registered device.
///
/// The device set is fixed at construction, so lookups need no lock.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    devices: BTreeMap<DeviceId, Arc<DeviceMetrics>>,
}

impl MetricsCollector {
    /// Create a collector for the given devices.
    pub fn new(devices: impl IntoIterator<Item = DeviceId>) -> Self {
        Self {
            devices: devices
                .into_iter()
                .map(|id| (id, Arc::new(DeviceMetrics::new(id))))
                .collect(),
        }
    }

    /// Counters for one device.
    pub fn device(&self, id: DeviceId) -> Option<Arc<DeviceMetrics>> {
        self.devices.get(&id).cloned()
    }

    /// Snapshot of every device, ordered by identity.
    pub fn snapshot(&self) -> Vec<DeviceMetricsSnapshot> {
        self.devices.values().map(|m| m.snapshot()).collect()
    }
}
