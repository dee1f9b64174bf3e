//! Drop Warning Tests
//!
//! Installs a capturing subscriber for this test binary and checks that every
//! frame the sink refuses produces exactly one warning.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use grabber_capture::sim::{SimDeviceSpec, SimulatedDiscovery};
use grabber_engine::Pipeline;
use grabber_ipc::GrabberConfig;
use grabber_transport::{
    Channel, MonitorMessage, PublishSink, StreamMessage, TransportError, TransportResult,
};

/// Log output shared between the subscriber and the test.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn lines_containing(&self, needles: &[&str]) -> usize {
        let buffer = self.0.lock();
        String::from_utf8_lossy(&buffer)
            .lines()
            .filter(|line| needles.iter().all(|needle| line.contains(needle)))
            .count()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sink whose stream channel is never ready.
struct FullStream;

impl PublishSink for FullStream {
    fn publish_stream(&self, _message: StreamMessage) -> TransportResult<()> {
        Err(TransportError::NotReady(Channel::Stream))
    }

    fn publish_monitor(&self, _message: MonitorMessage) -> TransportResult<()> {
        Ok(())
    }
}

#[test]
fn test_one_warning_per_dropped_frame() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let config = GrabberConfig {
        use_image_stream: true,
        retrieve_timeout_ms: 1000,
        ..Default::default()
    };
    let discovery =
        SimulatedDiscovery::new([SimDeviceSpec::new("9").with_resolution(32, 24).with_fps(100.0)]);
    let mut pipeline = Pipeline::builder(config, Arc::new(FullStream))
        .start(&discovery)
        .unwrap();

    let probe = discovery.probe("9").unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while probe.frames_delivered() < 11 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    pipeline.shutdown_all();

    let metrics = pipeline.metrics().remove(0);
    assert!(metrics.stream_dropped >= 10);
    assert_eq!(
        logs.lines_containing(&["WARN", "device=9", "Stream frame dropped"]) as u64,
        metrics.stream_dropped
    );
}
