//! Per-device capture worker.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use tracing::{debug, error, info, info_span, instrument, warn};

use grabber_capture::{
    AcquisitionStop, CameraDevice, CaptureError, CaptureResult, DeviceSettings, Frame, GrabResult,
};
use grabber_encoder::FrameEncoder;
use grabber_ipc::{DeviceId, GrabberConfig, PipelineEvent, WorkerState};
use grabber_transport::{MonitorMessage, PublishSink, StreamMessage};

use crate::metrics::DeviceMetrics;
use crate::registry::DeviceDescriptor;
use crate::STATS_INTERVAL;

/// Run-wide switches shared by every worker.
///
/// Written once by the shutdown path, read on every loop iteration.
#[derive(Debug, Clone)]
pub struct RunFlags {
    stop: Arc<AtomicBool>,
    stream: Arc<AtomicBool>,
    monitor: Arc<AtomicBool>,
}

impl RunFlags {
    /// Create flags for a run with the given channels enabled.
    pub fn new(stream: bool, monitor: bool) -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            stream: Arc::new(AtomicBool::new(stream)),
            monitor: Arc::new(AtomicBool::new(monitor)),
        }
    }

    /// Disable both channels, then raise the stop flag.
    pub fn request_stop(&self) {
        self.stream.store(false, Ordering::SeqCst);
        self.monitor.store(false, Ordering::SeqCst);
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn stream_enabled(&self) -> bool {
        self.stream.load(Ordering::SeqCst)
    }

    pub fn monitor_enabled(&self) -> bool {
        self.monitor.load(Ordering::SeqCst)
    }
}

/// Collaborators shared by all workers of one run.
#[derive(Clone)]
pub struct WorkerContext {
    pub flags: RunFlags,
    pub encoder: Arc<dyn FrameEncoder>,
    pub sink: Arc<dyn PublishSink>,
    pub events: Option<Sender<PipelineEvent>>,
    pub retrieve_timeout: Duration,
}

#[derive(Debug, Clone)]
struct MonitorTarget {
    topic: String,
    width: u32,
    height: u32,
}

/// State machine driving one device from open to close.
pub struct CaptureWorker {
    id: DeviceId,
    device: Box<dyn CameraDevice>,
    settings: DeviceSettings,
    monitor: Option<MonitorTarget>,
    context: WorkerContext,
    metrics: Arc<DeviceMetrics>,
    state: WorkerState,
}

impl CaptureWorker {
    /// Create a worker that owns the descriptor's device.
    pub fn new(
        descriptor: DeviceDescriptor,
        config: &GrabberConfig,
        context: WorkerContext,
        metrics: Arc<DeviceMetrics>,
    ) -> Self {
        let id = descriptor.id;
        let monitor = descriptor.monitor.map(|port| MonitorTarget {
            topic: config.monitor_topic(id),
            width: port.resolution.width,
            height: port.resolution.height,
        });

        Self {
            id,
            settings: DeviceSettings::from_config(config, descriptor.overrides.as_ref()),
            device: descriptor.device,
            monitor,
            context,
            metrics,
            state: WorkerState::Configuring,
        }
    }

    /// Move the worker onto its own thread.
    ///
    /// If the thread cannot be created the device is released unopened.
    #[instrument(name = "spawn_worker", skip(self), fields(device = %self.id))]
    pub fn spawn(self) -> std::io::Result<WorkerHandle> {
        let id = self.id;
        let stop = self.device.acquisition_stop();

        let thread = thread::Builder::new()
            .name(format!("capture-{id}"))
            .spawn(move || self.run())?;

        debug!("Worker spawned");
        Ok(WorkerHandle { id, stop, thread })
    }

    /// Drive the state machine to `Closed` and hand the device back.
    ///
    /// A panic anywhere in the state machine is caught here: the device is
    /// still stopped and closed, and the exit is marked as panicked.
    pub fn run(mut self) -> WorkerExit {
        let span = info_span!("capture_worker", device = %self.id);
        let _enter = span.enter();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.drive()));
        let panicked = outcome.is_err();
        if panicked {
            error!(state = self.state.name(), "Worker panicked, releasing device");
            self.send_event(PipelineEvent::DeviceFailed {
                device: self.id,
                message: "capture worker panicked".to_string(),
            });
            self.release();
        }

        WorkerExit {
            device: self.device,
            panicked,
        }
    }

    fn drive(&mut self) {
        if let Err(e) = self.configure() {
            error!(error = %e, "Device configuration failed");
            self.send_event(PipelineEvent::DeviceFailed {
                device: self.id,
                message: e.to_string(),
            });
            self.transition(WorkerState::Closed);
            return;
        }

        self.transition(WorkerState::Acquiring);
        self.metrics.start();
        self.acquire();

        self.transition(WorkerState::Stopping);
        self.device.stop_acquisition();
        self.device.close();

        self.transition(WorkerState::Closed);
    }

    /// Finish the lifecycle from whatever state a panic left behind.
    fn release(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        if self.state == WorkerState::Acquiring {
            self.transition(WorkerState::Stopping);
        }
        self.device.stop_acquisition();
        self.device.close();
        self.transition(WorkerState::Closed);
    }

    fn configure(&mut self) -> CaptureResult<()> {
        self.device.open()?;
        self.device.apply_settings(&self.settings)?;
        info!(
            mode = %self.settings.acquisition_mode,
            fps = self.settings.acquisition_fps,
            trigger_mode = %self.settings.trigger.mode,
            trigger_source = %self.settings.trigger.source,
            heartbeat_ms = self.settings.heartbeat_timeout_ms,
            exposure = ?self.settings.exposure_time,
            "Acquisition settings applied"
        );
        self.device.start_acquisition()
    }

    fn acquire(&mut self) {
        let timeout = self.context.retrieve_timeout;
        let mut last_log_time = Instant::now();

        loop {
            if self.context.flags.should_stop() {
                debug!("Stop requested");
                break;
            }
            if !self.device.is_grabbing() {
                info!("Acquisition no longer running");
                break;
            }

            match self.device.retrieve(timeout) {
                Ok(GrabResult::Frame(frame)) => {
                    self.metrics.record_frame();
                    self.publish(&frame);
                }
                Ok(GrabResult::Failed { code, description }) => {
                    self.metrics.record_frame_error();
                    warn!(code, %description, "Grab failed");
                }
                Err(CaptureError::NotGrabbing) => {
                    debug!("Acquisition stopped while waiting for a frame");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Frame retrieval failed");
                    self.send_event(PipelineEvent::DeviceFailed {
                        device: self.id,
                        message: e.to_string(),
                    });
                    break;
                }
            }

            if last_log_time.elapsed() >= STATS_INTERVAL {
                let stats = self.metrics.snapshot();
                info!(
                    frames = stats.frames_captured,
                    frame_errors = stats.frame_errors,
                    stream = stats.stream_published,
                    monitor = stats.monitor_published,
                    dropped = stats.dropped_frames(),
                    fps = format_args!("{:.1}", stats.fps),
                    "Capture stats"
                );
                last_log_time = Instant::now();
            }
        }
    }

    fn publish(&self, frame: &Frame) {
        if self.context.flags.stream_enabled() {
            match self.context.encoder.encode(frame) {
                Ok(bytes) => {
                    let message = StreamMessage::new(self.id, bytes);
                    match self.context.sink.publish_stream(message) {
                        Ok(()) => self.metrics.record_stream_published(),
                        Err(e) => {
                            self.metrics.record_stream_drop();
                            warn!(
                                sequence = frame.sequence,
                                at_ms = frame.timestamp.millis(),
                                error = %e,
                                "Stream frame dropped"
                            );
                        }
                    }
                }
                Err(e) => {
                    self.metrics.record_encode_error();
                    warn!(sequence = frame.sequence, error = %e, "Stream encode failed");
                }
            }
        }

        let Some(ref target) = self.monitor else {
            return;
        };
        if !self.context.flags.monitor_enabled() {
            return;
        }

        match self
            .context
            .encoder
            .encode_resized(frame, target.width, target.height)
        {
            Ok(bytes) => {
                let message = MonitorMessage::new(target.topic.clone(), self.id, bytes);
                match self.context.sink.publish_monitor(message) {
                    Ok(()) => self.metrics.record_monitor_published(),
                    Err(e) => {
                        self.metrics.record_monitor_drop();
                        warn!(
                            sequence = frame.sequence,
                            at_ms = frame.timestamp.millis(),
                            error = %e,
                            "Monitor frame dropped"
                        );
                    }
                }
            }
            Err(e) => {
                self.metrics.record_encode_error();
                warn!(sequence = frame.sequence, error = %e, "Monitor encode failed");
            }
        }
    }

    fn transition(&mut self, next: WorkerState) {
        debug_assert!(self.state.can_transition_to(next));
        let previous = std::mem::replace(&mut self.state, next);

        debug!(
            previous = previous.name(),
            current = next.name(),
            "State transition"
        );

        self.send_event(PipelineEvent::WorkerStateChanged {
            device: self.id,
            previous,
            current: next,
        });
    }

    fn send_event(&self, event: PipelineEvent) {
        if let Some(ref tx) = self.context.events {
            if let Err(e) = tx.try_send(event) {
                debug!("Failed to send event: {}", e);
            }
        }
    }
}

/// What a worker thread hands back when it exits.
pub struct WorkerExit {
    /// The device. Still open only if configuration failed after opening.
    pub device: Box<dyn CameraDevice>,

    /// The state machine panicked and the device was released afterwards.
    pub panicked: bool,
}

/// Join handle and stop handle of a running worker.
pub struct WorkerHandle {
    id: DeviceId,
    stop: Arc<dyn AcquisitionStop>,
    thread: JoinHandle<WorkerExit>,
}

impl WorkerHandle {
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Stop the device's acquisition, unblocking a pending retrieval.
    pub fn stop_acquisition(&self) {
        self.stop.stop_acquisition();
    }

    /// Wait for the worker to exit and take back its device.
    pub fn join(self) -> thread::Result<WorkerExit> {
        self.thread.join()
    }
}

#[cfg(test)]
mod tests {
    use grabber_capture::sim::{SimDeviceSpec, SimProbe, SimStep, SimulatedCamera};
    use grabber_capture::{CameraDevice, DeviceInfo};
    use grabber_encoder::{create_frame_encoder, EncoderConfig};
    use grabber_ipc::{event_channel, MonitorPort, MonitorResolution};
    use grabber_transport::{ChannelSink, SinkReceivers};

    use super::*;

    fn descriptor(spec: SimDeviceSpec, monitor: Option<(u32, u32)>) -> (DeviceDescriptor, SimProbe) {
        let camera = SimulatedCamera::new(spec);
        let probe = camera.probe();
        let id: DeviceId = camera.info().label.parse().unwrap();
        let info: DeviceInfo = camera.info().clone();
        let descriptor = DeviceDescriptor {
            id,
            info,
            device: Box::new(camera),
            overrides: None,
            monitor: monitor.map(|(width, height)| MonitorPort {
                id,
                resolution: MonitorResolution { width, height },
            }),
        };
        (descriptor, probe)
    }

    fn context(flags: &RunFlags, timeout: Duration) -> (WorkerContext, SinkReceivers) {
        let (sink, rx) = ChannelSink::bounded(64);
        let context = WorkerContext {
            flags: flags.clone(),
            encoder: create_frame_encoder(EncoderConfig::default()).unwrap(),
            sink: Arc::new(sink),
            events: None,
            retrieve_timeout: timeout,
        };
        (context, rx)
    }

    fn metrics(id: u32) -> Arc<DeviceMetrics> {
        crate::MetricsCollector::new([DeviceId::new(id)])
            .device(DeviceId::new(id))
            .unwrap()
    }

    #[test]
    fn test_run_flags() {
        let flags = RunFlags::new(true, true);
        assert!(flags.stream_enabled() && flags.monitor_enabled());
        assert!(!flags.should_stop());

        flags.clone().request_stop();
        assert!(flags.should_stop());
        assert!(!flags.stream_enabled());
        assert!(!flags.monitor_enabled());
    }

    #[test]
    fn test_timeout_ends_worker() {
        let flags = RunFlags::new(true, false);
        let (context, rx) = context(&flags, Duration::from_millis(50));
        let spec = SimDeviceSpec::new("4")
            .with_resolution(32, 24)
            .with_script([SimStep::Frame, SimStep::Frame])
            .then(SimStep::Timeout);
        let (descriptor, probe) = descriptor(spec, None);

        let worker = CaptureWorker::new(descriptor, &GrabberConfig::default(), context, metrics(4));
        let exit = worker.run();

        assert!(!exit.panicked);
        assert!(!exit.device.is_open());
        assert_eq!(probe.close_count(), 1);
        assert_eq!(rx.stream.len(), 2);
    }

    #[test]
    fn test_frame_error_is_not_fatal() {
        let flags = RunFlags::new(true, false);
        let (context, rx) = context(&flags, Duration::from_millis(50));
        let spec = SimDeviceSpec::new("1")
            .with_resolution(16, 16)
            .with_script([
                SimStep::FrameError {
                    code: 0xE1000014,
                    description: "buffer incompletely grabbed".into(),
                },
                SimStep::Frame,
            ])
            .then(SimStep::Lost {
                message: "link down".into(),
            });
        let (descriptor, probe) = descriptor(spec, None);

        let metrics = metrics(1);
        let worker =
            CaptureWorker::new(descriptor, &GrabberConfig::default(), context, metrics.clone());
        worker.run();

        assert_eq!(probe.frame_errors_delivered(), 1);
        let message = rx.stream.try_recv().unwrap();
        assert_eq!(message.device, DeviceId::new(1));
        assert!(rx.stream.try_recv().is_err());

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frame_errors, 1);
        assert_eq!(snapshot.frames_captured, 1);
    }

    #[test]
    fn test_configure_failure_goes_to_closed() {
        let flags = RunFlags::new(true, true);
        let (mut context, _rx) = context(&flags, Duration::from_millis(50));
        let (tx, events) = event_channel();
        context.events = Some(tx);

        let (descriptor, probe) = descriptor(SimDeviceSpec::new("2").failing_configure(), None);
        let worker = CaptureWorker::new(descriptor, &GrabberConfig::default(), context, metrics(2));
        let exit = worker.run();

        // Left open for the coordinator to close.
        assert!(exit.device.is_open());
        assert_eq!(probe.close_count(), 0);

        let received: Vec<PipelineEvent> = events.try_iter().collect();
        assert!(matches!(
            received[0],
            PipelineEvent::DeviceFailed { device, .. } if device == DeviceId::new(2)
        ));
        assert!(matches!(
            received[1],
            PipelineEvent::WorkerStateChanged {
                previous: WorkerState::Configuring,
                current: WorkerState::Closed,
                ..
            }
        ));
    }

    #[test]
    fn test_monitor_only_when_port_declared() {
        let flags = RunFlags::new(false, true);
        let (context, rx) = context(&flags, Duration::from_millis(50));
        let spec = SimDeviceSpec::new("6")
            .with_resolution(64, 48)
            .with_script([SimStep::Frame])
            .then(SimStep::Timeout);

        let (with_port, _) = descriptor(spec.clone(), Some((32, 16)));
        CaptureWorker::new(with_port, &GrabberConfig::default(), context.clone(), metrics(6))
            .run();

        let (without_port, _) = descriptor(spec, None);
        CaptureWorker::new(without_port, &GrabberConfig::default(), context, metrics(6)).run();

        assert!(rx.stream.is_empty());
        assert_eq!(rx.monitor.len(), 1);
        let message = rx.monitor.try_recv().unwrap();
        assert_eq!(message.topic, "camera_grabber/image_stream_monitor_6");
    }

    #[test]
    fn test_stop_handle_unblocks_spawned_worker() {
        let flags = RunFlags::new(false, false);
        let (context, _rx) = context(&flags, Duration::from_secs(30));
        let spec = SimDeviceSpec::new("8").then(SimStep::Timeout);
        let (descriptor, probe) = descriptor(spec, None);

        let handle = CaptureWorker::new(descriptor, &GrabberConfig::default(), context, metrics(8))
            .spawn()
            .unwrap();
        assert_eq!(handle.id(), DeviceId::new(8));

        let deadline = Instant::now() + Duration::from_secs(5);
        while !probe.is_grabbing() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        let started = Instant::now();
        handle.stop_acquisition();
        let exit = handle.join().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!exit.device.is_open());
    }

    struct PanickingEncoder;

    impl FrameEncoder for PanickingEncoder {
        fn encode(&self, _frame: &Frame) -> grabber_encoder::EncoderResult<bytes::Bytes> {
            panic!("encoder bug");
        }

        fn encode_resized(
            &self,
            _frame: &Frame,
            _width: u32,
            _height: u32,
        ) -> grabber_encoder::EncoderResult<bytes::Bytes> {
            panic!("encoder bug");
        }

        fn name(&self) -> &'static str {
            "panicking"
        }
    }

    #[test]
    fn test_panic_still_closes_device() {
        let flags = RunFlags::new(true, false);
        let (mut context, rx) = context(&flags, Duration::from_millis(50));
        context.encoder = Arc::new(PanickingEncoder);
        let (tx, events) = event_channel();
        context.events = Some(tx);

        let (descriptor, probe) = descriptor(SimDeviceSpec::new("3").with_resolution(8, 8), None);
        let exit = CaptureWorker::new(descriptor, &GrabberConfig::default(), context, metrics(3))
            .spawn()
            .unwrap()
            .join()
            .unwrap();

        assert!(exit.panicked);
        assert!(!exit.device.is_open());
        assert_eq!(probe.close_count(), 1);
        assert!(rx.stream.is_empty());

        let states: Vec<WorkerState> = events
            .try_iter()
            .filter_map(|e| match e {
                PipelineEvent::WorkerStateChanged { current, .. } => Some(current),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            [WorkerState::Acquiring, WorkerState::Stopping, WorkerState::Closed]
        );
    }
}
