//! The pipeline aggregate: owns the registry output, the worker arena and
//! the run flags for one run.

use std::collections::BTreeMap;
use std::sync::Arc;

use crossbeam_channel::Sender;
use tracing::{debug, error, info, instrument, warn};

use grabber_capture::DeviceDiscovery;
use grabber_encoder::{create_frame_encoder, EncoderConfig, FrameEncoder};
use grabber_ipc::{DeviceId, GrabberConfig, PipelineEvent};
use grabber_transport::PublishSink;

use crate::error::PipelineError;
use crate::metrics::{DeviceMetricsSnapshot, MetricsCollector};
use crate::registry::DeviceRegistry;
use crate::shutdown::{ShutdownCoordinator, ShutdownReport};
use crate::worker::{CaptureWorker, RunFlags, WorkerContext};
use crate::PipelineResult;

/// Builds and starts a [`Pipeline`].
pub struct PipelineBuilder {
    config: GrabberConfig,
    sink: Arc<dyn PublishSink>,
    encoder: Option<Arc<dyn FrameEncoder>>,
    events: Option<Sender<PipelineEvent>>,
}

impl PipelineBuilder {
    /// Start from a profile and the sink frames are published to.
    pub fn new(config: GrabberConfig, sink: Arc<dyn PublishSink>) -> Self {
        Self {
            config,
            sink,
            encoder: None,
            events: None,
        }
    }

    /// Use a specific encoder instead of the JPEG encoder from the profile.
    pub fn encoder(mut self, encoder: Arc<dyn FrameEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    /// Report state transitions and device failures on this channel.
    pub fn events(mut self, events: Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Validate the profile, register devices and spawn one worker each.
    ///
    /// Nothing keeps running if this fails: workers spawned before a failure
    /// are shut down before the error is returned.
    #[instrument(name = "pipeline_start", skip_all, fields(name = %self.config.name))]
    pub fn start(self, discovery: &dyn DeviceDiscovery) -> PipelineResult<Pipeline> {
        let Self {
            config,
            sink,
            encoder,
            events,
        } = self;

        config.validate()?;

        let encoder = match encoder {
            Some(encoder) => encoder,
            None => create_frame_encoder(EncoderConfig {
                jpeg_quality: config.jpeg_quality,
            })?,
        };

        let descriptors = DeviceRegistry::discover(discovery, &config).map_err(|e| {
            error!(error = %e, "Device registration failed");
            e
        })?;

        let ids: Vec<DeviceId> = descriptors.iter().map(|d| d.id).collect();
        sink.attach(&ids).map_err(|e| {
            error!(error = %e, "Publish sink setup failed");
            e
        })?;

        let flags = RunFlags::new(config.use_image_stream, config.use_image_stream_monitoring);
        let metrics = MetricsCollector::new(ids.iter().copied());
        let context = WorkerContext {
            flags: flags.clone(),
            encoder,
            sink,
            events: events.clone(),
            retrieve_timeout: config.retrieve_timeout(),
        };

        let mut workers = BTreeMap::new();
        for descriptor in descriptors {
            let id = descriptor.id;
            let Some(device_metrics) = metrics.device(id) else {
                continue;
            };
            let worker = CaptureWorker::new(descriptor, &config, context.clone(), device_metrics);

            match worker.spawn() {
                Ok(handle) => {
                    workers.insert(handle.id(), handle);
                }
                Err(source) => {
                    error!(device = %id, error = %source, "Worker spawn failed, rolling back");
                    ShutdownCoordinator::new(flags, workers).shutdown_all();
                    return Err(PipelineError::Spawn { device: id, source });
                }
            }
        }

        let count = workers.len();
        if count == 0 {
            warn!("No devices found");
        }
        info!(
            workers = count,
            encoder = context.encoder.name(),
            stream = config.use_image_stream,
            monitor = config.use_image_stream_monitoring,
            "Pipeline started"
        );

        let pipeline = Pipeline {
            coordinator: ShutdownCoordinator::new(flags, workers),
            metrics,
            events,
        };
        pipeline.send_event(PipelineEvent::Started { workers: count });
        Ok(pipeline)
    }
}

/// A running set of capture workers.
///
/// Dropping the pipeline shuts it down.
pub struct Pipeline {
    coordinator: ShutdownCoordinator,
    metrics: MetricsCollector,
    events: Option<Sender<PipelineEvent>>,
}

impl Pipeline {
    /// Shorthand for [`PipelineBuilder::new`].
    pub fn builder(config: GrabberConfig, sink: Arc<dyn PublishSink>) -> PipelineBuilder {
        PipelineBuilder::new(config, sink)
    }

    /// Number of live workers; zero after shutdown.
    pub fn worker_count(&self) -> usize {
        self.coordinator.worker_count()
    }

    /// Identities of the live workers, ascending.
    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.coordinator.device_ids()
    }

    /// Per-device counters, ascending by identity.
    pub fn metrics(&self) -> Vec<DeviceMetricsSnapshot> {
        self.metrics.snapshot()
    }

    /// Stop, join and release everything.
    ///
    /// Only the first call does any work; later calls return an empty report.
    pub fn shutdown_all(&mut self) -> ShutdownReport {
        if self.coordinator.is_shut_down() {
            debug!("Pipeline already shut down");
            return ShutdownReport::default();
        }

        let report = self.coordinator.shutdown_all();
        self.send_event(PipelineEvent::Shutdown);
        report
    }

    fn send_event(&self, event: PipelineEvent) {
        if let Some(ref tx) = self.events {
            if let Err(e) = tx.try_send(event) {
                warn!("Failed to send event: {}", e);
            }
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}

#[cfg(test)]
mod tests {
    use grabber_capture::sim::{SimDeviceSpec, SimulatedDiscovery};
    use grabber_transport::{
        ChannelSink, MonitorMessage, StreamMessage, TransportError, TransportResult,
    };

    use super::*;

    #[test]
    fn test_invalid_profile_spawns_nothing() {
        let discovery = SimulatedDiscovery::new([SimDeviceSpec::new("1")]);
        let (sink, _rx) = ChannelSink::bounded(4);
        let config = GrabberConfig {
            acquisition_fps: 0.0,
            ..Default::default()
        };

        let err = Pipeline::builder(config, Arc::new(sink))
            .start(&discovery)
            .err()
            .unwrap();
        assert!(err.is_configuration_error());
        assert!(discovery.probe("1").is_none());
    }

    #[test]
    fn test_empty_discovery() {
        let discovery = SimulatedDiscovery::new([]);
        let (sink, _rx) = ChannelSink::bounded(4);
        let mut pipeline = Pipeline::builder(GrabberConfig::default(), Arc::new(sink))
            .start(&discovery)
            .unwrap();

        assert_eq!(pipeline.worker_count(), 0);
        assert_eq!(pipeline.shutdown_all(), ShutdownReport::default());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let discovery = SimulatedDiscovery::new([SimDeviceSpec::new("1"), SimDeviceSpec::new("2")]);
        let (sink, _rx) = ChannelSink::bounded(4);
        let mut pipeline = Pipeline::builder(GrabberConfig::default(), Arc::new(sink))
            .start(&discovery)
            .unwrap();
        assert_eq!(pipeline.device_ids(), [DeviceId::new(1), DeviceId::new(2)]);

        let first = pipeline.shutdown_all();
        assert_eq!(first.joined, 2);
        assert_eq!(first.panicked, 0);
        assert_eq!(pipeline.worker_count(), 0);

        assert_eq!(pipeline.shutdown_all(), ShutdownReport::default());
        for label in ["1", "2"] {
            let probe = discovery.probe(label).unwrap();
            assert_eq!(probe.close_count(), 1);
            assert!(probe.is_released());
        }
    }

    /// Sink that refuses to set up devices.
    struct UnbindableSink;

    impl PublishSink for UnbindableSink {
        fn attach(&self, devices: &[DeviceId]) -> TransportResult<()> {
            assert_eq!(devices, [DeviceId::new(7), DeviceId::new(4)]);
            Err(TransportError::InvalidEndpoint("tcp://*:5555".into()))
        }

        fn publish_stream(&self, _message: StreamMessage) -> TransportResult<()> {
            unreachable!("no worker may start")
        }

        fn publish_monitor(&self, _message: MonitorMessage) -> TransportResult<()> {
            unreachable!("no worker may start")
        }
    }

    #[test]
    fn test_sink_setup_failure_spawns_nothing() {
        let discovery = SimulatedDiscovery::new([SimDeviceSpec::new("7"), SimDeviceSpec::new("4")]);

        let err = Pipeline::builder(GrabberConfig::default(), Arc::new(UnbindableSink))
            .start(&discovery)
            .err()
            .unwrap();

        assert!(matches!(err, PipelineError::Sink(_)));
        assert!(!err.is_configuration_error());
        for label in ["4", "7"] {
            let probe = discovery.probe(label).unwrap();
            assert_eq!(probe.open_count(), 0);
            assert!(probe.is_released());
        }
    }
}
