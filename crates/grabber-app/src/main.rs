//! Frame grabber command-line application.
//!
//! Runs the capture pipeline over the cameras described in a profile and
//! consumes the published frames until Ctrl+C.

mod settings;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use crossbeam_channel::{after, never, select, Receiver};
use tracing::{debug, info, warn};

use grabber_capture::sim::SimulatedDiscovery;
use grabber_engine::Pipeline;
use grabber_ipc::{event_channel, PipelineEvent};
use grabber_transport::{ChannelSink, PublishSink, SinkReceivers, PUBLISH_CHANNEL_CAPACITY};

use crate::settings::AppConfig;

/// Multi-camera frame grabber.
#[derive(Debug, Parser)]
#[command(name = "grabber", version)]
struct Args {
    /// Path to the JSON profile.
    #[arg(short, long)]
    config: PathBuf,

    /// Stop after this many seconds instead of waiting for Ctrl+C.
    #[arg(long)]
    duration: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let settings = AppConfig::from_file(&args.config)?;
    info!(
        name = %settings.grabber.name,
        devices = settings.simulation.devices.len(),
        "Starting frame grabber"
    );

    let discovery = SimulatedDiscovery::new(settings.simulation.devices.clone());
    let (sink, receivers) = build_sink(&settings)?;
    let (event_tx, event_rx) = event_channel();

    let mut pipeline = Pipeline::builder(settings.grabber.clone(), sink)
        .events(event_tx)
        .start(&discovery)
        .context("Pipeline failed to start")?;

    let consumers = receivers.map(spawn_consumers).unwrap_or_default();

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        info!("Received Ctrl+C, shutting down");
        let _ = shutdown_tx.try_send(());
    })?;

    let deadline = args
        .duration
        .map(|secs| after(Duration::from_secs(secs)))
        .unwrap_or_else(never);
    run_until_stopped(&event_rx, &shutdown_rx, &deadline);

    let report = pipeline.shutdown_all();
    info!(
        joined = report.joined,
        panicked = report.panicked,
        closed = report.closed_by_coordinator,
        "Pipeline stopped"
    );

    for consumer in consumers {
        if consumer.join().is_err() {
            warn!("Consumer thread panicked");
        }
    }

    for m in pipeline.metrics() {
        info!(
            device = %m.device,
            frames = m.frames_captured,
            frame_errors = m.frame_errors,
            stream_published = m.stream_published,
            stream_dropped = m.stream_dropped,
            monitor_published = m.monitor_published,
            monitor_dropped = m.monitor_dropped,
            encode_errors = m.encode_errors,
            fps = format_args!("{:.1}", m.fps),
            "Device metrics"
        );
    }

    Ok(())
}

fn build_sink(
    settings: &AppConfig,
) -> anyhow::Result<(Arc<dyn PublishSink>, Option<SinkReceivers>)> {
    if let Some(sink) = zmq_sink(settings)? {
        return Ok((sink, None));
    }

    let (sink, receivers) = ChannelSink::bounded(PUBLISH_CHANNEL_CAPACITY);
    let sink: Arc<dyn PublishSink> = Arc::new(sink);
    Ok((sink, Some(receivers)))
}

#[cfg(feature = "zmq")]
fn zmq_sink(settings: &AppConfig) -> anyhow::Result<Option<Arc<dyn PublishSink>>> {
    let Some(ref config) = settings.zmq else {
        return Ok(None);
    };
    let sink: Arc<dyn PublishSink> = Arc::new(
        grabber_transport::ZmqSink::new(config.clone()).context("Invalid ZeroMQ sink config")?,
    );
    Ok(Some(sink))
}

#[cfg(not(feature = "zmq"))]
fn zmq_sink(_settings: &AppConfig) -> anyhow::Result<Option<Arc<dyn PublishSink>>> {
    Ok(None)
}

/// Log pipeline events until Ctrl+C or the deadline.
fn run_until_stopped(
    events: &Receiver<PipelineEvent>,
    shutdown: &Receiver<()>,
    deadline: &Receiver<Instant>,
) {
    loop {
        select! {
            recv(shutdown) -> _ => break,
            recv(deadline) -> _ => {
                info!("Run duration elapsed");
                break;
            }
            recv(events) -> event => match event {
                Ok(PipelineEvent::DeviceFailed { device, message }) => {
                    warn!(%device, %message, "Device stopped");
                }
                Ok(event) => debug!(?event, "Pipeline event"),
                Err(_) => break,
            },
        }
    }
}

/// Drain both channels, logging receipt. Threads exit once every worker
/// has dropped its sender.
fn spawn_consumers(receivers: SinkReceivers) -> Vec<JoinHandle<()>> {
    let SinkReceivers { stream, monitor } = receivers;

    let stream_consumer = thread::spawn(move || {
        let mut received: u64 = 0;
        for message in stream.iter() {
            received += 1;
            if received <= 5 || received % 100 == 0 {
                debug!(
                    device = %message.device,
                    bytes = message.payload.len(),
                    received,
                    "Stream frame received"
                );
            }
        }
        info!(received, "Stream consumer finished");
    });

    let monitor_consumer = thread::spawn(move || {
        let mut received: u64 = 0;
        for message in monitor.iter() {
            received += 1;
            if received <= 5 || received % 100 == 0 {
                debug!(
                    topic = %message.topic,
                    bytes = message.payload.len(),
                    received,
                    "Monitor frame received"
                );
            }
        }
        info!(received, "Monitor consumer finished");
    });

    vec![stream_consumer, monitor_consumer]
}
