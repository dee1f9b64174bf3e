//! Simulated camera handle.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace};

use super::{SimDeviceSpec, SimProbe, SimShared, SimStep};
use crate::device::{DeviceInfo, DeviceSettings, GrabResult};
use crate::error::CaptureError;
use crate::frame::{CaptureTimestamp, Frame, PixelFormat};
use crate::{AcquisitionStop, CameraDevice, CaptureResult};

/// A simulated camera driven by a [`SimDeviceSpec`].
pub struct SimulatedCamera {
    info: DeviceInfo,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    frame_interval: Duration,
    script: VecDeque<SimStep>,
    then: SimStep,
    fail_open: bool,
    fail_configure: bool,
    shared: Arc<SimShared>,
    start_time: Instant,
    sequence: u64,
}

impl SimulatedCamera {
    /// Create a closed camera.
    pub fn new(spec: SimDeviceSpec) -> Self {
        let fps = if spec.fps.is_finite() && spec.fps > 0.0 {
            spec.fps
        } else {
            30.0
        };

        Self {
            info: DeviceInfo {
                label: spec.label,
                serial: spec.serial,
                address: spec.address,
            },
            width: spec.width,
            height: spec.height,
            pixel_format: spec.pixel_format,
            frame_interval: Duration::from_secs_f64(1.0 / fps),
            script: spec.script.into(),
            then: spec.then,
            fail_open: spec.fail_open,
            fail_configure: spec.fail_configure,
            shared: Arc::new(SimShared::default()),
            start_time: Instant::now(),
            sequence: 0,
        }
    }

    /// Observer that outlives the handle.
    pub fn probe(&self) -> SimProbe {
        SimProbe {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Wait up to `wait` unless acquisition stops first.
    /// Returns true if acquisition is still running afterwards.
    fn wait_while_grabbing(&self, wait: Duration) -> bool {
        let deadline = Instant::now() + wait;
        let mut flags = self.shared.flags.lock();
        while flags.grabbing {
            if self.shared.wake.wait_until(&mut flags, deadline).timed_out() {
                break;
            }
        }
        flags.grabbing
    }

    /// Wait one frame interval, bounded by the retrieval timeout.
    fn wait_for_exposure(&self, timeout: Duration) -> CaptureResult<()> {
        if self.frame_interval > timeout {
            return if self.wait_while_grabbing(timeout) {
                Err(CaptureError::Timeout(timeout))
            } else {
                Err(CaptureError::NotGrabbing)
            };
        }
        if self.wait_while_grabbing(self.frame_interval) {
            Ok(())
        } else {
            Err(CaptureError::NotGrabbing)
        }
    }

    fn render_frame(&mut self) -> Frame {
        let seq = self.sequence;
        self.sequence += 1;

        let bpp = self.pixel_format.bytes_per_pixel();
        let mut data = Vec::with_capacity(Frame::buffer_size(
            self.pixel_format,
            self.width,
            self.height,
        ));
        for y in 0..self.height as u64 {
            for x in 0..self.width as u64 {
                let value = ((x + y + seq) & 0xFF) as u8;
                data.extend(std::iter::repeat(value).take(bpp));
            }
        }

        Frame::new(
            Bytes::from(data),
            self.width,
            self.height,
            self.pixel_format,
            CaptureTimestamp::now(self.start_time),
            seq,
        )
    }
}

impl CameraDevice for SimulatedCamera {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn open(&mut self) -> CaptureResult<()> {
        if self.fail_open {
            return Err(CaptureError::Open(format!(
                "device {} refused the connection",
                self.info.serial
            )));
        }
        let mut flags = self.shared.flags.lock();
        if !flags.open {
            flags.open = true;
            self.shared.opens.fetch_add(1, Ordering::SeqCst);
            debug!(label = %self.info.label, "Simulated camera opened");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.shared.flags.lock().open
    }

    fn apply_settings(&mut self, settings: &DeviceSettings) -> CaptureResult<()> {
        if !self.is_open() {
            return Err(CaptureError::NotOpen);
        }
        if self.fail_configure {
            return Err(CaptureError::Configuration {
                parameter: "AcquisitionMode".to_string(),
                message: "node is not writable".to_string(),
            });
        }
        *self.shared.settings.lock() = Some(settings.clone());
        Ok(())
    }

    fn start_acquisition(&mut self) -> CaptureResult<()> {
        let mut flags = self.shared.flags.lock();
        if !flags.open {
            return Err(CaptureError::NotOpen);
        }
        if flags.grabbing {
            return Err(CaptureError::AlreadyStarted);
        }
        flags.grabbing = true;
        self.start_time = Instant::now();
        Ok(())
    }

    fn is_grabbing(&self) -> bool {
        self.shared.flags.lock().grabbing
    }

    fn retrieve(&mut self, timeout: Duration) -> CaptureResult<GrabResult> {
        {
            let flags = self.shared.flags.lock();
            if !flags.open {
                return Err(CaptureError::NotOpen);
            }
            if !flags.grabbing {
                return Err(CaptureError::NotGrabbing);
            }
        }

        let step = self.script.pop_front().unwrap_or_else(|| self.then.clone());
        trace!(label = %self.info.label, ?step, "Simulated retrieval");

        match step {
            SimStep::Frame => {
                self.wait_for_exposure(timeout)?;
                let frame = self.render_frame();
                self.shared.frames.fetch_add(1, Ordering::SeqCst);
                Ok(GrabResult::Frame(frame))
            }
            SimStep::FrameError { code, description } => {
                self.wait_for_exposure(timeout)?;
                self.shared.frame_errors.fetch_add(1, Ordering::SeqCst);
                Ok(GrabResult::Failed { code, description })
            }
            SimStep::Timeout => {
                if self.wait_while_grabbing(timeout) {
                    Err(CaptureError::Timeout(timeout))
                } else {
                    Err(CaptureError::NotGrabbing)
                }
            }
            SimStep::Lost { message } => Err(CaptureError::DeviceLost(message)),
        }
    }

    fn stop_acquisition(&mut self) {
        self.shared.stop_acquisition();
    }

    fn close(&mut self) {
        let mut flags = self.shared.flags.lock();
        flags.grabbing = false;
        if flags.open {
            flags.open = false;
            self.shared.closes.fetch_add(1, Ordering::SeqCst);
            debug!(label = %self.info.label, "Simulated camera closed");
        }
        self.shared.wake.notify_all();
    }

    fn acquisition_stop(&self) -> Arc<dyn AcquisitionStop> {
        self.shared.clone()
    }
}

impl AcquisitionStop for SimShared {
    fn stop_acquisition(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.flags.lock().grabbing = false;
        self.wake.notify_all();
    }
}

impl Drop for SimulatedCamera {
    fn drop(&mut self) {
        self.shared.released.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn opened(spec: SimDeviceSpec) -> SimulatedCamera {
        let mut camera = SimulatedCamera::new(spec);
        camera.open().unwrap();
        camera.start_acquisition().unwrap();
        camera
    }

    #[test]
    fn test_script_then_fallback() {
        let spec = SimDeviceSpec::new("1")
            .with_resolution(8, 4)
            .with_fps(1000.0)
            .with_script([SimStep::FrameError {
                code: 3,
                description: "incomplete".into(),
            }]);
        let mut camera = opened(spec);
        let timeout = Duration::from_millis(500);

        match camera.retrieve(timeout).unwrap() {
            GrabResult::Failed { code, .. } => assert_eq!(code, 3),
            other => panic!("expected frame error, got {other:?}"),
        }
        match camera.retrieve(timeout).unwrap() {
            GrabResult::Frame(frame) => {
                assert!(frame.is_valid());
                assert_eq!((frame.width, frame.height), (8, 4));
                assert_eq!(frame.sequence, 0);
            }
            other => panic!("expected frame, got {other:?}"),
        }
        assert_eq!(camera.probe().frames_delivered(), 1);
        assert_eq!(camera.probe().frame_errors_delivered(), 1);
    }

    #[test]
    fn test_timeout_step() {
        let spec = SimDeviceSpec::new("1").then(SimStep::Timeout);
        let mut camera = opened(spec);
        let started = Instant::now();
        let err = camera.retrieve(Duration::from_millis(30)).unwrap_err();
        assert!(matches!(err, CaptureError::Timeout(_)));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_stop_handle_unblocks_retrieval() {
        let spec = SimDeviceSpec::new("1").then(SimStep::Timeout);
        let mut camera = opened(spec);
        let stop = camera.acquisition_stop();
        let probe = camera.probe();

        let worker = thread::spawn(move || {
            let started = Instant::now();
            let result = camera.retrieve(Duration::from_secs(10));
            (result, started.elapsed(), camera)
        });

        thread::sleep(Duration::from_millis(50));
        stop.stop_acquisition();

        let (result, elapsed, mut camera) = worker.join().unwrap();
        assert!(matches!(result, Err(CaptureError::NotGrabbing)));
        assert!(elapsed < Duration::from_secs(5));
        assert!(!probe.is_grabbing());
        assert_eq!(probe.stop_count(), 1);

        camera.close();
        camera.close();
        assert_eq!(probe.close_count(), 1);
        drop(camera);
        assert!(probe.is_released());
    }

    #[test]
    fn test_open_and_configure_failures() {
        let mut camera = SimulatedCamera::new(SimDeviceSpec::new("1").failing_open());
        assert!(matches!(camera.open(), Err(CaptureError::Open(_))));
        assert!(!camera.is_open());

        let mut camera = SimulatedCamera::new(SimDeviceSpec::new("2").failing_configure());
        let settings = DeviceSettings::from_config(&Default::default(), None);
        assert!(matches!(
            camera.apply_settings(&settings),
            Err(CaptureError::NotOpen)
        ));
        camera.open().unwrap();
        assert!(matches!(
            camera.apply_settings(&settings),
            Err(CaptureError::Configuration { .. })
        ));
    }

    #[test]
    fn test_lost_step() {
        let spec = SimDeviceSpec::new("1").then(SimStep::Lost {
            message: "heartbeat expired".into(),
        });
        let mut camera = opened(spec);
        assert!(matches!(
            camera.retrieve(Duration::from_millis(10)),
            Err(CaptureError::DeviceLost(_))
        ));
    }

    #[test]
    fn test_spec_from_json() {
        let spec: SimDeviceSpec = serde_json::from_str(
            r#"{ "label": "2", "width": 64, "height": 48,
                 "script": [ { "kind": "timeout" } ],
                 "then": { "kind": "frame_error", "code": 1, "description": "x" } }"#,
        )
        .unwrap();
        assert_eq!(spec.script, vec![SimStep::Timeout]);
        assert!(matches!(spec.then, SimStep::FrameError { code: 1, .. }));
        assert_eq!(spec.fps, 30.0);
    }
}
