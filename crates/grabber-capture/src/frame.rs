//! Captured frame types.

use std::time::{Duration, Instant};

use bytes::Bytes;

/// When a frame was exposed, on the device's acquisition clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTimestamp {
    /// Host instant at which the result was retrieved.
    pub retrieved_at: Instant,

    /// Offset from the start of acquisition.
    pub since_start: Duration,
}

impl CaptureTimestamp {
    /// Stamp a frame retrieved now, for an acquisition started at `start`.
    pub fn now(start: Instant) -> Self {
        let retrieved_at = Instant::now();
        Self {
            retrieved_at,
            since_start: retrieved_at.saturating_duration_since(start),
        }
    }

    /// Offset from acquisition start in whole milliseconds.
    pub fn millis(&self) -> u64 {
        self.since_start.as_millis() as u64
    }
}

/// Pixel layout of a raw frame buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PixelFormat {
    /// 8-bit grayscale.
    #[default]
    Mono8,

    /// 8-bit interleaved RGB.
    Rgb8,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Mono8 => 1,
            Self::Rgb8 => 3,
        }
    }
}

/// A raw frame retrieved from a device.
///
/// `data` is reference counted, so a frame is a cheap view over the
/// retrieval buffer. Frames are not retained across loop iterations.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Pixel data, row-major, no padding.
    pub data: Bytes,

    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Pixel layout.
    pub pixel_format: PixelFormat,

    /// Capture timestamp.
    pub timestamp: CaptureTimestamp,

    /// Monotonically increasing sequence number per device.
    pub sequence: u64,
}

impl Frame {
    /// Create a new frame.
    pub fn new(
        data: Bytes,
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        timestamp: CaptureTimestamp,
        sequence: u64,
    ) -> Self {
        Self {
            data,
            width,
            height,
            pixel_format,
            timestamp,
            sequence,
        }
    }

    /// Calculate expected buffer size for given dimensions.
    pub fn buffer_size(pixel_format: PixelFormat, width: u32, height: u32) -> usize {
        width as usize * height as usize * pixel_format.bytes_per_pixel()
    }

    /// Validate that the frame data matches expected dimensions.
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == Self::buffer_size(self.pixel_format, self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_validity() {
        let ts = CaptureTimestamp::now(Instant::now());
        let frame = Frame::new(Bytes::from(vec![0u8; 12]), 4, 3, PixelFormat::Mono8, ts, 0);
        assert!(frame.is_valid());
        assert!(frame.timestamp.millis() < 1000);

        let frame = Frame::new(Bytes::from(vec![0u8; 12]), 4, 3, PixelFormat::Rgb8, ts, 0);
        assert!(!frame.is_valid());
        assert_eq!(Frame::buffer_size(PixelFormat::Rgb8, 4, 3), 36);
    }
}
