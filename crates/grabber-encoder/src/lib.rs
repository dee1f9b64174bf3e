//! Frame encoding for the stream and monitor channels.
//!
//! Capture workers hand raw frames to a [`FrameEncoder`] and publish the
//! compressed bytes it returns. Encoding is synchronous and bounded.

mod error;
mod jpeg;

pub use error::EncoderError;
pub use jpeg::JpegEncoder;

use std::sync::Arc;

use bytes::Bytes;
use grabber_capture::Frame;

/// Result type for encoder operations.
pub type EncoderResult<T> = Result<T, EncoderError>;

/// Encoder configuration.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// JPEG quality (1-100).
    pub jpeg_quality: u8,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self { jpeg_quality: 90 }
    }
}

/// Compresses raw frames.
///
/// Implementations are shared by every capture worker, so methods take
/// `&self` and must not block on other workers.
pub trait FrameEncoder: Send + Sync {
    /// Compress a frame at its native resolution.
    fn encode(&self, frame: &Frame) -> EncoderResult<Bytes>;

    /// Resize a frame to `width`x`height`, then compress it.
    fn encode_resized(&self, frame: &Frame, width: u32, height: u32) -> EncoderResult<Bytes>;

    /// Get encoder name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Create the frame encoder used by the pipeline.
pub fn create_frame_encoder(config: EncoderConfig) -> EncoderResult<Arc<dyn FrameEncoder>> {
    let encoder = JpegEncoder::new(config.jpeg_quality)?;
    tracing::info!(quality = config.jpeg_quality, "Using JPEG frame encoder");
    Ok(Arc::new(encoder))
}
