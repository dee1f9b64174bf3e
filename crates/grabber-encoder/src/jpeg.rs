//! JPEG encoder built on the `image` crate.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder as JpegWriter;
use image::imageops::{self, FilterType};
use image::{GenericImageView, ImageBuffer, Luma, Pixel, PixelWithColorType, Rgb};
use tracing::trace;

use grabber_capture::{Frame, PixelFormat};

use crate::error::EncoderError;
use crate::{EncoderResult, FrameEncoder};

/// Baseline JPEG encoder with bilinear downsampling.
#[derive(Debug, Clone)]
pub struct JpegEncoder {
    quality: u8,
}

impl JpegEncoder {
    /// Create an encoder with the given quality (1-100).
    pub fn new(quality: u8) -> EncoderResult<Self> {
        if !(1..=100).contains(&quality) {
            return Err(EncoderError::InvalidConfig(format!(
                "JPEG quality must be within 1-100, got {quality}"
            )));
        }
        Ok(Self { quality })
    }

    /// Get the configured quality.
    pub fn quality(&self) -> u8 {
        self.quality
    }

    fn encode_as<P>(&self, frame: &Frame, target: Option<(u32, u32)>) -> EncoderResult<Bytes>
    where
        P: Pixel<Subpixel = u8> + PixelWithColorType + 'static,
    {
        if !frame.is_valid() {
            return Err(EncoderError::InvalidInput(format!(
                "{} bytes for a {}x{} {:?} frame",
                frame.data.len(),
                frame.width,
                frame.height,
                frame.pixel_format
            )));
        }

        let view = ImageBuffer::<P, &[u8]>::from_raw(frame.width, frame.height, &frame.data[..])
            .ok_or_else(|| {
                EncoderError::InvalidInput("frame buffer does not match its dimensions".into())
            })?;

        match target {
            Some((width, height)) if (width, height) != (frame.width, frame.height) => {
                let resized = imageops::resize(&view, width, height, FilterType::Triangle);
                self.compress(&resized)
            }
            _ => self.compress(&view),
        }
    }

    fn compress<I>(&self, image: &I) -> EncoderResult<Bytes>
    where
        I: GenericImageView,
        I::Pixel: PixelWithColorType,
    {
        let mut buffer = Vec::new();
        JpegWriter::new_with_quality(&mut buffer, self.quality)
            .encode_image(image)
            .map_err(|e| EncoderError::Encoding(format!("JPEG encode failed: {e}")))?;
        trace!(bytes = buffer.len(), "Frame compressed");
        Ok(Bytes::from(buffer))
    }
}

impl FrameEncoder for JpegEncoder {
    fn encode(&self, frame: &Frame) -> EncoderResult<Bytes> {
        match frame.pixel_format {
            PixelFormat::Mono8 => self.encode_as::<Luma<u8>>(frame, None),
            PixelFormat::Rgb8 => self.encode_as::<Rgb<u8>>(frame, None),
        }
    }

    fn encode_resized(&self, frame: &Frame, width: u32, height: u32) -> EncoderResult<Bytes> {
        if width == 0 || height == 0 {
            return Err(EncoderError::InvalidResolution { width, height });
        }
        let target = Some((width, height));
        match frame.pixel_format {
            PixelFormat::Mono8 => self.encode_as::<Luma<u8>>(frame, target),
            PixelFormat::Rgb8 => self.encode_as::<Rgb<u8>>(frame, target),
        }
    }

    fn name(&self) -> &'static str {
        "jpeg"
    }
}
