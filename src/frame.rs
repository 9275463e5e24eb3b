//! Frame types between the camera stream and the classifier.
//!
//! - `ImageFrame`: one complete JPEG as cut out of the deck byte stream.
//! - `InputTensor`: single-channel, normalized pixels ready for inference.
//! - `FrameDecoder`: turns the former into the latter.
//!
//! Decoding failures are recoverable. The pipeline skips the frame and keeps
//! scanning; nothing here touches extractor state.

use image::GenericImageView;

use crate::error::DecodeError;
use crate::ingest::jpeg::{END_MARKER, START_MARKER};

/// Default classifier input width (deck camera resolution).
pub const DEFAULT_INPUT_WIDTH: u32 = 324;
/// Default classifier input height (deck camera resolution).
pub const DEFAULT_INPUT_HEIGHT: u32 = 244;

// ----------------------------------------------------------------------------
// ImageFrame: marker-delimited JPEG bytes
// ----------------------------------------------------------------------------

/// A complete frame, inclusive of its start and end markers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageFrame {
    bytes: Vec<u8>,
}

impl ImageFrame {
    /// Wrap bytes that already carry both markers.
    ///
    /// Returns `None` unless the slice starts with 0xFFD8 and ends with 0xFFD9.
    pub fn new(bytes: Vec<u8>) -> Option<Self> {
        if bytes.len() >= 4 && bytes.starts_with(&START_MARKER) && bytes.ends_with(&END_MARKER) {
            Some(Self { bytes })
        } else {
            None
        }
    }

    /// Called by the extractor, which has already located both markers.
    pub(crate) fn from_extracted(bytes: Vec<u8>) -> Self {
        debug_assert!(bytes.starts_with(&START_MARKER) && bytes.ends_with(&END_MARKER));
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

// ----------------------------------------------------------------------------
// InputTensor: what the classifier sees
// ----------------------------------------------------------------------------

/// Single-channel image normalized to [0, 1], batch of one.
///
/// Pixels are stored row-major; the logical shape is `(1, height, width, 1)`.
#[derive(Clone, Debug, PartialEq)]
pub struct InputTensor {
    pixels: Vec<f32>,
    width: u32,
    height: u32,
}

impl InputTensor {
    /// Build from raw 8-bit luma samples.
    pub fn from_luma8(width: u32, height: u32, luma: &[u8]) -> Option<Self> {
        if luma.len() != (width as usize) * (height as usize) {
            return None;
        }
        let pixels = luma.iter().map(|&v| v as f32 / 255.0).collect();
        Some(Self {
            pixels,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `[batch, height, width, channels]`.
    pub fn shape(&self) -> [usize; 4] {
        [1, self.height as usize, self.width as usize, 1]
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    /// Mean intensity, 0.0 for an empty tensor.
    pub fn mean(&self) -> f32 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        self.pixels.iter().sum::<f32>() / self.pixels.len() as f32
    }
}

// ----------------------------------------------------------------------------
// FrameDecoder
// ----------------------------------------------------------------------------

/// JPEG -> `InputTensor`.
///
/// The deck streams colour JPEGs; the classifier was trained on the first
/// (red) channel only, so that channel is kept and the others dropped.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameDecoder {
    expected: Option<(u32, u32)>,
}

impl FrameDecoder {
    /// Accept frames of any size.
    pub fn new() -> Self {
        Self { expected: None }
    }

    /// Reject frames whose dimensions differ from the classifier input.
    pub fn with_input_size(width: u32, height: u32) -> Self {
        Self {
            expected: Some((width, height)),
        }
    }

    pub fn decode(&self, frame: &ImageFrame) -> Result<InputTensor, DecodeError> {
        let image = image::load_from_memory(frame.as_bytes())?;
        let (width, height) = image.dimensions();
        if let Some((expected_width, expected_height)) = self.expected {
            if width != expected_width || height != expected_height {
                return Err(DecodeError::Dimensions {
                    width,
                    height,
                    expected_width,
                    expected_height,
                });
            }
        }

        let rgb = image.into_rgb8();
        let first_channel: Vec<u8> = rgb.as_raw().chunks_exact(3).map(|px| px[0]).collect();
        // Length always matches width * height for an RGB8 buffer.
        InputTensor::from_luma8(width, height, &first_channel).ok_or(DecodeError::Dimensions {
            width,
            height,
            expected_width: width,
            expected_height: height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode_jpeg(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb(rgb));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Jpeg)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn image_frame_requires_both_markers() {
        assert!(ImageFrame::new(vec![0xFF, 0xD8, 0x00, 0xFF, 0xD9]).is_some());
        assert!(ImageFrame::new(vec![0xFF, 0xD8, 0x00, 0x00]).is_none());
        assert!(ImageFrame::new(vec![0x00, 0xFF, 0xD8, 0xFF, 0xD9]).is_none());
        assert!(ImageFrame::new(vec![0xFF, 0xD9]).is_none());
    }

    #[test]
    fn decoder_keeps_first_channel_normalized() {
        let bytes = encode_jpeg(16, 8, [255, 0, 0]);
        let frame = ImageFrame::new(bytes).unwrap();
        let tensor = FrameDecoder::new().decode(&frame).unwrap();

        assert_eq!(tensor.shape(), [1, 8, 16, 1]);
        assert_eq!(tensor.pixels().len(), 16 * 8);
        assert!(tensor.pixels().iter().all(|p| (0.0..=1.0).contains(p)));
        // Solid red survives JPEG well enough to stay near 1.0 on channel 0.
        assert!(tensor.mean() > 0.9, "mean was {}", tensor.mean());
    }

    #[test]
    fn decoder_rejects_wrong_dimensions() {
        let frame = ImageFrame::new(encode_jpeg(16, 8, [10, 10, 10])).unwrap();
        let err = FrameDecoder::with_input_size(324, 244)
            .decode(&frame)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Dimensions { width: 16, height: 8, .. }));
    }

    #[test]
    fn decoder_reports_corrupt_jpeg() {
        let frame = ImageFrame::new(vec![0xFF, 0xD8, 0x12, 0x34, 0x56, 0xFF, 0xD9]).unwrap();
        let err = FrameDecoder::new().decode(&frame).unwrap_err();
        assert!(matches!(err, DecodeError::Image(_)));
    }
}
