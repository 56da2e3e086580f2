//! JPEG frame encoding with a reusable output buffer.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::{EmuError, Frame};

/// Compresses RGB frames to JPEG, reusing one output buffer.
///
/// Each session keeps its own `FrameEncoder` (behind the session entry's
/// lock), so the buffer grows once to the working frame size and is then
/// reused for every subsequent frame — frames are encoded at up to 60 Hz
/// and a fresh allocation per frame would dominate the egress path.
pub struct FrameEncoder {
    buf: Vec<u8>,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Encodes `frame` at the given quality (1–100), returning a view of
    /// the internal buffer. The view is valid until the next call.
    pub fn encode(&mut self, frame: &Frame, quality: u8) -> Result<&[u8], EmuError> {
        let expected = frame.expected_len();
        if frame.pixels.len() != expected {
            return Err(EmuError::FrameGeometry {
                expected,
                actual: frame.pixels.len(),
            });
        }

        self.buf.clear();
        let mut encoder =
            JpegEncoder::new_with_quality(Cursor::new(&mut self.buf), quality);
        encoder.encode(
            &frame.pixels,
            frame.width,
            frame.height,
            ExtendedColorType::Rgb8,
        )?;
        Ok(&self.buf)
    }

    /// Current buffer capacity, in bytes.
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}
