//! Common data types used across the data_capture subsystem.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error_handling::types::CaptureError;

/// One decoded RGB24 image and the time it was captured.
///
/// Frames are immutable; cloning shares the pixel buffer, which is what lets
/// the ring buffer, a recording writer and live viewers all hold the same
/// frame without copying pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Bytes,
    captured_at: DateTime<Utc>,
}

impl Frame {
    /// Builds a frame from tightly packed RGB24 pixels.
    pub fn from_rgb(
        width: u32,
        height: u32,
        data: impl Into<Bytes>,
        captured_at: DateTime<Utc>,
    ) -> Result<Self, CaptureError> {
        let data = data.into();
        let expected = rgb_len(width, height);
        if data.len() != expected {
            return Err(CaptureError::ReadFailure(format!(
                "frame of {}x{} needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
            captured_at,
        })
    }

    /// Builds a frame from BGR24 pixels, swapping channels into RGB order.
    pub fn from_bgr(
        width: u32,
        height: u32,
        mut data: Vec<u8>,
        captured_at: DateTime<Utc>,
    ) -> Result<Self, CaptureError> {
        for pixel in data.chunks_exact_mut(3) {
            pixel.swap(0, 2);
        }
        Self::from_rgb(width, height, data, captured_at)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// RGB24 pixel bytes, row-major.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

/// Byte length of a packed RGB24 image.
pub fn rgb_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}
