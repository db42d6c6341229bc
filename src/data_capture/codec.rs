//! JPEG conversion of frames.
//!
//! Used when a frame leaves the process (classifier payloads, live viewers)
//! and when relay uploads enter it.

use std::io::Cursor;

use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageFormat, Rgb, RgbImage};

use super::types::Frame;
use crate::error_handling::types::CaptureError;

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Encodes `frame` as a baseline JPEG.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode(
        frame.data(),
        frame.width(),
        frame.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(out)
}

/// Decodes a JPEG into a frame of exactly `width`x`height`, resizing if needed.
pub fn decode_jpeg(jpeg: &[u8], width: u32, height: u32) -> Result<Frame, CaptureError> {
    let decoded = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)?.to_rgb8();
    let decoded = if decoded.dimensions() == (width, height) {
        decoded
    } else {
        imageops::resize(&decoded, width, height, FilterType::Triangle)
    };
    Frame::from_rgb(width, height, decoded.into_raw(), Utc::now())
}

/// Dark placeholder image with a red cross, shown to viewers when no camera
/// transport could be opened.
pub fn connection_failed_jpeg(width: u32, height: u32) -> Result<Vec<u8>, CaptureError> {
    let width = width.max(16);
    let height = height.max(16);
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([24, 24, 24]));
    let red = Rgb([200, 30, 30]);
    let thickness = (width.min(height) / 60).max(2) as i64;
    let (w, h) = (width as i64, height as i64);

    for x in 0..w {
        let y_down = x * h / w;
        let y_up = h - 1 - y_down;
        for offset in -thickness..=thickness {
            for y in [y_down + offset, y_up + offset] {
                if (0..h).contains(&y) {
                    canvas.put_pixel(x as u32, y as u32, red);
                }
            }
        }
    }

    let mut out = Cursor::new(Vec::new());
    canvas.write_to(&mut out, ImageFormat::Jpeg)?;
    Ok(out.into_inner())
}
