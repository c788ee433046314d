//! Frame data types
//!
//! A `PixelFrame` is the unit of exchange between sources, the detector,
//! the renderer, and the encoder sink. Frames are immutable once built and
//! are shared through `Arc` where more than one stage needs them.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pixel layout of a frame buffer
///
/// The pipeline runs on a single packed 32-bit format end to end: BGRA with
/// the alpha byte first in host order (premultiplied-first). Sources convert
/// into it, the encoder sink consumes it as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Bgra32,
}

impl PixelFormat {
    /// Bytes per pixel
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Bgra32 => 4,
        }
    }

    /// The pixel format string ffmpeg expects for raw input in this layout
    pub fn ffmpeg_pix_fmt(&self) -> &'static str {
        match self {
            PixelFormat::Bgra32 => "bgra",
        }
    }
}

/// A decoded video frame with its presentation timestamp
///
/// The timestamp is relative to the producing source's own epoch (stream
/// start for files, capture start for cameras).
#[derive(Debug, Clone)]
pub struct PixelFrame {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
    pts: Duration,
}

impl PixelFrame {
    /// Build a frame, validating that the buffer matches the dimensions
    ///
    /// Returns `None` when either dimension is zero or the buffer length
    /// does not equal `width * height * bytes_per_pixel`. A zero-sized
    /// frame has no pixels to sample and no place in the pipeline.
    pub fn new(width: u32, height: u32, data: Vec<u8>, pts: Duration) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let format = PixelFormat::Bgra32;
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            format,
            data,
            pts,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Row stride in bytes
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Presentation timestamp on the source's clock
    pub fn pts(&self) -> Duration {
        self.pts
    }

    /// Same pixels, different presentation time
    pub fn with_pts(mut self, pts: Duration) -> Self {
        self.pts = pts;
        self
    }
}
