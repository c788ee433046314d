//! Frame renderer
//!
//! Converts an arbitrary captured frame into the fixed-size, fixed-format
//! buffer the encoder sink expects. The policy is aspect-fill: scale the
//! source so it covers the whole canvas, center it, and crop the overflow.
//! Letterbox borders are never introduced.

use crate::frame::{PixelFormat, PixelFrame};
use std::time::Duration;
use thiserror::Error;

/// Renderer failure
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to allocate destination buffer ({0} bytes)")]
    AllocationFailed(usize),
}

/// Scales and crops frames onto a fixed target canvas
///
/// One renderer is built per recording session, sized to the recording
/// surface at session-open time.
pub struct FrameRenderer {
    target_width: u32,
    target_height: u32,
}

impl FrameRenderer {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    pub fn target_size(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    /// Render a source frame onto the target canvas with the given
    /// presentation time
    ///
    /// Allocation failure is reported, not fatal: the caller skips the frame
    /// and retries on the next tick.
    pub fn render(&self, source: &PixelFrame, pts: Duration) -> Result<PixelFrame, RenderError> {
        let tw = self.target_width as usize;
        let th = self.target_height as usize;
        let sw = source.width() as usize;
        let sh = source.height() as usize;
        let bpp = PixelFormat::Bgra32.bytes_per_pixel();

        let len = tw * th * bpp;
        let mut data: Vec<u8> = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| RenderError::AllocationFailed(len))?;

        // ScaleAspectFill: cover the canvas, crop the overflow symmetrically.
        let scale = f64::max(tw as f64 / sw as f64, th as f64 / sh as f64);
        let offset_x = (sw as f64 * scale - tw as f64) / 2.0;
        let offset_y = (sh as f64 * scale - th as f64) / 2.0;

        let src = source.data();
        let src_stride = source.stride();

        for dy in 0..th {
            let sy = (((dy as f64 + offset_y) / scale) as usize).min(sh - 1);
            let row = sy * src_stride;
            for dx in 0..tw {
                let sx = (((dx as f64 + offset_x) / scale) as usize).min(sw - 1);
                let p = row + sx * bpp;
                data.extend_from_slice(&src[p..p + bpp]);
            }
        }

        // Length is exact by construction, so this cannot fail.
        PixelFrame::new(self.target_width, self.target_height, data, pts)
            .ok_or(RenderError::AllocationFailed(len))
    }
}
