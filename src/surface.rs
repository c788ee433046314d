//! Recording surface
//!
//! The shared handle between the capture side and everything that samples
//! the picture: the UI preview reads the latest frame from here, and the
//! orchestrator sizes and samples recording sessions from it. Sources
//! publish every delivered frame; the natural content size arrives on the
//! side channel and is kept for letterboxing decisions upstream.

use crate::frame::PixelFrame;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Default)]
struct SurfaceInner {
    frame: RwLock<Option<Arc<PixelFrame>>>,
    content_size: RwLock<Option<(u32, u32)>>,
}

/// Cheaply clonable view of the latest captured frame
#[derive(Clone, Default)]
pub struct RecordingSurface {
    inner: Arc<SurfaceInner>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the most recent frame (called once per delivered frame)
    pub fn publish(&self, frame: Arc<PixelFrame>) {
        *self.inner.frame.write() = Some(frame);
    }

    /// Latest published frame, if any frame has arrived yet
    pub fn snapshot(&self) -> Option<Arc<PixelFrame>> {
        self.inner.frame.read().clone()
    }

    /// Record the source's natural content size (side channel)
    pub fn set_content_size(&self, width: u32, height: u32) {
        *self.inner.content_size.write() = Some((width, height));
    }

    /// Natural content size reported by the source, if known
    pub fn content_size(&self) -> Option<(u32, u32)> {
        *self.inner.content_size.read()
    }

    /// Dimensions a new recording session should open at
    ///
    /// Prefers the actual frame dimensions; falls back to the reported
    /// content size before the first frame lands.
    pub fn recording_size(&self) -> Option<(u32, u32)> {
        if let Some(frame) = self.snapshot() {
            return Some((frame.width(), frame.height()));
        }
        self.content_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frame(width: u32, height: u32) -> Arc<PixelFrame> {
        let len = width as usize * height as usize * 4;
        Arc::new(PixelFrame::new(width, height, vec![0u8; len], Duration::ZERO).unwrap())
    }

    #[test]
    fn test_empty_surface_has_no_size() {
        let surface = RecordingSurface::new();
        assert!(surface.snapshot().is_none());
        assert!(surface.recording_size().is_none());
    }

    #[test]
    fn test_publish_replaces_snapshot() {
        let surface = RecordingSurface::new();
        surface.publish(frame(4, 4));
        surface.publish(frame(8, 2));

        let latest = surface.snapshot().unwrap();
        assert_eq!((latest.width(), latest.height()), (8, 2));
    }

    #[test]
    fn test_recording_size_prefers_frames_over_content_size() {
        let surface = RecordingSurface::new();
        surface.set_content_size(1280, 720);
        assert_eq!(surface.recording_size(), Some((1280, 720)));

        surface.publish(frame(640, 480));
        assert_eq!(surface.recording_size(), Some((640, 480)));
    }
}
