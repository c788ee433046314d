//! autoclip - detection-triggered video clip recording.
//!
//! Frames flow from a video source (camera, file, or library asset)
//! through an object detector into a recording orchestrator. When the
//! watched object appears, a clip starts; when it has been absent for a
//! quiescence window, the clip is finalized as an MP4.

pub mod detector;
pub mod frame;
pub mod pipeline;
pub mod recorder;
pub mod render;
pub mod sink;
pub mod source;
pub mod surface;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use detector::{Detection, DetectionResult, Detector};
pub use frame::{PixelFormat, PixelFrame};
pub use pipeline::DetectionPipeline;
pub use recorder::{ClipInfo, RecorderConfig, RecorderEvent, RecordingOrchestrator};
pub use source::{VideoSource, VideoSourceConfig};
pub use surface::RecordingSurface;

/// Initialize tracing/logging for embedding applications
///
/// Respects `RUST_LOG`; defaults to debug output for this crate only.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autoclip=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
