//! Video sources
//!
//! A source produces a lazy, time-paced sequence of frames plus a
//! "natural content size" side channel and a terminal completed/failed
//! event. Three concrete implementations exist, one per config variant:
//! live camera, file decoder, and library asset.

pub mod camera;
pub mod file;
pub mod library;

use crate::frame::PixelFrame;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

pub use camera::CameraSource;
pub use file::FileSource;
pub use library::{AssetHandle, AssetLibrary, LibraryAssetSource};

/// Source failure
#[derive(Error, Debug, Clone)]
pub enum SourceError {
    #[error("no capture device available")]
    Unavailable,

    #[error("invalid source configuration: {0}")]
    ConfigInvalid(String),

    #[error("decode failed: {0}")]
    DecodeFailed(String),
}

/// Camera resolution presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionPreset {
    Low,
    Medium,
    High,
}

impl ResolutionPreset {
    /// Requested capture dimensions for the preset
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            ResolutionPreset::Low => (640, 480),
            ResolutionPreset::Medium => (1280, 720),
            ResolutionPreset::High => (1920, 1080),
        }
    }
}

/// Where frames come from — exactly one variant is active
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "sourceKind", rename_all = "camelCase")]
pub enum VideoSourceConfig {
    /// Live capture from the default camera
    Camera { preset: ResolutionPreset },

    /// Decode a video file from disk
    File { path: PathBuf },

    /// Decode a video resolved through the asset library
    LibraryAsset { handle: AssetHandle },
}

/// Events a source delivers to its registered listener
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// A decoded frame, ready for detection and preview
    Frame(Arc<PixelFrame>),

    /// Natural content size of the stream, for letterboxing upstream
    ContentSize { width: u32, height: u32 },

    /// The stream ended normally (file sources only)
    Completed,

    /// The stream died; no more frames will arrive
    Failed(SourceError),
}

/// Capability interface shared by all source variants
///
/// Lifecycle: `configure` once (registering the event listener), then
/// `start`/`stop`. A stopped source does not restart; build a new one from
/// its config instead.
#[async_trait]
pub trait VideoSource: Send {
    /// Validate the configuration and register the event listener
    ///
    /// Must not deliver any frame before `start`. Configuration problems
    /// (missing device, unreachable file) surface here, once.
    async fn configure(&mut self, events: mpsc::Sender<SourceEvent>) -> Result<(), SourceError>;

    /// Begin delivering frames on a dedicated worker
    fn start(&mut self) -> Result<(), SourceError>;

    /// Stop delivery; the worker observes the stop within one pending read
    fn stop(&mut self);
}

/// Number of frames a slow consumer may have in flight before the producer
/// starts dropping (live sources) or blocking (file sources).
pub const EVENT_CHANNEL_CAPACITY: usize = 4;

/// Build the concrete source for a config variant
pub fn create_source(
    config: VideoSourceConfig,
    library: &AssetLibrary,
) -> Result<Box<dyn VideoSource>, SourceError> {
    match config {
        VideoSourceConfig::Camera { preset } => Ok(Box::new(CameraSource::new(preset))),
        VideoSourceConfig::File { path } => Ok(Box::new(FileSource::new(path))),
        VideoSourceConfig::LibraryAsset { handle } => {
            Ok(Box::new(LibraryAssetSource::new(handle, library)?))
        }
    }
}
