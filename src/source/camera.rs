//! Live camera source
//!
//! Captures from the default camera with nokhwa on a dedicated worker
//! thread. Frames are delivered the moment the camera produces them — no
//! pacing — and a lagging consumer loses frames instead of growing a queue,
//! keeping preview latency bounded.

use super::{ResolutionPreset, SourceError, SourceEvent, VideoSource};
use crate::frame::PixelFrame;
use async_trait::async_trait;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

const REQUESTED_FPS: u32 = 30;

/// Video source backed by the default capture device
pub struct CameraSource {
    preset: ResolutionPreset,
    events: Option<mpsc::Sender<SourceEvent>>,
    stopped: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl CameraSource {
    pub fn new(preset: ResolutionPreset) -> Self {
        Self {
            preset,
            events: None,
            stopped: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Capture loop, run on the worker thread
    ///
    /// The camera is opened here rather than in `start` because nokhwa
    /// capture handles stay on the thread that created them.
    fn capture_loop(
        preset: ResolutionPreset,
        events: mpsc::Sender<SourceEvent>,
        stopped: Arc<AtomicBool>,
    ) {
        let (width, height) = preset.dimensions();
        let requested = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::Closest(
            CameraFormat::new(Resolution::new(width, height), FrameFormat::MJPEG, REQUESTED_FPS),
        ));

        let mut camera = match Camera::new(CameraIndex::Index(0), requested) {
            Ok(camera) => camera,
            Err(e) => {
                tracing::error!("failed to open camera: {e:?}");
                let _ = events.blocking_send(SourceEvent::Failed(SourceError::Unavailable));
                return;
            }
        };
        if let Err(e) = camera.open_stream() {
            tracing::error!("failed to open camera stream: {e:?}");
            let _ = events.blocking_send(SourceEvent::Failed(SourceError::Unavailable));
            return;
        }

        let format = camera.camera_format();
        tracing::info!(
            "camera opened: {}x{} @ {}fps (requested {}x{})",
            format.resolution().width(),
            format.resolution().height(),
            format.frame_rate(),
            width,
            height
        );

        let epoch = Instant::now();
        let mut announced_size: Option<(u32, u32)> = None;
        let mut dropped: u64 = 0;

        while !stopped.load(Ordering::SeqCst) {
            // Blocks until the camera delivers; the camera owns the timing.
            let buffer = match camera.frame() {
                Ok(buffer) => buffer,
                Err(e) => {
                    tracing::debug!("camera frame failed: {e:?}");
                    continue;
                }
            };
            let decoded = match buffer.decode_image::<RgbAFormat>() {
                Ok(decoded) => decoded,
                Err(e) => {
                    tracing::debug!("camera frame decode failed: {e:?}");
                    continue;
                }
            };

            let (frame_width, frame_height) = decoded.dimensions();
            if announced_size != Some((frame_width, frame_height)) {
                announced_size = Some((frame_width, frame_height));
                let _ = events.try_send(SourceEvent::ContentSize {
                    width: frame_width,
                    height: frame_height,
                });
            }

            let mut data = decoded.into_raw();
            // RGBA from nokhwa, BGRA on the wire.
            for pixel in data.chunks_exact_mut(4) {
                pixel.swap(0, 2);
            }

            let frame = match PixelFrame::new(frame_width, frame_height, data, epoch.elapsed()) {
                Some(frame) => Arc::new(frame),
                None => continue,
            };
            // Drop-late policy: when the consumer lags, lose this frame
            // rather than queue it behind stale ones.
            if events.try_send(SourceEvent::Frame(frame)).is_err() {
                dropped += 1;
                tracing::trace!("dropped late camera frame ({dropped} total)");
            }
        }

        if let Err(e) = camera.stop_stream() {
            tracing::warn!("error stopping camera stream: {e:?}");
        }
        tracing::info!("camera capture stopped ({dropped} frames dropped)");
    }
}

#[async_trait]
impl VideoSource for CameraSource {
    async fn configure(&mut self, events: mpsc::Sender<SourceEvent>) -> Result<(), SourceError> {
        let devices = nokhwa::query(ApiBackend::Auto)
            .map_err(|e| {
                tracing::warn!("camera enumeration failed: {e:?}");
                SourceError::Unavailable
            })?;
        if devices.is_empty() {
            return Err(SourceError::Unavailable);
        }

        tracing::info!(
            "camera source configured ({} device(s), preset {:?})",
            devices.len(),
            self.preset
        );
        self.events = Some(events);
        Ok(())
    }

    fn start(&mut self) -> Result<(), SourceError> {
        let events = self
            .events
            .take()
            .ok_or_else(|| SourceError::ConfigInvalid("source not configured".to_string()))?;

        let preset = self.preset;
        let stopped = self.stopped.clone();
        let handle = std::thread::spawn(move || {
            Self::capture_loop(preset, events, stopped);
        });
        self.worker = Some(handle);

        tracing::info!("camera source started");
        Ok(())
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}
