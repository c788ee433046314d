//! Detection pipeline
//!
//! Glue between a video source and the recording orchestrator: every frame
//! is published to the recording surface, fed to the detector, and the
//! detector's results are forwarded to the orchestrator. Terminal source
//! events interrupt any open session so a clip is never left unfinalized.

use crate::detector::Detector;
use crate::recorder::OrchestratorHandle;
use crate::source::{SourceError, SourceEvent, VideoSource, EVENT_CHANNEL_CAPACITY};
use crate::surface::RecordingSurface;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Pipeline failure
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Drives frames from one source through detection into the recorder
pub struct DetectionPipeline {
    source: Box<dyn VideoSource>,
    detector: Arc<dyn Detector>,
    surface: RecordingSurface,
    recorder: OrchestratorHandle,
}

impl DetectionPipeline {
    pub fn new(
        source: Box<dyn VideoSource>,
        detector: Arc<dyn Detector>,
        surface: RecordingSurface,
        recorder: OrchestratorHandle,
    ) -> Self {
        Self {
            source,
            detector,
            surface,
            recorder,
        }
    }

    /// Run the pipeline until the source ends or fails
    ///
    /// Detection runs inline with frame delivery: a slow detector slows the
    /// event channel down rather than piling frames up, and live sources
    /// drop frames the channel has no room for.
    pub async fn run(mut self) -> Result<(), PipelineError> {
        let (events, mut inbox) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        self.source.configure(events).await?;
        self.source.start()?;
        tracing::info!("pipeline started");

        let outcome = loop {
            match inbox.recv().await {
                Some(SourceEvent::Frame(frame)) => {
                    self.surface.publish(frame.clone());
                    let result = self.detector.detect(frame).await;
                    self.recorder.submit_detections(result).await;
                }
                Some(SourceEvent::ContentSize { width, height }) => {
                    tracing::debug!("content size {width}x{height}");
                    self.surface.set_content_size(width, height);
                }
                Some(SourceEvent::Completed) => {
                    tracing::info!("source completed");
                    break Ok(());
                }
                Some(SourceEvent::Failed(e)) => {
                    tracing::error!("source failed: {e}");
                    break Err(PipelineError::Source(e));
                }
                // All senders gone without a terminal event: treat as
                // completion.
                None => break Ok(()),
            }
        };

        self.source.stop();
        // Whatever ended the stream, an open session must be finalized.
        self.recorder.interrupt().await;
        outcome
    }
}
