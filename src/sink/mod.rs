//! Encoder sinks
//!
//! A sink owns the output container for one recording session: it accepts
//! pixel frames with strictly increasing presentation times and finalizes
//! them into a playable file. The production implementation drives an
//! ffmpeg child process; tests inject their own.

pub mod ffmpeg;

use crate::frame::PixelFrame;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub use ffmpeg::FfmpegEncoderSink;

/// Encoder failure
#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("failed to open encoder: {0}")]
    OpenFailed(String),

    #[error("frame rejected: {0}")]
    AppendRejected(String),

    #[error("failed to finalize output: {0}")]
    FinalizeFailed(String),
}

/// What to do when the encoder is not ready for more data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendMode {
    /// Drop the frame immediately — the live path, never blocks a tick
    DropIfNotReady,

    /// Retry with bounded backoff — offline encoding only
    WaitIfNeeded,
}

/// Destination for a recording session's frames
///
/// `append` returns whether the frame was accepted; rejected frames
/// (backpressure, non-advancing timestamps) are dropped, never fatal.
/// After `finalize` the sink is unusable.
pub trait EncoderSink: Send {
    /// Whether the encoder can take more data right now
    fn is_ready(&self) -> bool;

    /// Append one frame; false means it was dropped
    fn append(&mut self, frame: &PixelFrame, mode: AppendMode) -> bool;

    /// Flush and close the container
    fn finalize(&mut self) -> Result<(), EncoderError>;

    /// Canvas dimensions fixed at open time
    fn dimensions(&self) -> (u32, u32);

    /// Where the finished clip lands
    fn output_path(&self) -> &Path;

    /// Frames accepted so far
    fn frame_count(&self) -> u64;
}

/// Monotonicity gate for presentation timestamps
///
/// The container only accepts strictly increasing times; anything else is
/// reported so the caller can drop the frame.
#[derive(Debug, Default)]
pub struct PtsGate {
    last: Option<Duration>,
}

impl PtsGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a timestamp if it advances past the last accepted one
    pub fn admit(&mut self, pts: Duration) -> Result<(), EncoderError> {
        if let Some(last) = self.last {
            if pts <= last {
                return Err(EncoderError::AppendRejected(format!(
                    "non-monotonic pts {pts:?} (last accepted {last:?})"
                )));
            }
        }
        self.last = Some(pts);
        Ok(())
    }

    pub fn last(&self) -> Option<Duration> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_admits_increasing_timestamps() {
        let mut gate = PtsGate::new();
        assert!(gate.admit(Duration::from_millis(0)).is_ok());
        assert!(gate.admit(Duration::from_millis(33)).is_ok());
        assert!(gate.admit(Duration::from_millis(66)).is_ok());
        assert_eq!(gate.last(), Some(Duration::from_millis(66)));
    }

    #[test]
    fn test_gate_rejects_stalls_and_rewinds() {
        let mut gate = PtsGate::new();
        gate.admit(Duration::from_millis(100)).unwrap();

        let stall = gate.admit(Duration::from_millis(100));
        assert!(matches!(stall, Err(EncoderError::AppendRejected(_))));

        let rewind = gate.admit(Duration::from_millis(50));
        assert!(matches!(rewind, Err(EncoderError::AppendRejected(_))));

        // A rejected frame never advances the gate.
        assert_eq!(gate.last(), Some(Duration::from_millis(100)));

        assert!(gate.admit(Duration::from_millis(101)).is_ok());
    }
}
