//! FFmpeg-backed encoder sink
//!
//! Raw BGRA frames go down an ffmpeg child's stdin and come out as an
//! H.264 MP4. One child per session; finalize closes stdin and waits for
//! the muxer to write the moov atom.

use super::{AppendMode, EncoderError, EncoderSink, PtsGate};
use crate::frame::{PixelFormat, PixelFrame};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::Duration;

/// How many times `WaitIfNeeded` polls readiness before giving up
const WAIT_ATTEMPTS: u32 = 5;
/// First backoff step; doubles per attempt
const WAIT_BASE: Duration = Duration::from_millis(5);

/// Check that ffmpeg can be spawned at all
pub fn ffmpeg_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Encoder sink driving an ffmpeg child process
pub struct FfmpegEncoderSink {
    process: Option<Child>,
    stdin: Option<ChildStdin>,
    output_path: PathBuf,
    width: u32,
    height: u32,
    gate: PtsGate,
    frames: u64,
    broken: bool,
    finalized: bool,
}

impl FfmpegEncoderSink {
    /// Open a sink writing a single video track at the given size
    ///
    /// Any pre-existing file at the destination is removed; an unwritable
    /// destination fails here, once, with `OpenFailed`.
    pub fn open(
        output_path: impl Into<PathBuf>,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Self, EncoderError> {
        let output_path = output_path.into();

        let parent = output_path.parent().unwrap_or_else(|| Path::new("."));
        if !parent.is_dir() {
            return Err(EncoderError::OpenFailed(format!(
                "destination directory does not exist: {}",
                parent.display()
            )));
        }
        if output_path.exists() {
            std::fs::remove_file(&output_path).map_err(|e| {
                EncoderError::OpenFailed(format!("cannot replace existing output: {e}"))
            })?;
        }

        let mut process = Command::new("ffmpeg")
            .args([
                "-y",
                "-f",
                "rawvideo",
                "-pixel_format",
                PixelFormat::Bgra32.ffmpeg_pix_fmt(),
                "-video_size",
                &format!("{width}x{height}"),
                "-framerate",
                &fps.to_string(),
                "-i",
                "-",
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-pix_fmt",
                "yuv420p",
                "-crf",
                "18",
                "-movflags",
                "+faststart",
                &output_path.to_string_lossy(),
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EncoderError::OpenFailed(format!("failed to start ffmpeg: {e}")))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| EncoderError::OpenFailed("failed to capture ffmpeg stdin".to_string()))?;

        tracing::info!(
            "encoder opened: {}x{} @ {fps}fps -> {}",
            width,
            height,
            output_path.display()
        );

        Ok(Self {
            process: Some(process),
            stdin: Some(stdin),
            output_path,
            width,
            height,
            gate: PtsGate::new(),
            frames: 0,
            broken: false,
            finalized: false,
        })
    }

    /// Poll whether the child is still alive and accepting input
    fn poll_ready(&mut self) -> bool {
        if self.finalized || self.broken || self.stdin.is_none() {
            return false;
        }
        match self.process.as_mut().map(|p| p.try_wait()) {
            // Child exited early: the pipe is dead.
            Some(Ok(Some(status))) => {
                tracing::warn!("ffmpeg exited early with {status}");
                self.broken = true;
                false
            }
            Some(Ok(None)) => true,
            Some(Err(e)) => {
                tracing::warn!("ffmpeg status check failed: {e}");
                self.broken = true;
                false
            }
            None => false,
        }
    }

    fn write_frame(&mut self, frame: &PixelFrame) -> bool {
        let Some(stdin) = self.stdin.as_mut() else {
            return false;
        };
        if let Err(e) = stdin.write_all(frame.data()) {
            tracing::warn!("failed to write frame to encoder: {e}");
            self.broken = true;
            return false;
        }
        self.frames += 1;
        true
    }
}

impl EncoderSink for FfmpegEncoderSink {
    fn is_ready(&self) -> bool {
        !self.finalized && !self.broken && self.stdin.is_some()
    }

    fn append(&mut self, frame: &PixelFrame, mode: AppendMode) -> bool {
        if (frame.width(), frame.height()) != (self.width, self.height) {
            tracing::warn!(
                "dropping frame with wrong dimensions {}x{} (want {}x{})",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            );
            return false;
        }

        let ready = match mode {
            AppendMode::DropIfNotReady => self.poll_ready(),
            AppendMode::WaitIfNeeded => {
                // Bounded backoff rather than a busy spin.
                let mut backoff = WAIT_BASE;
                let mut ready = self.poll_ready();
                for _ in 0..WAIT_ATTEMPTS {
                    if ready {
                        break;
                    }
                    if self.finalized || self.broken {
                        break;
                    }
                    std::thread::sleep(backoff);
                    backoff *= 2;
                    ready = self.poll_ready();
                }
                ready
            }
        };
        if !ready {
            tracing::debug!("encoder not ready, dropping frame at {:?}", frame.pts());
            return false;
        }

        if let Err(e) = self.gate.admit(frame.pts()) {
            // Non-monotonic input is dropped, not fatal.
            tracing::debug!("{e}");
            return false;
        }

        self.write_frame(frame)
    }

    fn finalize(&mut self) -> Result<(), EncoderError> {
        if self.finalized {
            return Err(EncoderError::FinalizeFailed(
                "sink already finalized".to_string(),
            ));
        }
        self.finalized = true;

        // EOF on stdin tells ffmpeg to flush and close the container.
        drop(self.stdin.take());

        let process = self.process.take().ok_or_else(|| {
            EncoderError::FinalizeFailed("encoder process already gone".to_string())
        })?;
        let output = process
            .wait_with_output()
            .map_err(|e| EncoderError::FinalizeFailed(format!("failed to wait for ffmpeg: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EncoderError::FinalizeFailed(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.trim().lines().last().unwrap_or_default()
            )));
        }

        tracing::info!(
            "encoder finalized: {} frames -> {}",
            self.frames,
            self.output_path.display()
        );
        Ok(())
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn output_path(&self) -> &Path {
        &self.output_path
    }

    fn frame_count(&self) -> u64 {
        self.frames
    }
}

impl Drop for FfmpegEncoderSink {
    fn drop(&mut self) {
        if let Some(mut process) = self.process.take() {
            let _ = process.kill();
            let _ = process.wait();
        }
    }
}
