//! File-decoder source
//!
//! Reads a video file through an ffmpeg rawvideo pipe and replays it in
//! real time: delivery is paced by sleeping for the presentation-time delta
//! between consecutive frames. The decode loop runs on a dedicated worker
//! thread — the only place in the pipeline allowed to block.

use super::{SourceError, SourceEvent, VideoSource};
use crate::frame::{PixelFormat, PixelFrame};
use async_trait::async_trait;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Stream metadata from ffprobe
#[derive(Debug, Clone, Copy)]
struct StreamInfo {
    width: u32,
    height: u32,
    fps: f64,
}

/// How long to wait before delivering a frame whose predecessor carried an
/// earlier presentation time
///
/// Deltas outside (0, 1) seconds are treated as a burst or a timestamp
/// discontinuity and are not slept on.
fn pacing_delay(previous_secs: f64, current_secs: f64) -> Option<Duration> {
    let delta = current_secs - previous_secs;
    if delta > 0.0 && delta < 1.0 {
        Some(Duration::from_secs_f64(delta))
    } else {
        None
    }
}

/// Probe a video file for dimensions and frame rate
fn probe_video(path: &Path) -> Result<StreamInfo, SourceError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate",
            "-of",
            "csv=p=0",
            path.to_str().unwrap_or(""),
        ])
        .output()
        .map_err(|e| SourceError::DecodeFailed(format!("failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SourceError::DecodeFailed(format!("ffprobe failed: {stderr}")));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let parts: Vec<&str> = stdout.trim().split(',').collect();
    if parts.len() < 3 {
        return Err(SourceError::DecodeFailed(format!(
            "unexpected ffprobe output: {stdout}"
        )));
    }

    let width: u32 = parts[0]
        .parse()
        .map_err(|_| SourceError::DecodeFailed("invalid width".to_string()))?;
    let height: u32 = parts[1]
        .parse()
        .map_err(|_| SourceError::DecodeFailed("invalid height".to_string()))?;

    // Frame rate arrives as a fraction ("30/1", "30000/1001").
    let fps_parts: Vec<&str> = parts[2].split('/').collect();
    let fps = if fps_parts.len() == 2 {
        let num: f64 = fps_parts[0].parse().unwrap_or(30.0);
        let den: f64 = fps_parts[1].parse().unwrap_or(1.0);
        num / den
    } else {
        parts[2].parse().unwrap_or(30.0)
    };

    Ok(StreamInfo { width, height, fps })
}

/// Video source that decodes a container file from disk
pub struct FileSource {
    path: PathBuf,
    info: Option<StreamInfo>,
    events: Option<mpsc::Sender<SourceEvent>>,
    stopped: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            info: None,
            events: None,
            stopped: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Spawn the ffmpeg decoder emitting raw BGRA frames on stdout
    fn spawn_decoder(path: &Path, info: StreamInfo) -> Result<Child, SourceError> {
        Command::new("ffmpeg")
            .args([
                "-i",
                path.to_str().unwrap_or(""),
                "-f",
                "rawvideo",
                "-pix_fmt",
                PixelFormat::Bgra32.ffmpeg_pix_fmt(),
                "-s",
                &format!("{}x{}", info.width, info.height),
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SourceError::DecodeFailed(format!("failed to start ffmpeg: {e}")))
    }

    /// Sequential read/pace/deliver loop, run on the worker thread
    fn read_loop(
        mut process: Child,
        info: StreamInfo,
        events: mpsc::Sender<SourceEvent>,
        stopped: Arc<AtomicBool>,
    ) {
        let frame_size = info.width as usize * info.height as usize * 4;
        let stdout = match process.stdout.take() {
            Some(out) => out,
            None => {
                let _ = events.blocking_send(SourceEvent::Failed(SourceError::DecodeFailed(
                    "ffmpeg produced no stdout".to_string(),
                )));
                return;
            }
        };
        let mut reader = BufReader::with_capacity(frame_size * 2, stdout);

        let mut index: u64 = 0;
        let mut previous_pts = 0.0_f64;
        loop {
            if stopped.load(Ordering::SeqCst) {
                tracing::debug!("file source stopped mid-read");
                break;
            }

            let mut buffer = vec![0u8; frame_size];
            match reader.read_exact(&mut buffer) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    let _ = events.blocking_send(SourceEvent::Completed);
                    break;
                }
                Err(e) => {
                    let _ = events.blocking_send(SourceEvent::Failed(SourceError::DecodeFailed(
                        format!("failed to read frame: {e}"),
                    )));
                    break;
                }
            }

            let pts_secs = index as f64 / info.fps;
            if let Some(delay) = pacing_delay(previous_pts, pts_secs) {
                std::thread::sleep(delay);
            }
            previous_pts = pts_secs;
            index += 1;

            let frame = match PixelFrame::new(
                info.width,
                info.height,
                buffer,
                Duration::from_secs_f64(pts_secs),
            ) {
                Some(frame) => Arc::new(frame),
                None => continue,
            };
            if events.blocking_send(SourceEvent::Frame(frame)).is_err() {
                // Listener went away; nothing left to deliver to.
                break;
            }
        }

        let _ = process.kill();
        let _ = process.wait();
    }
}

#[async_trait]
impl VideoSource for FileSource {
    async fn configure(&mut self, events: mpsc::Sender<SourceEvent>) -> Result<(), SourceError> {
        if !self.path.is_file() {
            return Err(SourceError::ConfigInvalid(format!(
                "no such file: {}",
                self.path.display()
            )));
        }

        let info = probe_video(&self.path)?;
        tracing::info!(
            "file source configured: {} ({}x{} @ {:.2}fps)",
            self.path.display(),
            info.width,
            info.height,
            info.fps
        );

        let _ = events
            .send(SourceEvent::ContentSize {
                width: info.width,
                height: info.height,
            })
            .await;

        self.info = Some(info);
        self.events = Some(events);
        Ok(())
    }

    fn start(&mut self) -> Result<(), SourceError> {
        let info = self
            .info
            .ok_or_else(|| SourceError::ConfigInvalid("source not configured".to_string()))?;
        let events = self
            .events
            .take()
            .ok_or_else(|| SourceError::ConfigInvalid("source already started".to_string()))?;

        let process = Self::spawn_decoder(&self.path, info)?;
        let stopped = self.stopped.clone();
        let handle = std::thread::spawn(move || {
            Self::read_loop(process, info, events, stopped);
        });
        self.worker = Some(handle);

        tracing::info!("file source started: {}", self.path.display());
        Ok(())
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        tracing::info!("file source stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacing_sleeps_on_small_positive_delta() {
        let delay = pacing_delay(0.0, 0.5).unwrap();
        assert!(delay >= Duration::from_millis(400));
        assert!(delay < Duration::from_millis(600));
    }

    #[test]
    fn test_pacing_skips_discontinuities() {
        // Burst: timestamps going backwards or standing still.
        assert!(pacing_delay(0.5, 0.5).is_none());
        assert!(pacing_delay(0.5, 0.2).is_none());
        // Discontinuity: a jump of a second or more.
        assert!(pacing_delay(0.0, 1.2).is_none());
        assert!(pacing_delay(0.0, 1.0).is_none());
    }

    #[tokio::test]
    async fn test_configure_unreachable_path_fails_before_start() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut source = FileSource::new("/nonexistent/clip.mp4");

        let err = source.configure(tx).await.err().unwrap();
        assert!(matches!(err, SourceError::ConfigInvalid(_)));

        // No event was delivered and the source refuses to start.
        assert!(rx.try_recv().is_err());
        assert!(source.start().is_err());
    }
}
