//! Recording orchestrator
//!
//! The detection-triggered state machine. All session state lives inside a
//! single actor task; detections, interrupts, and shutdown arrive as
//! commands through a mailbox, and every call into the encoder sink happens
//! on that one control timeline. Presence is debounced: a session spans the
//! first qualifying detection through one quiescence window after the last,
//! so noisy frame-by-frame detections never fragment one real event into
//! many short clips.

use super::state::{ClipInfo, RecorderConfig, RecordingState};
use crate::detector::DetectionResult;
use crate::render::FrameRenderer;
use crate::sink::{AppendMode, EncoderError, EncoderSink, FfmpegEncoderSink};
use crate::surface::RecordingSurface;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use uuid::Uuid;

/// Orchestrator failure
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("a recording session is already open")]
    SessionAlreadyOpen,

    #[error("recording surface has no content to size a session")]
    SurfaceEmpty,

    #[error(transparent)]
    Encoder(#[from] EncoderError),
}

/// Commands marshalled onto the control timeline
#[derive(Debug)]
enum Command {
    /// Detector results for one frame
    Detections(DetectionResult),
    /// Source ended or the application cancelled: finalize now
    Interrupt,
    /// Finalize and exit the actor
    Shutdown,
}

/// Events emitted while recording
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    /// A session opened at the given canvas size
    SessionStarted { id: Uuid, width: u32, height: u32 },
    /// A session finalized successfully
    SessionFinished(ClipInfo),
    /// A session could not be opened or finalized
    SessionFailed { message: String },
}

/// Builds the encoder sink for a new session
///
/// Arguments: output path, canvas width/height, tick rate. Injected so
/// tests can observe sessions without an encoder process.
pub type SinkFactory =
    Box<dyn FnMut(&Path, u32, u32, u32) -> Result<Box<dyn EncoderSink>, EncoderError> + Send>;

/// One open recording session
struct ActiveSession {
    id: Uuid,
    sink: Box<dyn EncoderSink>,
    renderer: FrameRenderer,
    started_at: DateTime<Utc>,
    /// Baseline for tick deltas; seeded by the first tick after opening
    previous_tick: Option<Instant>,
    /// Accumulated presentation time
    elapsed: Duration,
    /// Watchdog deadline, re-armed by every qualifying detection
    deadline: Instant,
}

/// The detection-triggered recording state machine
pub struct RecordingOrchestrator {
    config: RecorderConfig,
    surface: RecordingSurface,
    make_sink: SinkFactory,
    state: RecordingState,
    session: Option<ActiveSession>,
    events: broadcast::Sender<RecorderEvent>,
}

/// Clonable handle to a spawned orchestrator
#[derive(Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<RecorderEvent>,
}

impl OrchestratorHandle {
    /// Feed one frame's detection results to the state machine
    pub async fn submit_detections(&self, result: DetectionResult) {
        if self.commands.send(Command::Detections(result)).await.is_err() {
            tracing::debug!("orchestrator gone, dropping detections");
        }
    }

    /// Finalize any open session immediately (source ended, user cancel)
    pub async fn interrupt(&self) {
        let _ = self.commands.send(Command::Interrupt).await;
    }

    /// Finalize and stop the actor
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.events.subscribe()
    }
}

impl RecordingOrchestrator {
    /// Create an orchestrator with an injected sink factory
    pub fn new(config: RecorderConfig, surface: RecordingSurface, make_sink: SinkFactory) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            config,
            surface,
            make_sink,
            state: RecordingState::default(),
            session: None,
            events,
        }
    }

    /// Create an orchestrator recording through ffmpeg
    pub fn with_ffmpeg(config: RecorderConfig, surface: RecordingSurface) -> Self {
        let factory: SinkFactory = Box::new(|path, width, height, fps| {
            FfmpegEncoderSink::open(path, width, height, fps)
                .map(|sink| Box::new(sink) as Box<dyn EncoderSink>)
        });
        Self::new(config, surface, factory)
    }

    /// Start the actor; all further interaction goes through the handle
    pub fn spawn(self) -> (OrchestratorHandle, JoinHandle<()>) {
        let (commands, mailbox) = mpsc::channel(64);
        let handle = OrchestratorHandle {
            commands,
            events: self.events.clone(),
        };
        let task = tokio::spawn(self.run(mailbox));
        (handle, task)
    }

    async fn run(mut self, mut mailbox: mpsc::Receiver<Command>) {
        let mut ticker = interval(self.config.tick_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let deadline = self.session.as_ref().map(|s| s.deadline);
            tokio::select! {
                command = mailbox.recv() => match command {
                    Some(Command::Detections(result)) => self.on_detections(result),
                    Some(Command::Interrupt) => self.finish_session("interrupted"),
                    Some(Command::Shutdown) | None => {
                        self.finish_session("shutting down");
                        break;
                    }
                },
                tick = ticker.tick() => self.on_tick(tick),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    tracing::info!(
                        "watchdog fired after {:?} without the watched object",
                        self.config.quiescence()
                    );
                    self.finish_session("watchdog");
                }
            }
        }
        tracing::debug!("orchestrator stopped");
    }

    /// React to one frame's detections
    ///
    /// A qualifying result opens a session when idle and re-arms the
    /// watchdog either way. Non-qualifying results change nothing — the
    /// watchdog alone decides when absence becomes the end of the event.
    fn on_detections(&mut self, result: DetectionResult) {
        if !result.contains_label(&self.config.watched_label) {
            return;
        }

        if self.state == RecordingState::Idle {
            match self.open_session() {
                Ok(()) => {}
                Err(e) => {
                    // Stay idle; the next qualifying detection retries.
                    tracing::warn!("failed to open recording session: {e}");
                    let _ = self.events.send(RecorderEvent::SessionFailed {
                        message: e.to_string(),
                    });
                    return;
                }
            }
        }

        if let Some(session) = self.session.as_mut() {
            session.deadline = Instant::now() + self.config.quiescence();
        }
    }

    fn open_session(&mut self) -> Result<(), OrchestratorError> {
        if self.session.is_some() {
            return Err(OrchestratorError::SessionAlreadyOpen);
        }
        let (width, height) = self
            .surface
            .recording_size()
            .ok_or(OrchestratorError::SurfaceEmpty)?;

        let sink = (self.make_sink)(
            &self.config.output_path,
            width,
            height,
            self.config.tick_rate,
        )?;

        let id = Uuid::new_v4();
        self.session = Some(ActiveSession {
            id,
            sink,
            renderer: FrameRenderer::new(width, height),
            started_at: Utc::now(),
            previous_tick: None,
            elapsed: Duration::ZERO,
            deadline: Instant::now() + self.config.quiescence(),
        });
        self.state = RecordingState::Recording;

        tracing::info!("recording session {id} opened at {width}x{height}");
        let _ = self
            .events
            .send(RecorderEvent::SessionStarted { id, width, height });
        Ok(())
    }

    /// One render tick: sample the surface and append a frame
    ///
    /// Frame-level failures (nothing on the surface yet, render allocation
    /// failure, rejected append) skip the frame and wait for the next tick.
    fn on_tick(&mut self, now: Instant) {
        if self.state != RecordingState::Recording {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };

        // The first tick only seeds the baseline; appending at it would
        // produce a zero-duration frame.
        let Some(previous) = session.previous_tick else {
            session.previous_tick = Some(now);
            return;
        };
        let delta = now.saturating_duration_since(previous);
        session.previous_tick = Some(now);
        if delta.is_zero() {
            return;
        }
        session.elapsed += delta;
        let pts = session.elapsed;

        let Some(snapshot) = self.surface.snapshot() else {
            return;
        };
        match session.renderer.render(&snapshot, pts) {
            Ok(frame) => {
                if !session.sink.append(&frame, AppendMode::DropIfNotReady) {
                    tracing::trace!("sink dropped frame at {pts:?}");
                }
            }
            Err(e) => tracing::debug!("render failed, skipping frame: {e}"),
        }
    }

    /// Close the current session, if any; idempotent
    fn finish_session(&mut self, reason: &str) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        self.state = RecordingState::Idle;

        tracing::info!("finalizing session {} ({reason})", session.id);
        match session.sink.finalize() {
            Ok(()) => {
                let clip = ClipInfo {
                    id: session.id,
                    path: session.sink.output_path().to_string_lossy().to_string(),
                    width: session.sink.dimensions().0,
                    height: session.sink.dimensions().1,
                    duration_ms: session.elapsed.as_secs_f64() * 1000.0,
                    frame_count: session.sink.frame_count(),
                    started_at: session.started_at,
                    finished_at: Utc::now(),
                };
                tracing::info!(
                    "session {} finished: {} frames, {:.0}ms",
                    clip.id,
                    clip.frame_count,
                    clip.duration_ms
                );
                let _ = self.events.send(RecorderEvent::SessionFinished(clip));
            }
            Err(e) => {
                tracing::error!("failed to finalize session {}: {e}", session.id);
                let _ = self.events.send(RecorderEvent::SessionFailed {
                    message: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFrame;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::time::sleep;

    #[derive(Default)]
    struct MockState {
        opens: u32,
        open_failures_remaining: u32,
        appended: Vec<Duration>,
        finalized: u32,
        finalized_at: Option<Instant>,
    }

    struct MockSink {
        state: Arc<Mutex<MockState>>,
        width: u32,
        height: u32,
        path: std::path::PathBuf,
    }

    impl EncoderSink for MockSink {
        fn is_ready(&self) -> bool {
            true
        }

        fn append(&mut self, frame: &PixelFrame, _mode: AppendMode) -> bool {
            self.state.lock().appended.push(frame.pts());
            true
        }

        fn finalize(&mut self) -> Result<(), EncoderError> {
            let mut state = self.state.lock();
            state.finalized += 1;
            state.finalized_at = Some(Instant::now());
            Ok(())
        }

        fn dimensions(&self) -> (u32, u32) {
            (self.width, self.height)
        }

        fn output_path(&self) -> &Path {
            &self.path
        }

        fn frame_count(&self) -> u64 {
            self.state.lock().appended.len() as u64
        }
    }

    fn mock_factory(state: Arc<Mutex<MockState>>) -> SinkFactory {
        Box::new(move |path, width, height, _fps| {
            let mut guard = state.lock();
            if guard.open_failures_remaining > 0 {
                guard.open_failures_remaining -= 1;
                return Err(EncoderError::OpenFailed("mock open failure".to_string()));
            }
            guard.opens += 1;
            Ok(Box::new(MockSink {
                state: state.clone(),
                width,
                height,
                path: path.to_path_buf(),
            }))
        })
    }

    fn test_config() -> RecorderConfig {
        let mut config = RecorderConfig::new("person", "/tmp/autoclip-test.mp4");
        config.tick_rate = 1;
        config
    }

    fn surface_with_frame() -> RecordingSurface {
        let surface = RecordingSurface::new();
        let frame = PixelFrame::new(64, 48, vec![0u8; 64 * 48 * 4], Duration::ZERO).unwrap();
        surface.publish(Arc::new(frame));
        surface
    }

    fn hit() -> DetectionResult {
        let json = r#"{"detections": [
            {"label": "person", "confidence": 0.92,
             "bounds": {"x": 0.2, "y": 0.2, "width": 0.3, "height": 0.6}}
        ]}"#;
        serde_json::from_str(json).unwrap()
    }

    fn miss() -> DetectionResult {
        DetectionResult::new(vec![])
    }

    fn drain(events: &mut broadcast::Receiver<RecorderEvent>) -> Vec<RecorderEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_scenario_single_clip() {
        // Detection stream [hit, hit, miss, miss, ...] at one tick per
        // second: the session opens at t=0, the watchdog is last re-armed
        // at t=1, and the clip finalizes at t=6.
        let state = Arc::new(Mutex::new(MockState::default()));
        let orchestrator = RecordingOrchestrator::new(
            test_config(),
            surface_with_frame(),
            mock_factory(state.clone()),
        );
        let (handle, task) = orchestrator.spawn();
        let mut events = handle.subscribe();

        let start = Instant::now();
        handle.submit_detections(hit()).await;
        sleep(Duration::from_secs(1)).await;
        handle.submit_detections(hit()).await;
        for _ in 0..8 {
            handle.submit_detections(miss()).await;
            sleep(Duration::from_secs(1)).await;
        }

        {
            let guard = state.lock();
            assert_eq!(guard.opens, 1, "misses must not fragment the session");
            assert_eq!(guard.finalized, 1);

            let finalized_at = guard.finalized_at.unwrap();
            let elapsed = finalized_at.saturating_duration_since(start);
            assert!(
                elapsed >= Duration::from_secs(6) && elapsed < Duration::from_millis(6500),
                "expected finalize near t=6, got {elapsed:?}"
            );

            // First tick seeded the baseline only; everything appended
            // afterwards advances strictly.
            assert!(!guard.appended.is_empty());
            assert!(guard.appended[0] > Duration::ZERO);
            assert!(guard.appended.windows(2).all(|w| w[0] < w[1]));
        }

        let seen = drain(&mut events);
        assert!(matches!(seen[0], RecorderEvent::SessionStarted { .. }));
        assert!(seen
            .iter()
            .any(|e| matches!(e, RecorderEvent::SessionFinished(_))));

        handle.shutdown().await;
        let _ = task.await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_qualifying_never_opens() {
        let state = Arc::new(Mutex::new(MockState::default()));
        let orchestrator = RecordingOrchestrator::new(
            test_config(),
            surface_with_frame(),
            mock_factory(state.clone()),
        );
        let (handle, task) = orchestrator.spawn();
        let mut events = handle.subscribe();

        let other = DetectionResult::new(vec![crate::detector::Detection {
            label: "dog".to_string(),
            confidence: 0.99,
            bounds: crate::detector::BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 1.0,
                height: 1.0,
            },
        }]);
        for _ in 0..3 {
            handle.submit_detections(other.clone()).await;
            sleep(Duration::from_secs(1)).await;
        }

        assert_eq!(state.lock().opens, 0);
        assert!(drain(&mut events).is_empty());

        handle.shutdown().await;
        let _ = task.await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_continued_presence_extends_single_session() {
        let state = Arc::new(Mutex::new(MockState::default()));
        let orchestrator = RecordingOrchestrator::new(
            test_config(),
            surface_with_frame(),
            mock_factory(state.clone()),
        );
        let (handle, task) = orchestrator.spawn();

        // Hits every 2s for 20s: well past one quiescence window, but each
        // hit re-arms the watchdog before it can fire.
        for _ in 0..10 {
            handle.submit_detections(hit()).await;
            sleep(Duration::from_secs(2)).await;
        }
        {
            let guard = state.lock();
            assert_eq!(guard.opens, 1);
            assert_eq!(guard.finalized, 0);
        }

        // Silence closes it.
        sleep(Duration::from_secs(6)).await;
        let guard = state.lock();
        assert_eq!(guard.opens, 1);
        assert_eq!(guard.finalized, 1);
        drop(guard);

        handle.shutdown().await;
        let _ = task.await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failure_stays_idle_and_retries() {
        let state = Arc::new(Mutex::new(MockState {
            open_failures_remaining: 1,
            ..Default::default()
        }));
        let orchestrator = RecordingOrchestrator::new(
            test_config(),
            surface_with_frame(),
            mock_factory(state.clone()),
        );
        let (handle, task) = orchestrator.spawn();
        let mut events = handle.subscribe();

        handle.submit_detections(hit()).await;
        sleep(Duration::from_millis(10)).await;

        let seen = drain(&mut events);
        assert!(matches!(seen[0], RecorderEvent::SessionFailed { .. }));
        assert_eq!(state.lock().opens, 0);

        // No automatic retry, but the next qualifying detection tries again.
        handle.submit_detections(hit()).await;
        sleep(Duration::from_millis(10)).await;
        assert_eq!(state.lock().opens, 1);

        handle.shutdown().await;
        let _ = task.await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_surface_fails_session_open() {
        let state = Arc::new(Mutex::new(MockState::default()));
        let orchestrator = RecordingOrchestrator::new(
            test_config(),
            RecordingSurface::new(),
            mock_factory(state.clone()),
        );
        let (handle, task) = orchestrator.spawn();
        let mut events = handle.subscribe();

        handle.submit_detections(hit()).await;
        sleep(Duration::from_millis(10)).await;

        let seen = drain(&mut events);
        assert!(matches!(seen[0], RecorderEvent::SessionFailed { .. }));
        assert_eq!(state.lock().opens, 0);

        handle.shutdown().await;
        let _ = task.await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_finalizes_immediately_and_is_idempotent() {
        let state = Arc::new(Mutex::new(MockState::default()));
        let orchestrator = RecordingOrchestrator::new(
            test_config(),
            surface_with_frame(),
            mock_factory(state.clone()),
        );
        let (handle, task) = orchestrator.spawn();

        handle.submit_detections(hit()).await;
        sleep(Duration::from_secs(2)).await;

        // Interrupt long before the watchdog would fire, then again while
        // already idle.
        handle.interrupt().await;
        handle.interrupt().await;
        sleep(Duration::from_millis(10)).await;

        {
            let guard = state.lock();
            assert_eq!(guard.finalized, 1, "finalize must run at most once");
        }

        // The watchdog deadline is gone with the session: advancing past it
        // must not finalize again.
        sleep(Duration::from_secs(10)).await;
        assert_eq!(state.lock().finalized, 1);

        handle.shutdown().await;
        let _ = task.await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_detection_while_recording_opens_no_second_session() {
        let state = Arc::new(Mutex::new(MockState::default()));
        let orchestrator = RecordingOrchestrator::new(
            test_config(),
            surface_with_frame(),
            mock_factory(state.clone()),
        );
        let (handle, task) = orchestrator.spawn();

        handle.submit_detections(hit()).await;
        sleep(Duration::from_secs(1)).await;
        handle.submit_detections(hit()).await;
        handle.submit_detections(hit()).await;
        sleep(Duration::from_secs(1)).await;

        assert_eq!(state.lock().opens, 1);

        handle.shutdown().await;
        let _ = task.await;
    }
}
