//! Detection-triggered recording
//!
//! The orchestrator actor owns the session lifecycle: a qualifying
//! detection opens a session, a quiescence watchdog closes it, and a
//! render tick drives frames from the surface into the encoder sink.

pub mod orchestrator;
pub mod state;

pub use orchestrator::{
    OrchestratorError, OrchestratorHandle, RecorderEvent, RecordingOrchestrator, SinkFactory,
};
pub use state::{ClipInfo, RecorderConfig, RecordingState};
