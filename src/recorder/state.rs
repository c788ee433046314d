//! Recording state and session records
//!
//! Defines the externally observable recording state machine, the
//! orchestrator configuration, and the record describing a finished clip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Externally observable state of the recording orchestrator
///
/// Opening and finalizing are serialized on the orchestrator's control
/// timeline, so no intermediate state is ever visible from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No session open; a qualifying detection opens one
    Idle,
    /// A session is open and the render tick is appending frames
    Recording,
}

impl Default for RecordingState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Configuration for the recording orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderConfig {
    /// Object class that triggers and extends recording
    pub watched_label: String,

    /// Where the clip lands; overwritten by the next session
    pub output_path: PathBuf,

    /// Render tick rate in Hz (the display-refresh stand-in)
    #[serde(default = "default_tick_rate")]
    pub tick_rate: u32,

    /// How long the watched object may be absent before the session closes
    #[serde(default = "default_quiescence_ms")]
    pub quiescence_ms: u64,
}

fn default_tick_rate() -> u32 {
    30
}

fn default_quiescence_ms() -> u64 {
    5_000
}

impl RecorderConfig {
    pub fn new(watched_label: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            watched_label: watched_label.into(),
            output_path: output_path.into(),
            tick_rate: default_tick_rate(),
            quiescence_ms: default_quiescence_ms(),
        }
    }

    /// Watchdog quiescence window
    pub fn quiescence(&self) -> Duration {
        Duration::from_millis(self.quiescence_ms)
    }

    /// Interval between render ticks
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }
}

/// Description of a finished clip, carried on the session-finished event
/// for the embedding application to review or discard
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipInfo {
    /// Session id
    pub id: Uuid,

    /// Path of the finished container file
    pub path: String,

    /// Canvas width the session was opened at
    pub width: u32,

    /// Canvas height the session was opened at
    pub height: u32,

    /// Encoded duration in milliseconds
    pub duration_ms: f64,

    /// Frames the sink accepted
    pub frame_count: u64,

    /// Wall-clock session bounds
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_defaults_to_idle() {
        assert_eq!(RecordingState::default(), RecordingState::Idle);
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config: RecorderConfig = serde_json::from_str(
            r#"{"watchedLabel": "person", "outputPath": "/tmp/recording.mp4"}"#,
        )
        .unwrap();
        assert_eq!(config.watched_label, "person");
        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.quiescence(), Duration::from_secs(5));
    }

    #[test]
    fn test_tick_period() {
        let mut config = RecorderConfig::new("person", "/tmp/recording.mp4");
        config.tick_rate = 30;
        let period = config.tick_period();
        assert!(period > Duration::from_millis(33) && period < Duration::from_millis(34));
    }
}
