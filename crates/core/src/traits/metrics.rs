//! Metrics recording trait

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::Turn;

/// Latency measured within a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyStage {
    VadToTranscript,
    TranscriptToFirstToken,
    FirstTokenToFirstAudio,
    EndToEnd,
}

impl LatencyStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LatencyStage::VadToTranscript => "vad_to_transcript",
            LatencyStage::TranscriptToFirstToken => "transcript_to_first_token",
            LatencyStage::FirstTokenToFirstAudio => "first_token_to_first_audio",
            LatencyStage::EndToEnd => "end_to_end",
        }
    }
}

/// Receives latency and turn observations
///
/// Fire-and-forget: implementations must not block and cannot fail.
pub trait MetricsRecorder: Send + Sync + 'static {
    fn record_latency(&self, stage: LatencyStage, duration: Duration);

    fn record_turn_complete(&self, turn: &Turn);

    fn record_frames_dropped(&self, _count: u64) {}

    fn record_state_violation(&self, _state: &str) {}
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsRecorder for NoopMetrics {
    fn record_latency(&self, _stage: LatencyStage, _duration: Duration) {}

    fn record_turn_complete(&self, _turn: &Turn) {}
}
