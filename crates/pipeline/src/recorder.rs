//! Metrics recorder backed by the `metrics` facade
//!
//! Emits through whatever global recorder the host installed (a Prometheus
//! exporter in production). With no recorder installed every call is a no-op.

use std::time::Duration;

use voice_orchestrator_core::{LatencyStage, MetricsRecorder, Turn, TurnOutcome};

pub const STAGE_LATENCY: &str = "voice_orchestrator_stage_latency_seconds";
pub const TURNS_TOTAL: &str = "voice_orchestrator_turns_total";
pub const FRAMES_DROPPED_TOTAL: &str = "voice_orchestrator_frames_dropped_total";
pub const STATE_VIOLATIONS_TOTAL: &str = "voice_orchestrator_state_violations_total";

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsFacadeRecorder;

impl MetricsFacadeRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Register metric descriptions with the installed recorder
    pub fn describe() {
        metrics::describe_histogram!(
            STAGE_LATENCY,
            metrics::Unit::Seconds,
            "Per-stage turn latency"
        );
        metrics::describe_counter!(TURNS_TOTAL, "Closed turns by outcome");
        metrics::describe_counter!(
            FRAMES_DROPPED_TOTAL,
            "Audio frames dropped by the ingest queue"
        );
        metrics::describe_counter!(
            STATE_VIOLATIONS_TOTAL,
            "Events ignored because they were invalid for the current state"
        );
    }
}

impl MetricsRecorder for MetricsFacadeRecorder {
    fn record_latency(&self, stage: LatencyStage, duration: Duration) {
        metrics::histogram!(STAGE_LATENCY, "stage" => stage.as_str()).record(duration.as_secs_f64());
    }

    fn record_turn_complete(&self, turn: &Turn) {
        let outcome = turn.outcome.unwrap_or(TurnOutcome::Incomplete);
        metrics::counter!(TURNS_TOTAL, "outcome" => outcome.as_str()).increment(1);
    }

    fn record_frames_dropped(&self, count: u64) {
        metrics::counter!(FRAMES_DROPPED_TOTAL).increment(count);
    }

    fn record_state_violation(&self, state: &str) {
        metrics::counter!(STATE_VIOLATIONS_TOTAL, "state" => state.to_string()).increment(1);
    }
}
