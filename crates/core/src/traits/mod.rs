//! Collaborator traits consumed by the orchestrator
//!
//! ```text
//! Speech:
//!   - VoiceActivityDetector: frame -> speech / non-speech
//!   - Transcriber: audio stream -> partial and final transcripts
//!   - Synthesizer: text chunk -> audio chunks
//!
//! Generation:
//!   - Responder: history -> token deltas
//!
//! Output and observation:
//!   - PlaybackSink, MetricsRecorder, HealthProbe
//! ```

mod health;
mod llm;
mod metrics;
mod playback;
mod speech;

pub use health::HealthProbe;
pub use llm::{Responder, TokenEvent};
pub use metrics::{LatencyStage, MetricsRecorder, NoopMetrics};
pub use playback::PlaybackSink;
pub use speech::{
    AudioFrameSource, EventStream, Synthesizer, TranscriptEvent, Transcriber, TranscriptionSink,
    TranscriptionStream, VadDecision, VoiceActivityDetector,
};
