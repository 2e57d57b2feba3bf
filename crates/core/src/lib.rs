//! Core types and traits for the voice orchestrator
//!
//! This crate provides the types shared by the router and the pipeline:
//! - Audio frames and synthesized chunks
//! - Conversation history and turn records
//! - Task classification and provider roles
//! - Error taxonomy
//! - Collaborator traits (VAD, STT, LLM, TTS, playback, metrics)

pub mod audio;
pub mod classification;
pub mod conversation;
pub mod error;
pub mod provider;
pub mod traits;
pub mod turn;

pub use audio::{AudioChunk, AudioFrame, SampleRate};
pub use classification::{FixedTaskClassifier, TaskClassification, TaskClassifier};
pub use conversation::{ConversationHistory, HistoryPolicy, KeepAll, Message, Role};
pub use error::{Error, ProviderError, Result};
pub use provider::{ProviderRole, ProviderTier};
pub use turn::{Turn, TurnLatencies, TurnOutcome};

pub use traits::{
    AudioFrameSource, EventStream, HealthProbe, LatencyStage, MetricsRecorder, NoopMetrics,
    PlaybackSink, Responder, Synthesizer, TokenEvent, TranscriptEvent, Transcriber,
    TranscriptionSink, TranscriptionStream, VadDecision, VoiceActivityDetector,
};
