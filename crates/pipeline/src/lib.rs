//! Voice conversation pipeline
//!
//! Drives one spoken-dialogue session:
//! - Turn-taking state machine (`TurnController`)
//! - Audio-clock silence and barge-in timers
//! - Bounded drop-oldest frame ingest
//! - Streaming generation, synthesis and playback stages with cancellation
//! - Session runner and handle
//! - Energy VAD, text chunker, metrics recorder and tracing setup

pub mod chunker;
pub mod controller;
pub mod events;
pub mod ingest;
pub mod recorder;
pub mod session;
mod stages;
pub mod state;
pub mod telemetry;
pub mod timers;
pub mod vad;

pub use chunker::TextChunker;
pub use controller::TurnController;
pub use events::{SessionEvent, StageEvent};
pub use ingest::FrameQueue;
pub use recorder::MetricsFacadeRecorder;
pub use session::{Session, SessionHandle};
pub use state::ConversationState;
pub use telemetry::init_tracing;
pub use timers::AudioClockTimer;
pub use vad::{EnergyVad, EnergyVadConfig};

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Session is not running")]
    SessionClosed,

    #[error("Tracing setup failed: {0}")]
    Telemetry(String),
}

impl From<PipelineError> for voice_orchestrator_core::Error {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::SessionClosed => voice_orchestrator_core::Error::ChannelClosed,
            PipelineError::Telemetry(msg) => voice_orchestrator_core::Error::Config(msg),
        }
    }
}
