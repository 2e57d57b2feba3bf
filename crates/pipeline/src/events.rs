//! Session and stage events

use voice_orchestrator_core::{Error, Turn};

use crate::ConversationState;

/// Broadcast to session subscribers
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged {
        from: ConversationState,
        to: ConversationState,
    },
    PartialTranscript {
        turn: u64,
        text: String,
    },
    FinalTranscript {
        turn: u64,
        text: String,
    },
    /// Response text as it is generated
    ResponseDelta {
        turn: u64,
        text: String,
    },
    /// User interrupted playback
    BargeIn {
        turn: u64,
    },
    /// A turn was closed, with its final record
    TurnCompleted(Turn),
    /// The ingest queue dropped frames since the last report
    FramesDropped {
        count: u64,
    },
    /// The session entered `Error`
    Error(Error),
}

/// Reported by a turn's stage tasks to the controller
///
/// Every event carries the turn index it belongs to; the controller drops
/// events whose turn is no longer current.
#[derive(Debug, Clone)]
pub enum StageEvent {
    PartialTranscript { turn: u64, text: String },
    FinalTranscript { turn: u64, text: String },
    /// First non-empty response token
    FirstToken { turn: u64 },
    ResponseDelta { turn: u64, text: String },
    /// First text chunk handed to synthesis
    FirstChunk { turn: u64 },
    /// Generation ended; `text` is everything generated
    GenerationFinished { turn: u64, text: String, chunks: usize },
    /// First synthesized audio handed to playback
    FirstAudio { turn: u64 },
    /// Every synthesized chunk has been played
    PlaybackFinished { turn: u64 },
    /// A stage cannot continue
    Failed { turn: u64, error: Error },
}

impl StageEvent {
    pub fn turn(&self) -> u64 {
        match self {
            StageEvent::PartialTranscript { turn, .. }
            | StageEvent::FinalTranscript { turn, .. }
            | StageEvent::FirstToken { turn }
            | StageEvent::ResponseDelta { turn, .. }
            | StageEvent::FirstChunk { turn }
            | StageEvent::GenerationFinished { turn, .. }
            | StageEvent::FirstAudio { turn }
            | StageEvent::PlaybackFinished { turn }
            | StageEvent::Failed { turn, .. } => *turn,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StageEvent::PartialTranscript { .. } => "partial_transcript",
            StageEvent::FinalTranscript { .. } => "final_transcript",
            StageEvent::FirstToken { .. } => "first_token",
            StageEvent::ResponseDelta { .. } => "response_delta",
            StageEvent::FirstChunk { .. } => "first_chunk",
            StageEvent::GenerationFinished { .. } => "generation_finished",
            StageEvent::FirstAudio { .. } => "first_audio",
            StageEvent::PlaybackFinished { .. } => "playback_finished",
            StageEvent::Failed { .. } => "stage_failed",
        }
    }
}
