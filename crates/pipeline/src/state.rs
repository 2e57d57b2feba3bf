//! Conversation state machine states

use std::fmt;

/// State of a session's turn-taking machine
///
/// Exactly one is live per session; every change goes through the
/// controller's transition function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConversationState {
    /// Waiting for the user to speak
    #[default]
    Idle,
    /// User speech detected, audio streaming to the transcriber
    UserSpeaking,
    /// End of utterance signalled, waiting for the final transcript
    ProcessingUtterance,
    /// Generating a response, nothing synthesized yet
    Responding,
    /// Response audio playing while generation may continue
    Speaking,
    /// Barge-in confirmed, stages being cancelled
    Interrupted,
    /// Suspended by request
    Paused,
    /// Unrecoverable failure, needs a reset
    Error,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::Idle => "idle",
            ConversationState::UserSpeaking => "user_speaking",
            ConversationState::ProcessingUtterance => "processing_utterance",
            ConversationState::Responding => "responding",
            ConversationState::Speaking => "speaking",
            ConversationState::Interrupted => "interrupted",
            ConversationState::Paused => "paused",
            ConversationState::Error => "error",
        }
    }

    /// Edges of the turn-taking machine
    ///
    /// Reset and stop bypass this table: they force `Idle` from anywhere.
    pub fn can_transition_to(&self, next: ConversationState) -> bool {
        use ConversationState::*;

        if next == Error {
            return *self != Error;
        }

        matches!(
            (self, next),
            (Idle, UserSpeaking)
                | (UserSpeaking, ProcessingUtterance)
                | (UserSpeaking, Paused)
                | (ProcessingUtterance, Responding)
                | (ProcessingUtterance, Idle)
                | (Responding, Speaking)
                | (Responding, Paused)
                | (Responding, Idle)
                | (Speaking, Idle)
                | (Speaking, Interrupted)
                | (Speaking, Paused)
                | (Interrupted, UserSpeaking)
                | (Interrupted, Idle)
                | (Paused, Idle)
                | (Error, Idle)
        )
    }

    /// A pause request is honored here
    pub fn is_pausable(&self) -> bool {
        matches!(
            self,
            ConversationState::UserSpeaking
                | ConversationState::Responding
                | ConversationState::Speaking
        )
    }

    /// Audio frames are classified in these states
    pub fn accepts_audio(&self) -> bool {
        !matches!(self, ConversationState::Paused | ConversationState::Error)
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
