//! Error types for the orchestrator

use thiserror::Error;

use crate::ProviderRole;

/// Failure reported by a provider collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Handle does not serve role {0}")]
    RoleMismatch(ProviderRole),

    #[error("{0}")]
    Other(String),
}

/// Session-level error taxonomy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Every candidate in the failover chain failed or was filtered out
    #[error("No {role} provider available")]
    ProviderUnavailable { role: ProviderRole },

    /// A single candidate missed its first-output deadline
    #[error("{role} provider {provider} timed out after {after_ms}ms")]
    ProviderTimeout {
        role: ProviderRole,
        provider: String,
        after_ms: u64,
    },

    #[error("Empty transcript")]
    EmptyTranscript,

    /// Stages did not acknowledge cancellation in time
    #[error("Cancellation not acknowledged within {waited_ms}ms")]
    CancellationTimeout { waited_ms: u64 },

    #[error("Event {event} is not valid in state {state}")]
    StateMachineViolation { state: String, event: String },

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Playback error: {0}")]
    Playback(String),

    /// Work abandoned because its turn was cancelled
    #[error("Cancelled")]
    Cancelled,

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the session keeps running after this error
    ///
    /// Only chain exhaustion and audio failures move the session to `Error`.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::ProviderTimeout { .. }
            | Error::EmptyTranscript
            | Error::CancellationTimeout { .. }
            | Error::StateMachineViolation { .. }
            | Error::Cancelled => true,
            Error::ProviderUnavailable { .. }
            | Error::Audio(_)
            | Error::Playback(_)
            | Error::ChannelClosed
            | Error::Config(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
