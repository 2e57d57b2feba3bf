//! Turn records
//!
//! A `Turn` covers one user-utterance-to-assistant-response cycle. It is built
//! up by the turn controller while the turn is live and frozen by `close`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::TaskClassification;

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    /// Response fully played
    Completed,
    /// Final transcript was empty, no response generated
    EmptyTranscript,
    /// User barged in during playback
    Interrupted,
    /// Paused, reset, stopped, or cancellation was not acknowledged in time
    Incomplete,
    /// Provider chain exhausted or audio failure
    Failed,
}

impl TurnOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnOutcome::Completed => "completed",
            TurnOutcome::EmptyTranscript => "empty_transcript",
            TurnOutcome::Interrupted => "interrupted",
            TurnOutcome::Incomplete => "incomplete",
            TurnOutcome::Failed => "failed",
        }
    }
}

/// Per-stage latencies of a turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnLatencies {
    /// End of utterance (silence timer fired) to final transcript
    pub vad_to_transcript: Option<Duration>,
    /// Final transcript to first response token
    pub transcript_to_first_token: Option<Duration>,
    /// First response token to first synthesized audio handed to playback
    pub first_token_to_first_audio: Option<Duration>,
    /// End of utterance to first synthesized audio
    pub end_to_end: Option<Duration>,
}

/// One user-utterance-to-assistant-response cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Monotonically increasing within a session, starting at 1
    pub index: u64,
    pub started_at: DateTime<Utc>,
    /// `None` while the turn is live
    pub ended_at: Option<DateTime<Utc>>,
    pub user_transcript: String,
    pub assistant_text: String,
    pub latencies: TurnLatencies,
    pub task: Option<TaskClassification>,
    pub outcome: Option<TurnOutcome>,
}

impl Turn {
    pub fn open(index: u64) -> Self {
        Self {
            index,
            started_at: Utc::now(),
            ended_at: None,
            user_transcript: String::new(),
            assistant_text: String::new(),
            latencies: TurnLatencies::default(),
            task: None,
            outcome: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Freeze the record. Closing twice keeps the first outcome.
    pub fn close(&mut self, outcome: TurnOutcome) {
        if self.is_closed() {
            return;
        }
        self.ended_at = Some(Utc::now());
        self.outcome = Some(outcome);
    }
}
