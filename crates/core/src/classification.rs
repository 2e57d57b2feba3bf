//! Task classification for responder routing

use serde::{Deserialize, Serialize};

use crate::{ConversationHistory, ProviderTier};

/// Label attached to each responder invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskClassification {
    /// Regular spoken back-and-forth
    #[default]
    PrimaryDialogue,
    /// Condensing earlier conversation
    Summarization,
    /// Evaluating the user's answer
    Assessment,
}

impl TaskClassification {
    /// Fixed mapping from task label to the tier the router prefers
    pub fn preferred_tier(&self) -> ProviderTier {
        match self {
            TaskClassification::PrimaryDialogue => ProviderTier::Standard,
            TaskClassification::Summarization => ProviderTier::Economy,
            TaskClassification::Assessment => ProviderTier::Premium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskClassification::PrimaryDialogue => "primary_dialogue",
            TaskClassification::Summarization => "summarization",
            TaskClassification::Assessment => "assessment",
        }
    }
}

/// Classifies a finished user utterance
///
/// Plug-in point for routing heuristics; the orchestrator calls it once per
/// turn, right before acquiring a responder.
pub trait TaskClassifier: Send + Sync + 'static {
    fn classify(&self, utterance: &str, history: &ConversationHistory) -> TaskClassification;
}

/// Always returns the same label
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedTaskClassifier(pub TaskClassification);

impl TaskClassifier for FixedTaskClassifier {
    fn classify(&self, _utterance: &str, _history: &ConversationHistory) -> TaskClassification {
        self.0
    }
}
