//! Conversation history used as responder context

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// User utterance (final transcript)
    User,
    /// Assistant response
    Assistant,
    /// System instructions
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A role-tagged message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Turn that produced this message, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_index: Option<u64>,
    /// Assistant message cut short by barge-in, pause or failure
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub interrupted: bool,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            turn_index: None,
            interrupted: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn with_turn(mut self, turn_index: u64) -> Self {
        self.turn_index = Some(turn_index);
        self
    }

    pub fn interrupted(mut self) -> Self {
        self.interrupted = true;
        self
    }
}

/// Bounds the context handed to the responder
///
/// Truncation strategies live outside the orchestrator; the history applies
/// whatever policy the session was built with after every append.
pub trait HistoryPolicy: Send + Sync + 'static {
    fn truncate(&self, messages: &mut Vec<Message>);
}

/// Never truncates
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAll;

impl HistoryPolicy for KeepAll {
    fn truncate(&self, _messages: &mut Vec<Message>) {}
}

/// Ordered, append-only message log
pub struct ConversationHistory {
    messages: Vec<Message>,
    policy: Box<dyn HistoryPolicy>,
    /// Total messages ever appended, unaffected by truncation
    appended: usize,
}

impl std::fmt::Debug for ConversationHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationHistory")
            .field("messages", &self.messages.len())
            .field("appended", &self.appended)
            .finish()
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::with_policy(KeepAll)
    }

    pub fn with_policy(policy: impl HistoryPolicy) -> Self {
        Self {
            messages: Vec::new(),
            policy: Box::new(policy),
            appended: 0,
        }
    }

    /// Seed with a system prompt
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.append(Message::system(prompt));
        self
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
        self.appended += 1;
        self.policy.truncate(&mut self.messages);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Owned copy for handing to a responder stream
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn appended_count(&self) -> usize {
        self.appended
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}
