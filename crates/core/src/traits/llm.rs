//! Response generation trait

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::EventStream;
use crate::{Message, ProviderError, TaskClassification};

/// One streamed piece of generated text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TokenEvent {
    pub text_delta: String,
    pub is_last: bool,
}

impl TokenEvent {
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            text_delta: text.into(),
            is_last: false,
        }
    }

    pub fn last(text: impl Into<String>) -> Self {
        Self {
            text_delta: text.into(),
            is_last: true,
        }
    }
}

/// Language model interface
#[async_trait]
pub trait Responder: Send + Sync + 'static {
    /// Stream a response to `history`
    ///
    /// The stream ends after an `is_last` event, on error, or when `cancel`
    /// fires.
    async fn generate(
        &self,
        history: Vec<Message>,
        task: TaskClassification,
        cancel: CancellationToken,
    ) -> Result<EventStream<TokenEvent>, ProviderError>;

    fn name(&self) -> &str;
}
