//! Audio output trait

use async_trait::async_trait;

use crate::{AudioChunk, ProviderError};

/// Speaker output
#[async_trait]
pub trait PlaybackSink: Send + Sync + 'static {
    /// Queue a chunk, resolving once the device accepted it
    async fn play(&self, chunk: AudioChunk) -> Result<(), ProviderError>;

    /// Stop immediately and discard unplayed audio. Idempotent.
    fn stop(&self);
}
