//! Per-turn stage tasks
//!
//! A turn runs up to four tasks: transcription while the user speaks, then
//! generation, synthesis and playback chained by bounded channels. Every task
//! reports to the controller through `StageEvent`s tagged with its turn and
//! stops as soon as its cancellation token fires.

mod generation;
mod playback;
mod synthesis;
mod transcription;

pub(crate) use transcription::TranscriptionHandle;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;

use voice_orchestrator_core::{Error, Message, PlaybackSink, TaskClassification};
use voice_orchestrator_router::{ProviderRouter, RouteContext};

use crate::{StageEvent, TextChunker};

/// Text chunks waiting for synthesis
const CHUNK_QUEUE: usize = 16;

/// Synthesized audio waiting for playback
const AUDIO_QUEUE: usize = 32;

/// What a stage task needs to route calls and report back
#[derive(Clone)]
pub(crate) struct StageContext {
    pub turn: u64,
    pub router: Arc<ProviderRouter>,
    pub route: RouteContext,
    pub task: TaskClassification,
    pub events: mpsc::UnboundedSender<StageEvent>,
}

impl StageContext {
    /// Send to the controller; a closed controller means nobody is listening
    pub fn emit(&self, event: StageEvent) {
        let _ = self.events.send(event);
    }

    pub fn fail(&self, error: Error) {
        tracing::warn!(turn = self.turn, error = %error, "Stage failed");
        self.emit(StageEvent::Failed {
            turn: self.turn,
            error,
        });
    }
}

/// Timeouts and chunking for one response
#[derive(Debug, Clone)]
pub(crate) struct ResponseSettings {
    pub first_token_timeout: Duration,
    pub first_audio_timeout: Duration,
    pub chunk_max_chars: usize,
    pub chunk_min_clause_chars: usize,
}

/// Generation, synthesis and playback for one turn
pub(crate) struct ResponseHandle {
    cancel: CancellationToken,
    generation: JoinHandle<String>,
    synthesis: JoinHandle<()>,
    playback: JoinHandle<()>,
}

impl ResponseHandle {
    pub fn spawn(
        ctx: StageContext,
        history: Vec<Message>,
        settings: &ResponseSettings,
        sink: Arc<dyn PlaybackSink>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_QUEUE);
        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_QUEUE);

        let chunker = TextChunker::new(settings.chunk_max_chars, settings.chunk_min_clause_chars);

        let generation = tokio::spawn(generation::run(
            ctx.clone(),
            history,
            settings.first_token_timeout,
            chunker,
            chunk_tx,
            cancel.clone(),
        ));
        let synthesis = tokio::spawn(synthesis::run(
            ctx.clone(),
            settings.first_audio_timeout,
            chunk_rx,
            audio_tx,
            cancel.clone(),
        ));
        let playback = tokio::spawn(playback::run(ctx, sink, audio_rx, cancel.clone()));

        Self {
            cancel,
            generation,
            synthesis,
            playback,
        }
    }

    /// Signal every task to stop; safe to call repeatedly
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn abort_handles(&self) -> [AbortHandle; 3] {
        [
            self.generation.abort_handle(),
            self.synthesis.abort_handle(),
            self.playback.abort_handle(),
        ]
    }

    /// Wait for all three tasks; yields the generated text
    pub async fn join(self) -> String {
        let text = self.generation.await.unwrap_or_default();
        let _ = self.synthesis.await;
        let _ = self.playback.await;
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;
    use parking_lot::Mutex;
    use voice_orchestrator_core::{
        AudioChunk, EventStream, ProviderError, Responder, Synthesizer, TokenEvent,
    };
    use voice_orchestrator_router::ProviderRegistration;

    /// Emits one token then waits for cancellation
    struct EndlessResponder;

    #[async_trait]
    impl Responder for EndlessResponder {
        async fn generate(
            &self,
            _history: Vec<Message>,
            _task: TaskClassification,
            cancel: CancellationToken,
        ) -> Result<EventStream<TokenEvent>, ProviderError> {
            let first = futures::stream::once(async {
                Ok::<_, ProviderError>(TokenEvent::delta("Thinking. "))
            });
            let rest = futures::stream::once(async move {
                cancel.cancelled().await;
                Err(ProviderError::Cancelled)
            });
            Ok(Box::pin(first.chain(rest)))
        }

        fn name(&self) -> &str {
            "endless"
        }
    }

    struct EchoSynthesizer;

    #[async_trait]
    impl Synthesizer for EchoSynthesizer {
        async fn synthesize(
            &self,
            text: String,
            _cancel: CancellationToken,
        ) -> Result<EventStream<AudioChunk>, ProviderError> {
            let chunk = AudioChunk::new(text.into_bytes(), true);
            Ok(Box::pin(futures::stream::once(async move {
                Ok::<_, ProviderError>(chunk)
            })))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        played: Mutex<Vec<AudioChunk>>,
    }

    #[async_trait]
    impl PlaybackSink for CollectingSink {
        async fn play(&self, chunk: AudioChunk) -> Result<(), ProviderError> {
            self.played.lock().push(chunk);
            Ok(())
        }

        fn stop(&self) {}
    }

    #[tokio::test]
    async fn test_cancel_twice_then_join() {
        let router = Arc::new(ProviderRouter::default());
        router
            .register(ProviderRegistration::responder("r", Arc::new(EndlessResponder), 1))
            .unwrap();
        router
            .register(ProviderRegistration::synthesizer("s", Arc::new(EchoSynthesizer), 1))
            .unwrap();

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let ctx = StageContext {
            turn: 1,
            router,
            route: RouteContext::default(),
            task: TaskClassification::PrimaryDialogue,
            events: events_tx,
        };
        let settings = ResponseSettings {
            first_token_timeout: Duration::from_secs(1),
            first_audio_timeout: Duration::from_secs(1),
            chunk_max_chars: 100,
            chunk_min_clause_chars: 20,
        };
        let sink = Arc::new(CollectingSink::default());
        let handle = ResponseHandle::spawn(ctx, vec![Message::user("hi")], &settings, sink.clone());

        // Played audio proves the whole chain ran
        loop {
            match events_rx.recv().await {
                Some(StageEvent::FirstAudio { .. }) => break,
                Some(_) => continue,
                None => panic!("stage events closed early"),
            }
        }

        handle.cancel();
        handle.cancel();
        let text = tokio::time::timeout(Duration::from_secs(1), handle.join())
            .await
            .unwrap();
        assert_eq!(text, "Thinking. ");
    }
}
