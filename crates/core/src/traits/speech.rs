//! Speech processing traits

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

use crate::{AudioChunk, AudioFrame, ProviderError};

/// Fallible stream of provider output
pub type EventStream<T> = Pin<Box<dyn Stream<Item = Result<T, ProviderError>> + Send>>;

/// Live microphone input. An error item is an unrecoverable audio failure.
pub type AudioFrameSource = Pin<Box<dyn Stream<Item = Result<AudioFrame, ProviderError>> + Send>>;

/// Incremental or final transcription result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
    pub confidence: f32,
}

impl TranscriptEvent {
    pub fn partial(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            confidence,
        }
    }

    pub fn final_result(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            confidence,
        }
    }
}

/// Audio input side of an open transcription stream
///
/// Both calls must return without waiting on the provider.
pub trait TranscriptionSink: Send + 'static {
    fn push_audio(&mut self, frame: AudioFrame) -> Result<(), ProviderError>;

    /// No more audio follows for this utterance
    fn end_of_utterance(&mut self) -> Result<(), ProviderError>;
}

/// An open transcription stream
///
/// `events` yields partial results and terminates with one `is_final` event
/// or an error. Dropping both halves releases the stream.
pub struct TranscriptionStream {
    pub sink: Box<dyn TranscriptionSink>,
    pub events: EventStream<TranscriptEvent>,
}

impl std::fmt::Debug for TranscriptionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptionStream").finish_non_exhaustive()
    }
}

/// Speech-to-Text interface
///
/// Cancelling `cancel` stops event production; it may be cancelled any number
/// of times, including after the stream finished.
#[async_trait]
pub trait Transcriber: Send + Sync + 'static {
    async fn start_stream(
        &self,
        cancel: CancellationToken,
    ) -> Result<TranscriptionStream, ProviderError>;

    /// Name for logging
    fn name(&self) -> &str;
}

/// Text-to-Speech interface
///
/// The stream ends after a chunk with `is_last = true`, on error, or when
/// `cancel` fires.
#[async_trait]
pub trait Synthesizer: Send + Sync + 'static {
    async fn synthesize(
        &self,
        text: String,
        cancel: CancellationToken,
    ) -> Result<EventStream<AudioChunk>, ProviderError>;

    fn name(&self) -> &str;
}

/// Per-frame speech classification
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VadDecision {
    pub is_speech: bool,
    pub confidence: f32,
}

impl VadDecision {
    pub fn speech(confidence: f32) -> Self {
        Self {
            is_speech: true,
            confidence,
        }
    }

    pub fn silence() -> Self {
        Self {
            is_speech: false,
            confidence: 0.0,
        }
    }
}

/// Voice activity detector
///
/// Synchronous. The only state allowed is the model's own temporal buffer,
/// cleared by `reset`.
pub trait VoiceActivityDetector: Send + 'static {
    fn classify(&mut self, frame: &AudioFrame) -> VadDecision;

    fn reset(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingSink(Arc<Mutex<Vec<u64>>>);

    impl TranscriptionSink for RecordingSink {
        fn push_audio(&mut self, frame: AudioFrame) -> Result<(), ProviderError> {
            self.0.lock().unwrap().push(frame.sequence);
            Ok(())
        }

        fn end_of_utterance(&mut self) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    struct EchoTranscriber(Arc<Mutex<Vec<u64>>>);

    #[async_trait]
    impl Transcriber for EchoTranscriber {
        async fn start_stream(
            &self,
            _cancel: CancellationToken,
        ) -> Result<TranscriptionStream, ProviderError> {
            Ok(TranscriptionStream {
                sink: Box::new(RecordingSink(self.0.clone())),
                events: Box::pin(futures::stream::iter(vec![Ok(
                    TranscriptEvent::final_result("hello", 0.9),
                )])),
            })
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn test_transcriber_object_safety() {
        use futures::StreamExt;

        let pushed = Arc::new(Mutex::new(Vec::new()));
        let stt: Arc<dyn Transcriber> = Arc::new(EchoTranscriber(pushed.clone()));
        let mut stream = stt.start_stream(CancellationToken::new()).await.unwrap();

        stream
            .sink
            .push_audio(AudioFrame::silence(crate::SampleRate::Hz16000, 10, 7))
            .unwrap();
        let event = stream.events.next().await.unwrap().unwrap();

        assert!(event.is_final);
        assert_eq!(*pushed.lock().unwrap(), vec![7]);
    }
}
