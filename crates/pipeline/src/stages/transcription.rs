//! Streaming transcription with replaying failover

use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use voice_orchestrator_core::{
    AudioFrame, ProviderError, ProviderRole, TranscriptionSink, TranscriptionStream,
};
use voice_orchestrator_router::{ProviderId, SelectedProvider};

use super::StageContext;
use crate::StageEvent;

enum Input {
    Frame(AudioFrame),
    EndOfUtterance,
}

/// Controller side of a running transcription
///
/// Frames are buffered for the whole utterance so a replacement provider can
/// be replayed everything the failed one had received. The buffer is bounded
/// by the maximum utterance length.
pub(crate) struct TranscriptionHandle {
    input: mpsc::UnboundedSender<Input>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TranscriptionHandle {
    pub fn spawn(ctx: StageContext, first_byte_timeout: Duration) -> Self {
        let (input, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(ctx, rx, first_byte_timeout, cancel.clone()));
        Self {
            input,
            cancel,
            task,
        }
    }

    pub fn push(&self, frame: AudioFrame) {
        let _ = self.input.send(Input::Frame(frame));
    }

    pub fn end_of_utterance(&self) {
        let _ = self.input.send(Input::EndOfUtterance);
    }

    /// Safe to call repeatedly
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.task.abort_handle()
    }

    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// Give up on the current provider
fn abandon(
    ctx: &StageContext,
    selected: &SelectedProvider,
    attempt: &CancellationToken,
    error: ProviderError,
) {
    tracing::warn!(
        turn = ctx.turn,
        provider = %selected.name,
        error = %error,
        "Transcription provider failed, trying next candidate"
    );
    attempt.cancel();
    ctx.router.report_failure(selected.id, &error);
}

fn replay(
    sink: &mut dyn TranscriptionSink,
    frames: &[AudioFrame],
    ended: bool,
) -> Result<(), ProviderError> {
    for frame in frames {
        sink.push_audio(frame.clone())?;
    }
    if ended {
        sink.end_of_utterance()?;
    }
    Ok(())
}

/// Discard audio until the utterance ends; false if it never does
async fn await_end_of_utterance(
    input: &mut mpsc::UnboundedReceiver<Input>,
    cancel: &CancellationToken,
) -> bool {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            next = input.recv() => match next {
                Some(Input::Frame(_)) => continue,
                Some(Input::EndOfUtterance) => return true,
                None => return false,
            },
        }
    }
}

async fn run(
    ctx: StageContext,
    mut input: mpsc::UnboundedReceiver<Input>,
    timeout: Duration,
    cancel: CancellationToken,
) {
    let timeout_ms = timeout.as_millis() as u64;
    let mut buffered: Vec<AudioFrame> = Vec::new();
    let mut ended = false;
    let mut tried: Vec<ProviderId> = Vec::new();

    'provider: loop {
        let selected = match ctx.router.acquire_excluding(
            ProviderRole::Transcriber,
            ctx.task,
            &ctx.route,
            &tried,
        ) {
            Ok(selected) => selected,
            Err(e) => {
                ctx.fail(e.into());
                return;
            }
        };
        tried.push(selected.id);

        let attempt = cancel.child_token();
        let transcriber = match selected.handle.transcriber() {
            Ok(t) => t,
            Err(e) => {
                abandon(&ctx, &selected, &attempt, e);
                continue;
            }
        };

        tracing::debug!(turn = ctx.turn, provider = %selected.name, "Opening transcription stream");

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            opened = tokio::time::timeout(timeout, transcriber.start_stream(attempt.clone())) => opened,
        };
        let TranscriptionStream {
            mut sink,
            mut events,
        } = match opened {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                abandon(&ctx, &selected, &attempt, e);
                continue;
            }
            Err(_) => {
                abandon(&ctx, &selected, &attempt, ProviderError::Timeout(timeout_ms));
                continue;
            }
        };

        if let Err(e) = replay(sink.as_mut(), &buffered, ended) {
            abandon(&ctx, &selected, &attempt, e);
            continue;
        }

        // The final result is due within `timeout` of the end of the utterance
        let mut deadline = ended.then(|| Instant::now() + timeout);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                event = events.next() => match event {
                    Some(Ok(event)) if event.is_final => {
                        ctx.router.report_success(selected.id);
                        if !ended {
                            tracing::debug!(turn = ctx.turn, "Final transcript before end of utterance, holding it");
                            drop(sink);
                            if !await_end_of_utterance(&mut input, &cancel).await {
                                return;
                            }
                        }
                        ctx.emit(StageEvent::FinalTranscript {
                            turn: ctx.turn,
                            text: event.text,
                        });
                        return;
                    }
                    Some(Ok(event)) => ctx.emit(StageEvent::PartialTranscript {
                        turn: ctx.turn,
                        text: event.text,
                    }),
                    Some(Err(ProviderError::Cancelled)) => return,
                    Some(Err(e)) => {
                        abandon(&ctx, &selected, &attempt, e);
                        continue 'provider;
                    }
                    None => {
                        let e = ProviderError::Stream("ended without a final result".to_string());
                        abandon(&ctx, &selected, &attempt, e);
                        continue 'provider;
                    }
                },
                next = input.recv() => match next {
                    Some(Input::Frame(frame)) => {
                        buffered.push(frame.clone());
                        if let Err(e) = sink.push_audio(frame) {
                            abandon(&ctx, &selected, &attempt, e);
                            continue 'provider;
                        }
                    }
                    Some(Input::EndOfUtterance) => {
                        ended = true;
                        deadline = Some(Instant::now() + timeout);
                        if let Err(e) = sink.end_of_utterance() {
                            abandon(&ctx, &selected, &attempt, e);
                            continue 'provider;
                        }
                    }
                    None => return,
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    abandon(&ctx, &selected, &attempt, ProviderError::Timeout(timeout_ms));
                    continue 'provider;
                }
            }
        }
    }
}
