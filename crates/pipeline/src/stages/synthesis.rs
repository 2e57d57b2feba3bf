//! Per-chunk speech synthesis

use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use voice_orchestrator_core::{AudioChunk, ProviderError, ProviderRole};
use voice_orchestrator_router::RouterError;

use super::StageContext;

/// Forward audio to playback; false once cancelled or playback is gone
async fn forward(
    audio: &mpsc::Sender<AudioChunk>,
    chunk: AudioChunk,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = audio.send(chunk) => sent.is_ok(),
    }
}

/// Synthesize text chunks in arrival order
///
/// Each chunk gets its own provider selection with failover until its first
/// audio arrives. Ends when the chunk channel closes.
pub(super) async fn run(
    ctx: StageContext,
    first_audio_timeout: Duration,
    mut chunks: mpsc::Receiver<String>,
    audio: mpsc::Sender<AudioChunk>,
    cancel: CancellationToken,
) {
    loop {
        let text = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            text = chunks.recv() => match text {
                Some(text) => text,
                None => return,
            },
        };

        let started = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            started = ctx.router.with_failover(
                ProviderRole::Synthesizer,
                ctx.task,
                &ctx.route,
                first_audio_timeout,
                |selected| {
                    let text = text.clone();
                    let cancel = cancel.clone();
                    async move {
                        let synthesizer = selected.handle.synthesizer()?;
                        let mut stream = synthesizer.synthesize(text, cancel).await?;
                        let first = match stream.next().await {
                            Some(Ok(chunk)) => Some(chunk),
                            Some(Err(e)) => return Err(e),
                            None => None,
                        };
                        Ok((stream, first))
                    }
                },
            ) => started,
        };

        let (selected, (mut stream, first)) = match started {
            Ok(started) => started,
            Err(RouterError::Cancelled) => return,
            Err(e) => {
                ctx.fail(e.into());
                return;
            }
        };

        tracing::trace!(turn = ctx.turn, provider = %selected.name, chars = text.len(), "Synthesizing chunk");

        let mut next = first;
        while let Some(chunk) = next.take() {
            let is_last = chunk.is_last;
            if !chunk.audio_bytes.is_empty() && !forward(&audio, chunk, &cancel).await {
                return;
            }
            if is_last {
                break;
            }

            next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                item = stream.next() => match item {
                    Some(Ok(chunk)) => Some(chunk),
                    Some(Err(ProviderError::Cancelled)) | None => None,
                    Some(Err(e)) => {
                        tracing::warn!(
                            turn = ctx.turn,
                            provider = %selected.name,
                            error = %e,
                            "Synthesis stream failed mid-chunk"
                        );
                        ctx.router.report_failure(selected.id, &e);
                        None
                    }
                },
            };
        }
    }
}
