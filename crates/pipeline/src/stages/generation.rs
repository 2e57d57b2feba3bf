//! Response generation and chunking

use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use voice_orchestrator_core::{Message, ProviderError, ProviderRole, TokenEvent};
use voice_orchestrator_router::RouterError;

use super::StageContext;
use crate::{StageEvent, TextChunker};

/// Hand a chunk to synthesis; false once cancelled or synthesis is gone
async fn send_chunk(
    chunks: &mpsc::Sender<String>,
    chunk: String,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = chunks.send(chunk) => sent.is_ok(),
    }
}

/// Stream the response, forwarding chunks as they complete
///
/// Failover applies until the first token arrives. After that a stream error
/// ends generation with whatever was produced. Returns the full text.
pub(super) async fn run(
    ctx: StageContext,
    history: Vec<Message>,
    first_token_timeout: Duration,
    mut chunker: TextChunker,
    chunks: mpsc::Sender<String>,
    cancel: CancellationToken,
) -> String {
    let task = ctx.task;
    let started = tokio::select! {
        biased;
        _ = cancel.cancelled() => return String::new(),
        started = ctx.router.with_failover(
            ProviderRole::Responder,
            task,
            &ctx.route,
            first_token_timeout,
            |selected| {
                let history = history.clone();
                let cancel = cancel.clone();
                async move {
                    let responder = selected.handle.responder()?;
                    let mut stream = responder.generate(history, task, cancel).await?;
                    // An empty stream is an empty response
                    let first = match stream.next().await {
                        Some(Ok(token)) => token,
                        Some(Err(e)) => return Err(e),
                        None => TokenEvent::last(""),
                    };
                    Ok((stream, first))
                }
            },
        ) => started,
    };

    let (selected, (mut stream, first)) = match started {
        Ok(started) => started,
        Err(RouterError::Cancelled) => return String::new(),
        Err(e) => {
            ctx.fail(e.into());
            return String::new();
        }
    };

    tracing::debug!(turn = ctx.turn, provider = %selected.name, "Generating response");

    let mut text = String::new();
    let mut sent = 0usize;
    let mut next = Some(first);

    'tokens: loop {
        let token = match next.take() {
            Some(token) => token,
            None => tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'tokens,
                item = stream.next() => match item {
                    Some(Ok(token)) => token,
                    Some(Err(ProviderError::Cancelled)) | None => break 'tokens,
                    Some(Err(e)) => {
                        tracing::warn!(
                            turn = ctx.turn,
                            provider = %selected.name,
                            error = %e,
                            "Response stream failed, keeping partial text"
                        );
                        ctx.router.report_failure(selected.id, &e);
                        break 'tokens;
                    }
                },
            },
        };

        if !token.text_delta.is_empty() {
            if text.is_empty() {
                ctx.emit(StageEvent::FirstToken { turn: ctx.turn });
            }
            text.push_str(&token.text_delta);
            ctx.emit(StageEvent::ResponseDelta {
                turn: ctx.turn,
                text: token.text_delta.clone(),
            });

            for chunk in chunker.push(&token.text_delta) {
                if sent == 0 {
                    ctx.emit(StageEvent::FirstChunk { turn: ctx.turn });
                }
                if !send_chunk(&chunks, chunk, &cancel).await {
                    break 'tokens;
                }
                sent += 1;
            }
        }

        if token.is_last {
            break;
        }
    }

    if cancel.is_cancelled() {
        return text;
    }

    if let Some(rest) = chunker.finish() {
        if sent == 0 {
            ctx.emit(StageEvent::FirstChunk { turn: ctx.turn });
        }
        if send_chunk(&chunks, rest, &cancel).await {
            sent += 1;
        }
    }

    tracing::debug!(turn = ctx.turn, chunks = sent, "Generation finished");
    ctx.emit(StageEvent::GenerationFinished {
        turn: ctx.turn,
        text: text.clone(),
        chunks: sent,
    });
    text
}
