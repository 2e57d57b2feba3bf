//! Playback of synthesized audio

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use voice_orchestrator_core::{AudioChunk, Error, PlaybackSink};

use super::StageContext;
use crate::StageEvent;

pub(super) async fn run(
    ctx: StageContext,
    sink: Arc<dyn PlaybackSink>,
    mut audio: mpsc::Receiver<AudioChunk>,
    cancel: CancellationToken,
) {
    let mut started = false;

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            chunk = audio.recv() => chunk,
        };

        let Some(chunk) = chunk else {
            ctx.emit(StageEvent::PlaybackFinished { turn: ctx.turn });
            return;
        };

        if !started {
            started = true;
            ctx.emit(StageEvent::FirstAudio { turn: ctx.turn });
        }

        let played = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            played = sink.play(chunk) => played,
        };
        if let Err(e) = played {
            ctx.fail(Error::Playback(e.to_string()));
            return;
        }
    }
}
