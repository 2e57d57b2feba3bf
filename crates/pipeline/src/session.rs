//! Session runner
//!
//! One task per session owns the `TurnController` and is its only caller.
//! Audio arrives through a drop-oldest queue so producers never wait on the
//! controller; commands and stage events are served ahead of audio.

use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use voice_orchestrator_core::{AudioFrame, AudioFrameSource, Message, Turn};
use voice_orchestrator_router::RouteContext;

use crate::{ConversationState, FrameQueue, PipelineError, SessionEvent, TurnController};

enum Command {
    Pause,
    Resume,
    Reset,
    SetRouteContext(RouteContext),
    AudioFailure(String),
    History(oneshot::Sender<Vec<Message>>),
    Turns(oneshot::Sender<Vec<Turn>>),
    Stop,
}

/// Starts session tasks
pub struct Session;

impl Session {
    /// Run `controller` on its own task
    pub fn spawn(controller: TurnController) -> SessionHandle {
        let id = Uuid::new_v4();
        let queue = Arc::new(FrameQueue::new(controller.frame_queue_capacity()));
        let (commands, command_rx) = mpsc::unbounded_channel();
        let state = controller.watch_state();
        let events = controller.event_sender();

        let span = tracing::info_span!("session", session_id = %id);
        let task = tokio::spawn(run(controller, queue.clone(), command_rx).instrument(span));

        tracing::info!(session_id = %id, "Session started");

        SessionHandle {
            id,
            commands,
            queue,
            state,
            events,
            task: Mutex::new(Some(task)),
            sources: Mutex::new(Vec::new()),
        }
    }
}

async fn run(
    mut controller: TurnController,
    queue: Arc<FrameQueue>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    controller.start();

    loop {
        tokio::select! {
            biased;
            command = commands.recv() => match command {
                Some(Command::Stop) | None => break,
                Some(command) => apply(&mut controller, command).await,
            },
            Some(event) = controller.next_stage_event() => {
                controller.on_stage_event(event).await;
            }
            frame = queue.pop() => match frame {
                Some(frame) => {
                    controller.report_frames_dropped(queue.take_dropped());
                    controller.on_frame(frame).await;
                }
                None => break,
            },
        }
    }

    queue.close();
    controller.shutdown().await;
    tracing::info!("Session stopped");
}

async fn apply(controller: &mut TurnController, command: Command) {
    match command {
        Command::Pause => controller.pause().await,
        Command::Resume => controller.resume(),
        Command::Reset => controller.reset().await,
        Command::SetRouteContext(route) => controller.set_route_context(route),
        Command::AudioFailure(message) => controller.report_audio_failure(message).await,
        Command::History(reply) => {
            let _ = reply.send(controller.history().snapshot());
        }
        Command::Turns(reply) => {
            let _ = reply.send(controller.turns().to_vec());
        }
        Command::Stop => {}
    }
}

/// Handle to a running session
pub struct SessionHandle {
    id: Uuid,
    commands: mpsc::UnboundedSender<Command>,
    queue: Arc<FrameQueue>,
    state: watch::Receiver<ConversationState>,
    events: broadcast::Sender<SessionEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
    sources: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Enqueue a frame without waiting; false once the session stopped
    pub fn push_frame(&self, frame: AudioFrame) -> bool {
        self.queue.push(frame)
    }

    /// Forward every frame from `source`; an error item fails the session
    pub fn attach_source(&self, mut source: AudioFrameSource) {
        let queue = self.queue.clone();
        let commands = self.commands.clone();

        let forwarder = tokio::spawn(async move {
            while let Some(item) = source.next().await {
                match item {
                    Ok(frame) => {
                        if !queue.push(frame) {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Audio source failed");
                        let _ = commands.send(Command::AudioFailure(e.to_string()));
                        return;
                    }
                }
            }
            tracing::debug!("Audio source ended");
        });

        self.sources.lock().push(forwarder);
    }

    pub fn pause(&self) -> Result<(), PipelineError> {
        self.send(Command::Pause)
    }

    pub fn resume(&self) -> Result<(), PipelineError> {
        self.send(Command::Resume)
    }

    pub fn reset(&self) -> Result<(), PipelineError> {
        self.send(Command::Reset)
    }

    pub fn set_route_context(&self, route: RouteContext) -> Result<(), PipelineError> {
        self.send(Command::SetRouteContext(route))
    }

    pub fn report_audio_failure(&self, message: impl Into<String>) -> Result<(), PipelineError> {
        self.send(Command::AudioFailure(message.into()))
    }

    /// Cancel every stage and wait for the session task to exit
    pub async fn stop(&self) {
        for source in self.sources.lock().drain(..) {
            source.abort();
        }
        let _ = self.commands.send(Command::Stop);

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(session_id = %self.id, error = %e, "Session task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn state(&self) -> ConversationState {
        *self.state.borrow()
    }

    /// Wait until the session reaches `target`; false on timeout or stop
    pub async fn wait_for_state(&self, target: ConversationState, limit: Duration) -> bool {
        let mut state = self.state.clone();
        let reached = match tokio::time::timeout(limit, state.wait_for(|s| *s == target)).await {
            Ok(reached) => reached.is_ok(),
            Err(_) => false,
        };
        reached
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn history(&self) -> Result<Vec<Message>, PipelineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::History(reply))?;
        rx.await.map_err(|_| PipelineError::SessionClosed)
    }

    pub async fn turns(&self) -> Result<Vec<Turn>, PipelineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Turns(reply))?;
        rx.await.map_err(|_| PipelineError::SessionClosed)
    }

    fn send(&self, command: Command) -> Result<(), PipelineError> {
        self.commands
            .send(command)
            .map_err(|_| PipelineError::SessionClosed)
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        for source in self.sources.get_mut().drain(..) {
            source.abort();
        }
        let _ = self.commands.send(Command::Stop);
    }
}
