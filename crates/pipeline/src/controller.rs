//! Turn controller
//!
//! Owns the conversation state machine for one session. Audio frames, stage
//! events and commands all arrive through `&mut self` methods, so the state
//! has a single writer; the session runner serializes the calls.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;

use voice_orchestrator_config::{Settings, TimeoutConfig, TurnConfig};
use voice_orchestrator_core::{
    AudioFrame, ConversationHistory, Error, FixedTaskClassifier, LatencyStage, Message,
    MetricsRecorder, NoopMetrics, PlaybackSink, SampleRate, TaskClassification, TaskClassifier,
    Turn, TurnOutcome, VoiceActivityDetector,
};
use voice_orchestrator_router::{ProviderRouter, RouteContext};

use crate::stages::{ResponseHandle, ResponseSettings, StageContext, TranscriptionHandle};
use crate::{
    AudioClockTimer, ConversationState, EnergyVad, MetricsFacadeRecorder, SessionEvent, StageEvent,
};

const EVENT_CAPACITY: usize = 256;

/// The turn in progress and its stage tasks
struct ActiveTurn {
    record: Turn,
    transcription: Option<TranscriptionHandle>,
    response: Option<ResponseHandle>,
    /// The user message is in the history
    user_appended: bool,
    generation_done: bool,
    utterance_ended_at: Option<Instant>,
    transcript_at: Option<Instant>,
    first_token_at: Option<Instant>,
    first_audio_seen: bool,
}

impl ActiveTurn {
    fn new(index: u64, transcription: TranscriptionHandle) -> Self {
        Self {
            record: Turn::open(index),
            transcription: Some(transcription),
            response: None,
            user_appended: false,
            generation_done: false,
            utterance_ended_at: None,
            transcript_at: None,
            first_token_at: None,
            first_audio_seen: false,
        }
    }

    fn index(&self) -> u64 {
        self.record.index
    }
}

/// Conversation state machine for one session
pub struct TurnController {
    turn_config: TurnConfig,
    timeouts: TimeoutConfig,
    frame_queue_capacity: usize,
    sample_rate: SampleRate,
    rejected_frames: u64,
    state: ConversationState,
    vad: Box<dyn VoiceActivityDetector>,
    router: Arc<ProviderRouter>,
    playback: Arc<dyn PlaybackSink>,
    metrics: Arc<dyn MetricsRecorder>,
    classifier: Box<dyn TaskClassifier>,
    history: ConversationHistory,
    turns: Vec<Turn>,
    active: Option<ActiveTurn>,
    last_turn_index: u64,
    route: RouteContext,
    silence_timer: AudioClockTimer,
    utterance_timer: AudioClockTimer,
    barge_in_timer: AudioClockTimer,
    stage_tx: mpsc::UnboundedSender<StageEvent>,
    stage_rx: mpsc::UnboundedReceiver<StageEvent>,
    events: broadcast::Sender<SessionEvent>,
    state_tx: watch::Sender<ConversationState>,
}

impl TurnController {
    pub fn new(
        settings: &Settings,
        router: Arc<ProviderRouter>,
        playback: Arc<dyn PlaybackSink>,
    ) -> Self {
        let (stage_tx, stage_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (state_tx, _) = watch::channel(ConversationState::Idle);
        let turn_config = settings.turn.clone();
        let metrics: Arc<dyn MetricsRecorder> = if settings.observability.metrics_enabled {
            Arc::new(MetricsFacadeRecorder::new())
        } else {
            Arc::new(NoopMetrics)
        };

        Self {
            silence_timer: AudioClockTimer::new(turn_config.silence_threshold()),
            utterance_timer: AudioClockTimer::new(turn_config.max_utterance()),
            barge_in_timer: AudioClockTimer::new(turn_config.barge_in_window()),
            turn_config,
            timeouts: settings.timeouts.clone(),
            frame_queue_capacity: settings.ingest.frame_queue_capacity,
            sample_rate: settings.ingest.input_rate(),
            rejected_frames: 0,
            state: ConversationState::Idle,
            vad: Box::new(EnergyVad::default()),
            router,
            playback,
            metrics,
            classifier: Box::new(FixedTaskClassifier(TaskClassification::PrimaryDialogue)),
            history: ConversationHistory::new(),
            turns: Vec::new(),
            active: None,
            last_turn_index: 0,
            route: RouteContext::default(),
            stage_tx,
            stage_rx,
            events,
            state_tx,
        }
    }

    pub fn with_vad(mut self, vad: impl VoiceActivityDetector) -> Self {
        self.vad = Box::new(vad);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_classifier(mut self, classifier: impl TaskClassifier) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    /// Start from an existing history, e.g. one carrying a system prompt
    pub fn with_history(mut self, history: ConversationHistory) -> Self {
        self.history = history;
        self
    }

    pub fn with_route_context(mut self, route: RouteContext) -> Self {
        self.route = route;
        self
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Closed turns, oldest first
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn route_context(&self) -> RouteContext {
        self.route
    }

    pub fn frame_queue_capacity(&self) -> usize {
        self.frame_queue_capacity
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConversationState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<SessionEvent> {
        self.events.clone()
    }

    /// Next event from this session's stage tasks
    pub async fn next_stage_event(&mut self) -> Option<StageEvent> {
        self.stage_rx.recv().await
    }

    /// Apply stage events until `target` is reached or `limit` passes
    pub async fn process_events_until(
        &mut self,
        target: ConversationState,
        limit: Duration,
    ) -> bool {
        let deadline = Instant::now() + limit;
        while self.state != target {
            match tokio::time::timeout_at(deadline, self.stage_rx.recv()).await {
                Ok(Some(event)) => self.on_stage_event(event).await,
                _ => return false,
            }
        }
        true
    }

    /// Prepare for the first frame of a session
    pub fn start(&mut self) {
        self.vad.reset();
        self.rejected_frames = 0;
        tracing::debug!(sample_rate = self.sample_rate.as_u32(), "Turn controller started");
    }

    /// Frames dropped for arriving at the wrong sample rate
    pub fn rejected_frames(&self) -> u64 {
        self.rejected_frames
    }

    /// Feed one audio frame
    pub async fn on_frame(&mut self, frame: AudioFrame) {
        if frame.sample_rate != self.sample_rate {
            self.rejected_frames += 1;
            if self.rejected_frames == 1 {
                tracing::warn!(
                    expected = self.sample_rate.as_u32(),
                    got = frame.sample_rate.as_u32(),
                    sequence = frame.sequence,
                    "Dropping frame with unexpected sample rate"
                );
            }
            return;
        }
        if !self.state.accepts_audio() {
            return;
        }

        let decision = self.vad.classify(&frame);
        let speech = decision.is_speech && decision.confidence >= self.turn_config.speech_threshold;

        match self.state {
            ConversationState::Idle => {
                if speech {
                    self.begin_turn(frame);
                }
            }
            ConversationState::UserSpeaking => self.continue_utterance(frame, speech),
            ConversationState::Speaking => {
                let eligible = self.barge_in_timer.advance(frame.duration);
                if speech && eligible {
                    self.barge_in(frame).await;
                }
            }
            // Waiting on providers; the user is not being listened to
            ConversationState::ProcessingUtterance
            | ConversationState::Responding
            | ConversationState::Interrupted
            | ConversationState::Paused
            | ConversationState::Error => {}
        }
    }

    /// Apply an event reported by a stage task
    pub async fn on_stage_event(&mut self, event: StageEvent) {
        let current = self.active.as_ref().map(ActiveTurn::index);
        if current != Some(event.turn()) {
            tracing::debug!(
                turn = event.turn(),
                current = ?current,
                event = event.name(),
                "Dropping stale stage event"
            );
            return;
        }

        match event {
            StageEvent::PartialTranscript { turn, text } => {
                self.emit(SessionEvent::PartialTranscript { turn, text });
            }
            StageEvent::FinalTranscript { text, .. } => self.on_final_transcript(text).await,
            StageEvent::FirstToken { .. } => {
                let now = Instant::now();
                if let Some(active) = self.active.as_mut() {
                    active.first_token_at = Some(now);
                    if let Some(at) = active.transcript_at {
                        let latency = now - at;
                        active.record.latencies.transcript_to_first_token = Some(latency);
                        self.metrics
                            .record_latency(LatencyStage::TranscriptToFirstToken, latency);
                    }
                }
            }
            StageEvent::ResponseDelta { turn, text } => {
                self.emit(SessionEvent::ResponseDelta { turn, text });
            }
            StageEvent::FirstChunk { .. } => {
                self.transition(ConversationState::Speaking, "first_chunk");
            }
            StageEvent::GenerationFinished { text, chunks, .. } => {
                if let Some(active) = self.active.as_mut() {
                    active.generation_done = true;
                    active.record.assistant_text = text.clone();
                }
                if chunks == 0 {
                    if self.state == ConversationState::Responding {
                        self.complete_turn(text).await;
                    } else {
                        self.violation("generation_finished");
                    }
                }
            }
            StageEvent::FirstAudio { .. } => self.on_first_audio(),
            StageEvent::PlaybackFinished { .. } => {
                let done = self.active.as_ref().is_some_and(|a| a.generation_done);
                if self.state == ConversationState::Speaking && done {
                    let text = self
                        .active
                        .as_ref()
                        .map(|a| a.record.assistant_text.clone())
                        .unwrap_or_default();
                    self.complete_turn(text).await;
                } else {
                    self.violation("playback_finished");
                }
            }
            StageEvent::Failed { error, .. } => self.fail(error).await,
        }
    }

    /// Stop the turn in progress and hold until resumed
    pub async fn pause(&mut self) {
        if !self.state.is_pausable() {
            self.violation("pause");
            return;
        }
        self.transition(ConversationState::Paused, "pause");
        let partial = self.join_stages(true).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Stages did not stop in time while pausing");
            String::new()
        });
        self.close_turn(TurnOutcome::Incomplete, Some(partial));
    }

    pub fn resume(&mut self) {
        if self.state != ConversationState::Paused {
            self.violation("resume");
            return;
        }
        self.vad.reset();
        self.transition(ConversationState::Idle, "resume");
    }

    /// Abandon whatever is in progress and return to `Idle` from any state
    pub async fn reset(&mut self) {
        self.abandon_turn("reset").await;
        self.vad.reset();
        self.force_state(ConversationState::Idle, "reset");
    }

    /// Cancel every stage before the session ends
    pub async fn shutdown(&mut self) {
        self.abandon_turn("stop").await;
        tracing::info!(turns = self.turns.len(), "Turn controller stopped");
    }

    /// Applies from the next provider selection on
    pub fn set_route_context(&mut self, route: RouteContext) {
        tracing::info!(network = ?route.network, on_device_only = route.on_device_only, "Route context updated");
        self.route = route;
    }

    pub async fn report_audio_failure(&mut self, message: impl Into<String>) {
        self.fail(Error::Audio(message.into())).await;
    }

    /// Surface frames the ingest queue dropped
    pub fn report_frames_dropped(&mut self, count: u64) {
        if count == 0 {
            return;
        }
        tracing::debug!(count, "Ingest queue dropped frames");
        self.metrics.record_frames_dropped(count);
        self.emit(SessionEvent::FramesDropped { count });
    }

    // Turn lifecycle

    fn begin_turn(&mut self, frame: AudioFrame) {
        if !self.transition(ConversationState::UserSpeaking, "speech_detected") {
            return;
        }

        self.last_turn_index += 1;
        let index = self.last_turn_index;
        let ctx = self.stage_context(index, TaskClassification::PrimaryDialogue);
        let transcription =
            TranscriptionHandle::spawn(ctx, self.timeouts.transcription_first_byte());

        self.utterance_timer.advance(frame.duration);
        transcription.push(frame);
        self.active = Some(ActiveTurn::new(index, transcription));

        tracing::info!(turn = index, "Turn started");
    }

    fn continue_utterance(&mut self, frame: AudioFrame, speech: bool) {
        let duration = frame.duration;
        if let Some(transcription) = self.active.as_ref().and_then(|a| a.transcription.as_ref()) {
            transcription.push(frame);
        }

        let silence_elapsed = if speech {
            self.silence_timer.restart();
            false
        } else {
            self.silence_timer.advance(duration)
        };
        let too_long = self.utterance_timer.advance(duration);

        if silence_elapsed {
            self.end_utterance("silence_elapsed");
        } else if too_long {
            tracing::info!(
                max_ms = self.turn_config.max_utterance_ms,
                "Utterance reached maximum length"
            );
            self.end_utterance("max_utterance");
        }
    }

    fn end_utterance(&mut self, reason: &'static str) {
        if !self.transition(ConversationState::ProcessingUtterance, reason) {
            return;
        }
        if let Some(active) = self.active.as_mut() {
            active.utterance_ended_at = Some(Instant::now());
            if let Some(transcription) = &active.transcription {
                transcription.end_of_utterance();
            }
        }
    }

    async fn on_final_transcript(&mut self, text: String) {
        if self.state != ConversationState::ProcessingUtterance {
            self.violation("final_transcript");
            return;
        }

        let now = Instant::now();
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let index = active.index();
        active.transcript_at = Some(now);
        if let Some(ended) = active.utterance_ended_at {
            let latency = now - ended;
            active.record.latencies.vad_to_transcript = Some(latency);
            self.metrics.record_latency(LatencyStage::VadToTranscript, latency);
        }
        // The worker exits after the final; this only reaps it
        if let Some(transcription) = active.transcription.take() {
            transcription.cancel();
            transcription.join().await;
        }

        self.emit(SessionEvent::FinalTranscript {
            turn: index,
            text: text.clone(),
        });

        let text = text.trim().to_string();
        if text.is_empty() {
            tracing::info!(turn = index, "Empty transcript, no response");
            self.close_turn(TurnOutcome::EmptyTranscript, None);
            self.transition(ConversationState::Idle, "empty_transcript");
            return;
        }

        let task = self.classifier.classify(&text, &self.history);
        tracing::info!(turn = index, task = task.as_str(), "Responding");

        self.history.append(Message::user(text.clone()).with_turn(index));
        if let Some(active) = self.active.as_mut() {
            active.record.user_transcript = text;
            active.record.task = Some(task);
            active.user_appended = true;
        }

        if !self.transition(ConversationState::Responding, "final_transcript") {
            return;
        }

        let response = ResponseHandle::spawn(
            self.stage_context(index, task),
            self.history.snapshot(),
            &self.response_settings(),
            self.playback.clone(),
        );
        if let Some(active) = self.active.as_mut() {
            active.response = Some(response);
        }
    }

    fn on_first_audio(&mut self) {
        let now = Instant::now();
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.first_audio_seen {
            return;
        }
        active.first_audio_seen = true;

        if let Some(at) = active.first_token_at {
            let latency = now - at;
            active.record.latencies.first_token_to_first_audio = Some(latency);
            self.metrics
                .record_latency(LatencyStage::FirstTokenToFirstAudio, latency);
        }
        if let Some(at) = active.utterance_ended_at {
            let latency = now - at;
            active.record.latencies.end_to_end = Some(latency);
            self.metrics.record_latency(LatencyStage::EndToEnd, latency);
        }
    }

    async fn complete_turn(&mut self, text: String) {
        // Every task has already finished; this only reaps them
        if let Err(e) = self.join_stages(false).await {
            tracing::warn!(error = %e, "Stage tasks lingered after completion");
        }
        self.close_turn(TurnOutcome::Completed, Some(text));
        self.transition(ConversationState::Idle, "turn_complete");
    }

    async fn barge_in(&mut self, frame: AudioFrame) {
        let Some(index) = self.active.as_ref().map(ActiveTurn::index) else {
            return;
        };
        tracing::info!(turn = index, "Barge-in");
        self.emit(SessionEvent::BargeIn { turn: index });

        if !self.transition(ConversationState::Interrupted, "barge_in") {
            return;
        }

        match self.join_stages(true).await {
            Ok(partial) => {
                self.close_turn(TurnOutcome::Interrupted, Some(partial));
                self.begin_turn(frame);
            }
            Err(e) => {
                tracing::warn!(turn = index, error = %e, "Turn abandoned");
                self.close_turn(TurnOutcome::Incomplete, None);
                self.force_state(ConversationState::Idle, "cancellation_timeout");
            }
        }
    }

    async fn fail(&mut self, error: Error) {
        if self.state == ConversationState::Error {
            return;
        }
        tracing::error!(state = %self.state, error = %error, "Session failed");

        if let Err(e) = self.join_stages(true).await {
            tracing::warn!(error = %e, "Stages did not stop in time after failure");
        }
        self.close_turn(TurnOutcome::Failed, None);
        self.transition(ConversationState::Error, "failure");
        self.emit(SessionEvent::Error(error));
    }

    async fn abandon_turn(&mut self, reason: &'static str) {
        if self.active.is_none() {
            return;
        }
        tracing::info!(reason, state = %self.state, "Abandoning turn in progress");
        let partial = self.join_stages(true).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, reason, "Stages did not stop in time");
            String::new()
        });
        self.close_turn(TurnOutcome::Incomplete, Some(partial));
    }

    /// Wait for the active turn's stages to finish, cancelling them first
    /// when `cancel` is set
    ///
    /// Returns the text generated so far. Tasks still running after the
    /// cancellation timeout are aborted.
    async fn join_stages(&mut self, cancel: bool) -> Result<String, Error> {
        let Some(active) = self.active.as_mut() else {
            return Ok(String::new());
        };
        let transcription = active.transcription.take();
        let response = active.response.take();

        let mut aborts = Vec::new();
        if let Some(transcription) = &transcription {
            if cancel {
                transcription.cancel();
            }
            aborts.push(transcription.abort_handle());
        }
        if let Some(response) = &response {
            if cancel {
                response.cancel();
                self.playback.stop();
            }
            aborts.extend(response.abort_handles());
        }

        let joined = async {
            if let Some(transcription) = transcription {
                transcription.join().await;
            }
            match response {
                Some(response) => response.join().await,
                None => String::new(),
            }
        };

        let limit = self.timeouts.cancellation_join();
        match tokio::time::timeout(limit, joined).await {
            Ok(text) => Ok(text),
            Err(_) => {
                for abort in aborts {
                    abort.abort();
                }
                Err(Error::CancellationTimeout {
                    waited_ms: limit.as_millis() as u64,
                })
            }
        }
    }

    /// Close the active turn and record it
    ///
    /// Once the user message is in the history, every outcome except `Failed`
    /// appends an assistant message, marked interrupted unless completed.
    fn close_turn(&mut self, outcome: TurnOutcome, assistant_text: Option<String>) {
        let Some(active) = self.active.take() else {
            return;
        };
        let mut record = active.record;

        if active.user_appended && outcome != TurnOutcome::Failed {
            let text = assistant_text.unwrap_or_default();
            let mut message = Message::assistant(text.clone()).with_turn(record.index);
            if outcome != TurnOutcome::Completed {
                message = message.interrupted();
            }
            self.history.append(message);
            record.assistant_text = text;
        }

        record.close(outcome);
        tracing::info!(turn = record.index, outcome = outcome.as_str(), "Turn closed");
        self.metrics.record_turn_complete(&record);
        self.turns.push(record.clone());
        self.emit(SessionEvent::TurnCompleted(record));
    }

    // State machine

    fn transition(&mut self, next: ConversationState, event: &'static str) -> bool {
        if !self.state.can_transition_to(next) {
            self.violation(event);
            return false;
        }
        self.apply_state(next, event);
        true
    }

    /// Move to `next` without consulting the transition table
    fn force_state(&mut self, next: ConversationState, event: &'static str) {
        if self.state != next {
            self.apply_state(next, event);
        }
    }

    fn apply_state(&mut self, next: ConversationState, event: &'static str) {
        let from = self.state;
        self.state = next;

        // Timers never outlive the state that armed them
        match from {
            ConversationState::UserSpeaking => {
                self.silence_timer.cancel();
                self.utterance_timer.cancel();
            }
            ConversationState::Speaking => self.barge_in_timer.cancel(),
            _ => {}
        }
        match next {
            ConversationState::UserSpeaking => {
                self.silence_timer.arm();
                self.utterance_timer.arm();
            }
            ConversationState::Speaking => self.barge_in_timer.arm(),
            _ => {}
        }

        tracing::debug!(%from, to = %next, event, "State transition");
        self.state_tx.send_replace(next);
        self.emit(SessionEvent::StateChanged { from, to: next });
    }

    fn violation(&self, event: &'static str) {
        let error = Error::StateMachineViolation {
            state: self.state.to_string(),
            event: event.to_string(),
        };
        tracing::warn!(error = %error, "Ignoring event");
        self.metrics.record_state_violation(self.state.as_str());
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn stage_context(&self, turn: u64, task: TaskClassification) -> StageContext {
        StageContext {
            turn,
            router: self.router.clone(),
            route: self.route,
            task,
            events: self.stage_tx.clone(),
        }
    }

    fn response_settings(&self) -> ResponseSettings {
        ResponseSettings {
            first_token_timeout: self.timeouts.generation_first_token(),
            first_audio_timeout: self.timeouts.synthesis_first_byte(),
            chunk_max_chars: self.turn_config.chunk_max_chars,
            chunk_min_clause_chars: self.turn_config.chunk_min_clause_chars,
        }
    }
}

impl std::fmt::Debug for TurnController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnController")
            .field("state", &self.state)
            .field("turn", &self.active.as_ref().map(ActiveTurn::index))
            .field("history_len", &self.history.len())
            .finish_non_exhaustive()
    }
}
