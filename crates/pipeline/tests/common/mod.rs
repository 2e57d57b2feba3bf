//! Scripted collaborators for pipeline integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use voice_orchestrator_config::Settings;
use voice_orchestrator_core::{
    AudioChunk, AudioFrame, EventStream, LatencyStage, Message, MetricsRecorder, PlaybackSink,
    ProviderError, Responder, SampleRate, Synthesizer, TaskClassification, TokenEvent,
    TranscriptEvent, Transcriber, TranscriptionSink, TranscriptionStream, Turn, TurnOutcome,
    VadDecision, VoiceActivityDetector,
};
use voice_orchestrator_pipeline::TurnController;
use voice_orchestrator_router::{ProviderRegistration, ProviderRouter};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn speech_frame(sequence: u64) -> AudioFrame {
    AudioFrame::new(vec![0.5; 160], SampleRate::Hz16000, sequence)
}

pub fn silence_frame(sequence: u64) -> AudioFrame {
    AudioFrame::silence(SampleRate::Hz16000, 10, sequence)
}

/// Poll `check` until it holds or `WAIT` passes
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    true
}

/// Speech above -30 dB
pub struct LevelVad;

impl VoiceActivityDetector for LevelVad {
    fn classify(&mut self, frame: &AudioFrame) -> VadDecision {
        if frame.energy_db > -30.0 {
            VadDecision::speech(0.9)
        } else {
            VadDecision::silence()
        }
    }

    fn reset(&mut self) {}
}

/// `LevelVad` that counts its resets
#[derive(Default)]
pub struct CountingVad {
    pub resets: Arc<AtomicUsize>,
}

impl VoiceActivityDetector for CountingVad {
    fn classify(&mut self, frame: &AudioFrame) -> VadDecision {
        LevelVad.classify(frame)
    }

    fn reset(&mut self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sets a flag when the owning stream is dropped, optionally stalling first
struct DropFlag {
    flag: Arc<AtomicBool>,
    stall: Option<Duration>,
}

impl Drop for DropFlag {
    fn drop(&mut self) {
        if let Some(stall) = self.stall {
            std::thread::sleep(stall);
        }
        self.flag.store(true, Ordering::SeqCst);
    }
}

// Transcriber

enum SinkInput {
    Frame,
    End,
}

struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkInput>,
    frames: Arc<AtomicUsize>,
}

impl TranscriptionSink for ChannelSink {
    fn push_audio(&mut self, _frame: AudioFrame) -> Result<(), ProviderError> {
        self.frames.fetch_add(1, Ordering::SeqCst);
        self.tx
            .send(SinkInput::Frame)
            .map_err(|_| ProviderError::Stream("closed".into()))
    }

    fn end_of_utterance(&mut self) -> Result<(), ProviderError> {
        self.tx
            .send(SinkInput::End)
            .map_err(|_| ProviderError::Stream("closed".into()))
    }
}

#[derive(Clone, Copy, PartialEq)]
pub enum TranscriberMode {
    /// Partial on the first frame, final at end of utterance
    Normal,
    /// Stream error on the first frame
    FailOnFirstFrame,
}

pub struct MockTranscriber {
    transcript: String,
    mode: TranscriberMode,
    pub starts: AtomicUsize,
    pub frames: Arc<AtomicUsize>,
}

impl MockTranscriber {
    pub fn new(transcript: &str) -> Arc<Self> {
        Self::with_mode(transcript, TranscriberMode::Normal)
    }

    pub fn with_mode(transcript: &str, mode: TranscriberMode) -> Arc<Self> {
        Arc::new(Self {
            transcript: transcript.to_string(),
            mode,
            starts: AtomicUsize::new(0),
            frames: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn start_stream(
        &self,
        _cancel: CancellationToken,
    ) -> Result<TranscriptionStream, ProviderError> {
        self.starts.fetch_add(1, Ordering::SeqCst);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let transcript = self.transcript.clone();
        let fail_on_frame = self.mode == TranscriberMode::FailOnFirstFrame;

        let events = async_stream::stream! {
            let mut seen = 0usize;
            while let Some(input) = rx.recv().await {
                match input {
                    SinkInput::Frame => {
                        seen += 1;
                        if fail_on_frame {
                            yield Err::<TranscriptEvent, ProviderError>(
                                ProviderError::Network("connection reset".into()),
                            );
                            break;
                        }
                        if seen == 1 {
                            yield Ok(TranscriptEvent::partial("...", 0.4));
                        }
                    }
                    SinkInput::End => {
                        yield Ok(TranscriptEvent::final_result(transcript.clone(), 0.95));
                        break;
                    }
                }
            }
        };

        Ok(TranscriptionStream {
            sink: Box::new(ChannelSink {
                tx,
                frames: self.frames.clone(),
            }),
            events: Box::pin(events),
        })
    }

    fn name(&self) -> &str {
        "mock-stt"
    }
}

// Responder

pub struct MockResponder {
    tokens: Vec<String>,
    fail: bool,
    /// Keep the stream open after the tokens
    hang: bool,
    /// Never produce the first token
    stall_first: bool,
    /// Stream error right after the tokens
    fail_midway: bool,
    stall_on_drop: Option<Duration>,
    pub calls: AtomicUsize,
    pub histories: Mutex<Vec<Vec<Message>>>,
    pub cancels: Mutex<Vec<CancellationToken>>,
    pub dropped: Arc<AtomicBool>,
}

impl MockResponder {
    pub fn new(tokens: &[&str]) -> Self {
        Self {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            fail: false,
            hang: false,
            stall_first: false,
            fail_midway: false,
            stall_on_drop: None,
            calls: AtomicUsize::new(0),
            histories: Mutex::new(Vec::new()),
            cancels: Mutex::new(Vec::new()),
            dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(&[])
        }
    }

    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn stalled() -> Self {
        Self {
            stall_first: true,
            ..Self::new(&["never sent"])
        }
    }

    pub fn failing_midway(mut self) -> Self {
        self.fail_midway = true;
        self
    }

    pub fn stall_on_drop(mut self, stall: Duration) -> Self {
        self.stall_on_drop = Some(stall);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn all_cancelled(&self) -> bool {
        let cancels = self.cancels.lock();
        !cancels.is_empty() && cancels.iter().all(CancellationToken::is_cancelled)
    }
}

#[async_trait]
impl Responder for MockResponder {
    async fn generate(
        &self,
        history: Vec<Message>,
        _task: TaskClassification,
        cancel: CancellationToken,
    ) -> Result<EventStream<TokenEvent>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProviderError::Network("connection refused".into()));
        }
        self.histories.lock().push(history);
        self.cancels.lock().push(cancel);

        let guard = DropFlag {
            flag: self.dropped.clone(),
            stall: self.stall_on_drop,
        };
        let tokens = self.tokens.clone();
        let hang = self.hang;
        let stall_first = self.stall_first;
        let fail_midway = self.fail_midway;

        Ok(Box::pin(async_stream::stream! {
            let _guard = guard;
            if stall_first {
                futures::future::pending::<()>().await;
            }
            for token in tokens {
                yield Ok::<TokenEvent, ProviderError>(TokenEvent::delta(token));
            }
            if fail_midway {
                yield Err(ProviderError::Stream("connection dropped".into()));
            } else {
                if hang {
                    futures::future::pending::<()>().await;
                }
                yield Ok(TokenEvent::last(""));
            }
        }))
    }

    fn name(&self) -> &str {
        "mock-llm"
    }
}

// Synthesizer

#[derive(Default)]
pub struct MockSynthesizer {
    pub texts: Mutex<Vec<String>>,
    pub cancels: Mutex<Vec<CancellationToken>>,
}

impl MockSynthesizer {
    pub fn calls(&self) -> usize {
        self.texts.lock().len()
    }

    pub fn all_cancelled(&self) -> bool {
        let cancels = self.cancels.lock();
        !cancels.is_empty() && cancels.iter().all(CancellationToken::is_cancelled)
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(
        &self,
        text: String,
        cancel: CancellationToken,
    ) -> Result<EventStream<AudioChunk>, ProviderError> {
        self.texts.lock().push(text.clone());
        self.cancels.lock().push(cancel);

        let chunk = AudioChunk::new(text.into_bytes(), true);
        Ok(Box::pin(futures::stream::once(async move {
            Ok::<_, ProviderError>(chunk)
        })))
    }

    fn name(&self) -> &str {
        "mock-tts"
    }
}

/// Accepts every request, then fails before the first audio
#[derive(Default)]
pub struct FailingSynthesizer {
    pub calls: AtomicUsize,
}

impl FailingSynthesizer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Synthesizer for FailingSynthesizer {
    async fn synthesize(
        &self,
        _text: String,
        _cancel: CancellationToken,
    ) -> Result<EventStream<AudioChunk>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Box::pin(futures::stream::once(async {
            Err::<AudioChunk, ProviderError>(ProviderError::Network("tts socket closed".into()))
        })))
    }

    fn name(&self) -> &str {
        "failing-tts"
    }
}

// Playback

#[derive(Default)]
pub struct MockPlayback {
    /// Never finish playing, so the turn stays in `Speaking`
    hold: bool,
    pub played: Mutex<Vec<Vec<u8>>>,
    pub stops: AtomicUsize,
}

impl MockPlayback {
    pub fn holding() -> Self {
        Self {
            hold: true,
            ..Self::default()
        }
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn played_text(&self) -> Vec<String> {
        self.played
            .lock()
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }
}

#[async_trait]
impl PlaybackSink for MockPlayback {
    async fn play(&self, chunk: AudioChunk) -> Result<(), ProviderError> {
        self.played.lock().push(chunk.audio_bytes);
        if self.hold {
            futures::future::pending::<()>().await;
        }
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

// Metrics

#[derive(Default)]
pub struct RecordingMetrics {
    pub latencies: Mutex<Vec<LatencyStage>>,
    pub outcomes: Mutex<Vec<TurnOutcome>>,
    pub violations: Mutex<Vec<String>>,
    pub dropped: AtomicU64,
}

impl MetricsRecorder for RecordingMetrics {
    fn record_latency(&self, stage: LatencyStage, _duration: Duration) {
        self.latencies.lock().push(stage);
    }

    fn record_turn_complete(&self, turn: &Turn) {
        if let Some(outcome) = turn.outcome {
            self.outcomes.lock().push(outcome);
        }
    }

    fn record_frames_dropped(&self, count: u64) {
        self.dropped.fetch_add(count, Ordering::SeqCst);
    }

    fn record_state_violation(&self, state: &str) {
        self.violations.lock().push(state.to_string());
    }
}

// Wiring

pub struct Harness {
    pub controller: TurnController,
    pub router: Arc<ProviderRouter>,
    pub transcriber: Arc<MockTranscriber>,
    pub responder: Arc<MockResponder>,
    pub synthesizer: Arc<MockSynthesizer>,
    pub playback: Arc<MockPlayback>,
    pub metrics: Arc<RecordingMetrics>,
}

impl Harness {
    pub fn new(transcript: &str, responder: MockResponder, playback: MockPlayback) -> Self {
        Self::with_settings(Settings::default(), transcript, responder, playback)
    }

    pub fn with_settings(
        settings: Settings,
        transcript: &str,
        responder: MockResponder,
        playback: MockPlayback,
    ) -> Self {
        let router = Arc::new(ProviderRouter::from_config(&settings.router));
        let transcriber = MockTranscriber::new(transcript);
        let responder = Arc::new(responder);
        let synthesizer = Arc::new(MockSynthesizer::default());
        let playback = Arc::new(playback);
        let metrics = Arc::new(RecordingMetrics::default());

        router
            .register(ProviderRegistration::transcriber("stt", transcriber.clone(), 1))
            .unwrap();
        router
            .register(ProviderRegistration::responder("llm", responder.clone(), 1))
            .unwrap();
        router
            .register(ProviderRegistration::synthesizer("tts", synthesizer.clone(), 1))
            .unwrap();

        let controller = TurnController::new(&settings, router.clone(), playback.clone())
            .with_vad(LevelVad)
            .with_metrics(metrics.clone());

        Self {
            controller,
            router,
            transcriber,
            responder,
            synthesizer,
            playback,
            metrics,
        }
    }

    /// Feed `speech` speech frames then `silence` silence frames
    pub async fn speak(&mut self, speech: usize, silence: usize) {
        let mut sequence = 0;
        for _ in 0..speech {
            self.controller.on_frame(speech_frame(sequence)).await;
            sequence += 1;
        }
        for _ in 0..silence {
            self.controller.on_frame(silence_frame(sequence)).await;
            sequence += 1;
        }
    }
}
