//! Main settings module

use config::{Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use voice_orchestrator_core::SampleRate;

use crate::ConfigError;

const ENV_PREFIX: &str = "VOICE_ORCHESTRATOR";

/// Main orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    /// Turn-taking thresholds and chunking
    #[serde(default)]
    pub turn: TurnConfig,

    /// Per-call provider timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Health and failover policy
    #[serde(default)]
    pub router: RouterConfig,

    /// Audio ingest queue
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_turn()?;
        self.validate_timeouts()?;
        self.validate_router()?;
        self.validate_ingest()?;
        Ok(())
    }

    fn validate_turn(&self) -> Result<(), ConfigError> {
        let turn = &self.turn;

        require_nonzero("turn.silence_threshold_ms", turn.silence_threshold_ms)?;
        require_nonzero("turn.barge_in_window_ms", turn.barge_in_window_ms)?;
        require_nonzero("turn.max_utterance_ms", turn.max_utterance_ms)?;
        require_nonzero("turn.chunk_max_chars", turn.chunk_max_chars as u64)?;

        if !(0.0..=1.0).contains(&turn.speech_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "turn.speech_threshold".to_string(),
                message: format!(
                    "Must be between 0.0 and 1.0, got {}",
                    turn.speech_threshold
                ),
            });
        }

        if turn.chunk_min_clause_chars > turn.chunk_max_chars {
            return Err(ConfigError::InvalidValue {
                field: "turn.chunk_min_clause_chars".to_string(),
                message: format!(
                    "Must not exceed chunk_max_chars ({})",
                    turn.chunk_max_chars
                ),
            });
        }

        if turn.max_utterance_ms <= turn.silence_threshold_ms {
            return Err(ConfigError::InvalidValue {
                field: "turn.max_utterance_ms".to_string(),
                message: "Must be longer than silence_threshold_ms".to_string(),
            });
        }

        Ok(())
    }

    fn validate_timeouts(&self) -> Result<(), ConfigError> {
        let t = &self.timeouts;
        require_nonzero(
            "timeouts.transcription_first_byte_ms",
            t.transcription_first_byte_ms,
        )?;
        require_nonzero(
            "timeouts.generation_first_token_ms",
            t.generation_first_token_ms,
        )?;
        require_nonzero("timeouts.synthesis_first_byte_ms", t.synthesis_first_byte_ms)?;
        require_nonzero("timeouts.cancellation_join_ms", t.cancellation_join_ms)?;
        Ok(())
    }

    fn validate_router(&self) -> Result<(), ConfigError> {
        let r = &self.router;

        require_nonzero("router.degrade_after_failures", r.degrade_after_failures as u64)?;
        require_nonzero(
            "router.unreachable_after_failures",
            r.unreachable_after_failures as u64,
        )?;
        require_nonzero("router.failure_window_ms", r.failure_window_ms)?;
        require_nonzero("router.probe_interval_ms", r.probe_interval_ms)?;
        require_nonzero("router.probe_timeout_ms", r.probe_timeout_ms)?;

        if r.degrade_after_failures > r.unreachable_after_failures {
            return Err(ConfigError::InvalidValue {
                field: "router.degrade_after_failures".to_string(),
                message: format!(
                    "Must not exceed unreachable_after_failures ({})",
                    r.unreachable_after_failures
                ),
            });
        }

        Ok(())
    }

    fn validate_ingest(&self) -> Result<(), ConfigError> {
        let ingest = &self.ingest;

        require_nonzero(
            "ingest.frame_queue_capacity",
            ingest.frame_queue_capacity as u64,
        )?;

        if ingest.sample_rate != 16000 {
            return Err(ConfigError::InvalidValue {
                field: "ingest.sample_rate".to_string(),
                message: format!("Only 16000 Hz mono input is supported, got {}", ingest.sample_rate),
            });
        }

        Ok(())
    }
}

fn require_nonzero(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: "Must be greater than zero".to_string(),
        });
    }
    Ok(())
}

/// Turn-taking configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnConfig {
    /// Continuous silence that ends an utterance
    #[serde(default = "default_silence_threshold_ms")]
    pub silence_threshold_ms: u64,

    /// Playback time before user speech counts as barge-in
    #[serde(default = "default_barge_in_window_ms")]
    pub barge_in_window_ms: u64,

    /// Minimum VAD confidence for a speech frame
    #[serde(default = "default_speech_threshold")]
    pub speech_threshold: f32,

    /// Longest utterance before it is forced to processing
    #[serde(default = "default_max_utterance_ms")]
    pub max_utterance_ms: u64,

    /// Hard limit of a synthesis chunk, in characters
    #[serde(default = "default_chunk_max_chars")]
    pub chunk_max_chars: usize,

    /// Buffered characters before a clause boundary may end a chunk
    #[serde(default = "default_chunk_min_clause_chars")]
    pub chunk_min_clause_chars: usize,
}

fn default_silence_threshold_ms() -> u64 {
    1500
}
fn default_barge_in_window_ms() -> u64 {
    600
}
fn default_speech_threshold() -> f32 {
    0.5
}
fn default_max_utterance_ms() -> u64 {
    30_000
}
fn default_chunk_max_chars() -> usize {
    100
}
fn default_chunk_min_clause_chars() -> usize {
    20
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            silence_threshold_ms: default_silence_threshold_ms(),
            barge_in_window_ms: default_barge_in_window_ms(),
            speech_threshold: default_speech_threshold(),
            max_utterance_ms: default_max_utterance_ms(),
            chunk_max_chars: default_chunk_max_chars(),
            chunk_min_clause_chars: default_chunk_min_clause_chars(),
        }
    }
}

impl TurnConfig {
    pub fn silence_threshold(&self) -> Duration {
        Duration::from_millis(self.silence_threshold_ms)
    }

    pub fn barge_in_window(&self) -> Duration {
        Duration::from_millis(self.barge_in_window_ms)
    }

    pub fn max_utterance(&self) -> Duration {
        Duration::from_millis(self.max_utterance_ms)
    }
}

/// Provider call timeouts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeoutConfig {
    #[serde(default = "default_transcription_first_byte_ms")]
    pub transcription_first_byte_ms: u64,

    #[serde(default = "default_generation_first_token_ms")]
    pub generation_first_token_ms: u64,

    #[serde(default = "default_synthesis_first_byte_ms")]
    pub synthesis_first_byte_ms: u64,

    /// Wait for stages to acknowledge cancellation
    #[serde(default = "default_cancellation_join_ms")]
    pub cancellation_join_ms: u64,
}

fn default_transcription_first_byte_ms() -> u64 {
    5000
}
fn default_generation_first_token_ms() -> u64 {
    3000
}
fn default_synthesis_first_byte_ms() -> u64 {
    3000
}
fn default_cancellation_join_ms() -> u64 {
    2000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            transcription_first_byte_ms: default_transcription_first_byte_ms(),
            generation_first_token_ms: default_generation_first_token_ms(),
            synthesis_first_byte_ms: default_synthesis_first_byte_ms(),
            cancellation_join_ms: default_cancellation_join_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn transcription_first_byte(&self) -> Duration {
        Duration::from_millis(self.transcription_first_byte_ms)
    }

    pub fn generation_first_token(&self) -> Duration {
        Duration::from_millis(self.generation_first_token_ms)
    }

    pub fn synthesis_first_byte(&self) -> Duration {
        Duration::from_millis(self.synthesis_first_byte_ms)
    }

    pub fn cancellation_join(&self) -> Duration {
        Duration::from_millis(self.cancellation_join_ms)
    }
}

/// Provider health policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouterConfig {
    /// Failures within the window before a provider is degraded
    #[serde(default = "default_degrade_after_failures")]
    pub degrade_after_failures: u32,

    /// Failures within the window before a provider is unreachable
    #[serde(default = "default_unreachable_after_failures")]
    pub unreachable_after_failures: u32,

    #[serde(default = "default_failure_window_ms")]
    pub failure_window_ms: u64,

    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Unreachable providers without a probe are retried after this long
    #[serde(default = "default_recovery_cooldown_ms")]
    pub recovery_cooldown_ms: u64,
}

fn default_degrade_after_failures() -> u32 {
    1
}
fn default_unreachable_after_failures() -> u32 {
    3
}
fn default_failure_window_ms() -> u64 {
    30_000
}
fn default_probe_interval_ms() -> u64 {
    10_000
}
fn default_probe_timeout_ms() -> u64 {
    2000
}
fn default_recovery_cooldown_ms() -> u64 {
    30_000
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            degrade_after_failures: default_degrade_after_failures(),
            unreachable_after_failures: default_unreachable_after_failures(),
            failure_window_ms: default_failure_window_ms(),
            probe_interval_ms: default_probe_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            recovery_cooldown_ms: default_recovery_cooldown_ms(),
        }
    }
}

/// Audio ingest configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestConfig {
    /// Bounded frame queue; the oldest frame is dropped on overflow
    #[serde(default = "default_frame_queue_capacity")]
    pub frame_queue_capacity: usize,

    /// Frames at any other rate are dropped before VAD
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

impl IngestConfig {
    /// The configured input rate; validation only admits 16 kHz
    pub fn input_rate(&self) -> SampleRate {
        SampleRate::from_hz(self.sample_rate).unwrap_or_default()
    }
}

fn default_frame_queue_capacity() -> usize {
    256
}
fn default_sample_rate() -> u32 {
    16000
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            frame_queue_capacity: default_frame_queue_capacity(),
            sample_rate: default_sample_rate(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Enable metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

fn finish(
    builder: ConfigBuilder<config::builder::DefaultState>,
) -> Result<Settings, ConfigError> {
    let config = builder.add_source(env_source()).build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (VOICE_ORCHESTRATOR__ prefix)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    finish(builder)
}

/// Load settings from an explicit file, overridden by environment variables
pub fn load_settings_from(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "Loading settings");

    let builder = Config::builder().add_source(File::from(path).required(true));

    finish(builder)
}
