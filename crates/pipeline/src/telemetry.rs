//! Tracing subscriber setup

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voice_orchestrator_config::ObservabilityConfig;

use crate::PipelineError;

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over the configured level. Fails instead of panicking when
/// a subscriber is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), PipelineError> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("voice_orchestrator={}", config.log_level).into());

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    subscriber
        .with(fmt_layer)
        .try_init()
        .map_err(|e| PipelineError::Telemetry(e.to_string()))
}
