//! Configuration management for the voice orchestrator
//!
//! Supports loading configuration from:
//! - YAML/TOML files (`config/default`, `config/{env}`, or an explicit path)
//! - Environment variables (`VOICE_ORCHESTRATOR__` prefix, `__` separator)

pub mod settings;

pub use settings::{
    load_settings, load_settings_from, IngestConfig, ObservabilityConfig, RouterConfig, Settings,
    TimeoutConfig, TurnConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for voice_orchestrator_core::Error {
    fn from(err: ConfigError) -> Self {
        voice_orchestrator_core::Error::Config(err.to_string())
    }
}
