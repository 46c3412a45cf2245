//! Configuration management for the literature review pipeline
//!
//! Supports loading configuration from:
//! - TOML/YAML files under `config/` (`default`, then `{env}`)
//! - Environment variables (`LITREVIEW__` prefix, `__` separator)
//!
//! Every component receives its slice of [`Settings`] through its constructor;
//! nothing reads configuration from ambient global state.

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, load_settings_from, ChunkingConfig, EmbeddingBackend, EmbeddingSettings,
    IngestionConfig, LlmProviderKind, LlmSettings, ObservabilityConfig, PathsConfig,
    RefinementConfig, RerankerSettings, RetrievalConfig, RuntimeEnvironment, Settings,
    VectorStoreBackend, VectorStoreSettings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for litreview_core::Error {
    fn from(err: ConfigError) -> Self {
        litreview_core::Error::Config(err.to_string())
    }
}
