//! Text generation for the literature review pipeline
//!
//! Features:
//! - Ollama and OpenAI backends behind [`LlmBackend`]
//! - [`TextGenerator`], the prompt-in/text-out seam used by retrieval,
//!   refinement, generation and evaluation
//! - Provider selection from configuration via [`LlmFactory`]

pub mod backend;
pub mod client;
pub mod factory;
pub mod prompt;

pub use backend::{
    FinishReason, GenerationResult, LlmBackend, LlmConfig, OllamaBackend, OpenAIBackend,
    OpenAIConfig,
};
pub use client::{LlmClient, LlmStats, TextGenerator};
pub use factory::{LlmFactory, LlmProvider, LlmProviderConfig};
pub use prompt::{Message, Role};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for litreview_core::Error {
    fn from(err: LlmError) -> Self {
        litreview_core::Error::Llm(err.to_string())
    }
}
