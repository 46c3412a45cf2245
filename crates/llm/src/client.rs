//! Prompt-in, text-out generation
//!
//! Callers that must not abort on a failed call (review generation, judging)
//! use [`TextGenerator::generate`], which reports failures in-band as the
//! returned text. Callers that must fail loudly (query rewriting) use
//! [`TextGenerator::try_generate`].

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::backend::LlmBackend;
use crate::factory::LlmProvider;
use crate::prompt::Message;
use crate::LlmError;

/// Text generation capability
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion, surfacing failures as errors
    async fn try_generate(&self, prompt: &str) -> Result<String, LlmError>;

    /// Human-readable description of a failed call
    fn error_text(&self, err: &LlmError) -> String {
        format!("Error calling LLM: {}", err)
    }

    /// Generate a completion; failures come back as descriptive text
    async fn generate(&self, prompt: &str) -> String {
        match self.try_generate(prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Text generation failed, returning error text");
                self.error_text(&e)
            },
        }
    }

    /// Model identifier
    fn model_name(&self) -> &str;
}

/// Call counters
#[derive(Debug, Clone, Default)]
pub struct LlmStats {
    pub calls: usize,
    pub errors: usize,
    pub total_time_ms: u64,
}

/// [`TextGenerator`] over an [`LlmBackend`]
pub struct LlmClient {
    backend: Arc<dyn LlmBackend>,
    provider: LlmProvider,
    stats: Mutex<LlmStats>,
}

impl LlmClient {
    pub fn new(backend: Arc<dyn LlmBackend>, provider: LlmProvider) -> Self {
        Self {
            backend,
            provider,
            stats: Mutex::new(LlmStats::default()),
        }
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn stats(&self) -> LlmStats {
        self.stats.lock().clone()
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn try_generate(&self, prompt: &str) -> Result<String, LlmError> {
        let messages = [Message::user(prompt)];
        metrics::counter!("litreview_llm_calls_total", "provider" => self.provider.as_str())
            .increment(1);

        match self.backend.generate(&messages).await {
            Ok(result) => {
                let mut stats = self.stats.lock();
                stats.calls += 1;
                stats.total_time_ms += result.total_time_ms;
                Ok(result.text)
            },
            Err(e) => {
                {
                    let mut stats = self.stats.lock();
                    stats.calls += 1;
                    stats.errors += 1;
                }
                metrics::counter!("litreview_llm_errors_total", "provider" => self.provider.as_str())
                    .increment(1);
                tracing::error!(
                    provider = self.provider.as_str(),
                    model = self.backend.model_name(),
                    error = %e,
                    "LLM call failed"
                );
                Err(e)
            },
        }
    }

    fn error_text(&self, err: &LlmError) -> String {
        match self.provider {
            LlmProvider::Ollama => format!(
                "Error calling Ollama: {}\nEnsure Ollama is running and model '{}' is pulled.",
                err,
                self.backend.model_name()
            ),
            LlmProvider::OpenAI => format!("Error calling OpenAI: {}", err),
        }
    }

    fn model_name(&self) -> &str {
        self.backend.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FinishReason, GenerationResult};

    struct FixedBackend {
        reply: Option<String>,
    }

    #[async_trait]
    impl LlmBackend for FixedBackend {
        async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError> {
            assert_eq!(messages.len(), 1);
            match &self.reply {
                Some(text) => Ok(GenerationResult {
                    text: text.clone(),
                    tokens: 1,
                    total_time_ms: 2,
                    finish_reason: FinishReason::Stop,
                }),
                None => Err(LlmError::Network("connection refused".to_string())),
            }
        }

        async fn is_available(&self) -> bool {
            self.reply.is_some()
        }

        fn model_name(&self) -> &str {
            "mistral"
        }
    }

    #[tokio::test]
    async fn test_generate_returns_text() {
        let client = LlmClient::new(
            Arc::new(FixedBackend {
                reply: Some("answer".to_string()),
            }),
            LlmProvider::Ollama,
        );
        assert_eq!(client.generate("q").await, "answer");
        assert_eq!(client.try_generate("q").await.unwrap(), "answer");

        let stats = client.stats();
        assert_eq!(stats.calls, 2);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.total_time_ms, 4);
    }

    #[tokio::test]
    async fn test_ollama_failure_is_in_band() {
        let client = LlmClient::new(Arc::new(FixedBackend { reply: None }), LlmProvider::Ollama);
        let text = client.generate("q").await;
        assert!(text.starts_with("Error calling Ollama: "));
        assert!(text.contains("Ensure Ollama is running and model 'mistral' is pulled."));
        assert_eq!(client.stats().errors, 1);
    }

    #[tokio::test]
    async fn test_openai_failure_is_in_band() {
        let client = LlmClient::new(Arc::new(FixedBackend { reply: None }), LlmProvider::OpenAI);
        let text = client.generate("q").await;
        assert!(text.starts_with("Error calling OpenAI: "));
    }

    #[tokio::test]
    async fn test_try_generate_surfaces_error() {
        let client = LlmClient::new(Arc::new(FixedBackend { reply: None }), LlmProvider::Ollama);
        assert!(matches!(
            client.try_generate("q").await,
            Err(LlmError::Network(_))
        ));
    }
}
