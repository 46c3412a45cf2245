//! LLM Backend implementations
//!
//! Both backends are single-shot and non-streaming: one prompt in, one
//! completion out. Timeouts are optional; with none configured a request
//! waits until the server answers.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::prompt::{flatten, Message};
use crate::LlmError;

/// Ollama configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Model name
    pub model: String,
    /// API endpoint
    pub endpoint: String,
    /// Sampling temperature; server default when unset
    pub temperature: Option<f32>,
    /// Request timeout
    pub timeout: Option<Duration>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "mistral".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            temperature: None,
            timeout: None,
        }
    }
}

/// LLM generation result
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// Generated text
    pub text: String,
    /// Tokens generated, when the server reports it
    pub tokens: usize,
    /// Total generation time (ms)
    pub total_time_ms: u64,
    /// Finish reason
    pub finish_reason: FinishReason,
}

/// Finish reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Error,
}

/// LLM Backend trait
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Generate a response
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError>;

    /// Check if model is available
    async fn is_available(&self) -> bool;

    /// Get model name
    fn model_name(&self) -> &str;
}

fn build_client(timeout: Option<Duration>) -> Result<Client, LlmError> {
    let mut builder = Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| LlmError::Configuration(format!("Failed to create HTTP client: {}", e)))
}

/// Ollama backend using the completion endpoint
#[derive(Clone)]
pub struct OllamaBackend {
    client: Client,
    config: LlmConfig,
}

impl OllamaBackend {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = build_client(config.timeout)?;
        Ok(Self { client, config })
    }

    /// Build the API URL
    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    fn build_request(&self, messages: &[Message]) -> OllamaGenerateRequest {
        let (system, prompt) = flatten(messages);
        OllamaGenerateRequest {
            model: self.config.model.clone(),
            prompt,
            system,
            stream: false,
            options: self
                .config
                .temperature
                .map(|temperature| OllamaOptions { temperature }),
        }
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError> {
        let start = Instant::now();
        let request = self.build_request(messages);

        let response = self
            .client
            .post(self.api_url("/generate"))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, error)));
        }

        let response: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let total_time_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            model = %self.config.model,
            tokens = response.eval_count.unwrap_or(0),
            total_time_ms,
            "Ollama generation complete"
        );

        Ok(GenerationResult {
            text: response.response,
            tokens: response.eval_count.unwrap_or(0),
            total_time_ms,
            finish_reason: match response.done_reason.as_deref() {
                Some("length") => FinishReason::Length,
                _ => FinishReason::Stop,
            },
        })
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(self.api_url("/tags"))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
    #[serde(default)]
    eval_count: Option<usize>,
    #[serde(default)]
    done_reason: Option<String>,
}

/// Configuration for OpenAI-compatible backends
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// API endpoint
    pub endpoint: String,
    /// API key
    pub api_key: String,
    /// Model name
    pub model: String,
    /// Temperature (0-2)
    pub temperature: f32,
    /// Request timeout
    pub timeout: Option<Duration>,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            timeout: None,
        }
    }
}

impl OpenAIConfig {
    /// Create config for OpenAI
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            ..Default::default()
        }
    }
}

/// OpenAI-compatible chat completions backend
pub struct OpenAIBackend {
    config: OpenAIConfig,
    client: Client,
}

impl OpenAIBackend {
    pub fn new(config: OpenAIConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() && !config.endpoint.starts_with("http://localhost") {
            return Err(LlmError::Configuration(
                "API key required for remote endpoints".to_string(),
            ));
        }

        let client = build_client(config.timeout)?;
        Ok(Self { config, client })
    }

    /// Full API URL for chat completions
    fn chat_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        )
    }

    fn build_headers(&self) -> reqwest::header::HeaderMap {
        use reqwest::header::HeaderValue;

        let mut headers = reqwest::header::HeaderMap::new();

        let auth_value = format!("Bearer {}", self.config.api_key);
        if let Ok(val) = HeaderValue::from_str(&auth_value) {
            headers.insert(reqwest::header::AUTHORIZATION, val);
        }

        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        headers
    }

    fn build_request(&self, messages: &[Message]) -> OpenAIChatRequest {
        OpenAIChatRequest {
            model: self.config.model.clone(),
            messages: messages
                .iter()
                .map(|m| OpenAIMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: Some(self.config.temperature),
            stream: Some(false),
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAIBackend {
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError> {
        let start = Instant::now();
        let request = self.build_request(messages);

        let response = self
            .client
            .post(self.chat_url())
            .headers(self.build_headers())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, error_text)));
        }

        let response: OpenAIChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = response
            .choices
            .first()
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;

        let total_time_ms = start.elapsed().as_millis() as u64;
        let tokens = response
            .usage
            .as_ref()
            .map(|u| u.completion_tokens)
            .unwrap_or(0);

        tracing::debug!(
            model = %self.config.model,
            tokens,
            total_time_ms,
            "OpenAI generation complete"
        );

        Ok(GenerationResult {
            text: choice.message.content.clone(),
            tokens,
            total_time_ms,
            finish_reason: match choice.finish_reason.as_deref() {
                Some("length") => FinishReason::Length,
                _ => FinishReason::Stop,
            },
        })
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/models", self.config.endpoint.trim_end_matches('/'));
        self.client
            .get(&url)
            .headers(self.build_headers())
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    completion_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = LlmConfig::default();
        assert_eq!(config.model, "mistral");
        assert!(config.temperature.is_none());
        assert!(config.timeout.is_none());
    }

    #[test]
    fn test_ollama_request_serialization() {
        let backend = OllamaBackend::new(LlmConfig::default()).unwrap();
        let request = backend.build_request(&[Message::user("QUESTION: What is RAG?")]);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "mistral");
        assert_eq!(json["prompt"], "QUESTION: What is RAG?");
        assert_eq!(json["stream"], false);
        assert!(json.get("system").is_none());
        assert!(json.get("options").is_none());
    }

    #[test]
    fn test_ollama_response_parsing() {
        let body = r#"{"model":"mistral","response":"Hello","done":true,"eval_count":3}"#;
        let response: OllamaGenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.response, "Hello");
        assert_eq!(response.eval_count, Some(3));
        assert!(response.done_reason.is_none());
    }

    #[test]
    fn test_ollama_url_trims_slash() {
        let backend = OllamaBackend::new(LlmConfig {
            endpoint: "http://localhost:11434/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            backend.api_url("/generate"),
            "http://localhost:11434/api/generate"
        );
    }

    #[test]
    fn test_openai_config_default() {
        let config = OpenAIConfig::default();
        assert_eq!(config.endpoint, "https://api.openai.com/v1");
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.temperature, 0.3);
        assert!(config.api_key.is_empty());
    }

    #[test]
    fn test_openai_backend_requires_key_for_remote() {
        assert!(OpenAIBackend::new(OpenAIConfig::default()).is_err());
        let local = OpenAIConfig {
            endpoint: "http://localhost:8000/v1".to_string(),
            ..Default::default()
        };
        assert!(OpenAIBackend::new(local).is_ok());
        assert!(OpenAIBackend::new(OpenAIConfig::openai("sk-xxx", "gpt-4o-mini")).is_ok());
    }

    #[test]
    fn test_openai_chat_url() {
        let backend = OpenAIBackend::new(OpenAIConfig::openai("sk-xxx", "gpt-4o-mini")).unwrap();
        assert_eq!(
            backend.chat_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_openai_request_serialization() {
        let backend = OpenAIBackend::new(OpenAIConfig::openai("sk-xxx", "gpt-4o-mini")).unwrap();
        let request = backend.build_request(&[Message::user("Hello")]);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "Hello");
        assert_eq!(json["stream"], false);
        assert!((json["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_openai_response_parsing() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "Hi"}, "finish_reason": "stop"}],
            "usage": {"completion_tokens": 1, "prompt_tokens": 5, "total_tokens": 6}
        }"#;
        let response: OpenAIChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.choices[0].message.content, "Hi");
        assert_eq!(response.usage.unwrap().completion_tokens, 1);
    }
}
