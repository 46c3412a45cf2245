//! LLM Factory - provider selection
//!
//! ## Example
//! ```ignore
//! let config = LlmProviderConfig::ollama("mistral");
//! let llm = LlmFactory::create(&config)?;
//! let text = llm.generate("QUESTION: ...").await;
//! ```

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use litreview_config::{LlmProviderKind, LlmSettings};

use crate::backend::{LlmConfig, OllamaBackend, OpenAIBackend, OpenAIConfig};
use crate::client::{LlmClient, TextGenerator};
use crate::LlmError;

/// LLM provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    /// Local Ollama server
    #[default]
    Ollama,
    /// OpenAI chat completions
    OpenAI,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Ollama => "ollama",
            LlmProvider::OpenAI => "openai",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" | "local" => Ok(LlmProvider::Ollama),
            "openai" | "gpt" => Ok(LlmProvider::OpenAI),
            other => Err(LlmError::Configuration(format!(
                "Unknown LLM provider: {}",
                other
            ))),
        }
    }
}

impl From<LlmProviderKind> for LlmProvider {
    fn from(kind: LlmProviderKind) -> Self {
        match kind {
            LlmProviderKind::Ollama => LlmProvider::Ollama,
            LlmProviderKind::OpenAI => LlmProvider::OpenAI,
        }
    }
}

/// Unified LLM provider configuration
#[derive(Debug, Clone)]
pub struct LlmProviderConfig {
    pub provider: LlmProvider,
    /// API key (OpenAI)
    pub api_key: Option<String>,
    /// API endpoint; provider default when unset
    pub endpoint: Option<String>,
    pub model: String,
    /// Sampling temperature (OpenAI)
    pub temperature: f32,
    pub timeout: Option<Duration>,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            api_key: None,
            endpoint: None,
            model: "mistral".to_string(),
            temperature: 0.3,
            timeout: None,
        }
    }
}

impl LlmProviderConfig {
    /// Create Ollama config
    pub fn ollama(model: impl Into<String>) -> Self {
        Self {
            provider: LlmProvider::Ollama,
            model: model.into(),
            ..Default::default()
        }
    }

    /// Create OpenAI config
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            api_key: Some(api_key.into()),
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl From<&LlmSettings> for LlmProviderConfig {
    fn from(settings: &LlmSettings) -> Self {
        let provider = LlmProvider::from(settings.provider);
        let (endpoint, model) = match provider {
            LlmProvider::Ollama => (&settings.ollama_endpoint, &settings.ollama_model),
            LlmProvider::OpenAI => (&settings.openai_endpoint, &settings.openai_model),
        };

        Self {
            provider,
            api_key: settings.openai_api_key.clone(),
            endpoint: Some(endpoint.clone()),
            model: model.clone(),
            temperature: settings.temperature,
            timeout: settings.timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Factory for creating text generators
pub struct LlmFactory;

impl LlmFactory {
    pub fn create(config: &LlmProviderConfig) -> Result<Arc<dyn TextGenerator>, LlmError> {
        tracing::info!(
            provider = config.provider.as_str(),
            model = %config.model,
            "Creating LLM client"
        );

        match config.provider {
            LlmProvider::Ollama => {
                let defaults = LlmConfig::default();
                let backend = OllamaBackend::new(LlmConfig {
                    model: config.model.clone(),
                    endpoint: config.endpoint.clone().unwrap_or(defaults.endpoint),
                    temperature: None,
                    timeout: config.timeout,
                })?;
                Ok(Arc::new(LlmClient::new(Arc::new(backend), config.provider)))
            },

            LlmProvider::OpenAI => {
                let api_key = config
                    .api_key
                    .clone()
                    .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                    .ok_or_else(|| {
                        LlmError::Configuration("OpenAI requires OPENAI_API_KEY".to_string())
                    })?;

                let mut openai_config = OpenAIConfig::openai(api_key, &config.model);
                if let Some(ref endpoint) = config.endpoint {
                    openai_config.endpoint = endpoint.clone();
                }
                openai_config.temperature = config.temperature;
                openai_config.timeout = config.timeout;

                let backend = OpenAIBackend::new(openai_config)?;
                Ok(Arc::new(LlmClient::new(Arc::new(backend), config.provider)))
            },
        }
    }

    pub fn from_settings(settings: &LlmSettings) -> Result<Arc<dyn TextGenerator>, LlmError> {
        Self::create(&LlmProviderConfig::from(settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_from_str() {
        assert_eq!("ollama".parse::<LlmProvider>().unwrap(), LlmProvider::Ollama);
        assert_eq!("OpenAI".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAI);
        assert!("claude".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_config_from_settings() {
        let mut settings = LlmSettings::default();
        settings.provider = LlmProviderKind::OpenAI;
        settings.openai_api_key = Some("sk-test".to_string());
        settings.timeout_secs = Some(30);

        let config = LlmProviderConfig::from(&settings);
        assert_eq!(config.provider, LlmProvider::OpenAI);
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.endpoint.as_deref(), Some("https://api.openai.com/v1"));
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_create_ollama() {
        let llm = LlmFactory::create(&LlmProviderConfig::ollama("mistral")).unwrap();
        assert_eq!(llm.model_name(), "mistral");
    }

    #[test]
    fn test_create_openai() {
        let llm = LlmFactory::create(&LlmProviderConfig::openai("sk-test", "gpt-4o-mini")).unwrap();
        assert_eq!(llm.model_name(), "gpt-4o-mini");
    }

    #[test]
    fn test_builder() {
        let config = LlmProviderConfig::ollama("mistral")
            .with_endpoint("http://gpu-box:11434")
            .with_temperature(0.1)
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.endpoint.as_deref(), Some("http://gpu-box:11434"));
        assert_eq!(config.temperature, 0.1);
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
    }
}
