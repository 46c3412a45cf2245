//! Ollama Embeddings
//!
//! Uses Ollama's `/api/embed` endpoint for dense vectors.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::embeddings::TextEmbedder;
use crate::RagError;

/// Ollama embedding configuration
#[derive(Debug, Clone)]
pub struct OllamaEmbeddingConfig {
    /// Ollama API endpoint
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// Embedding dimension
    pub embedding_dim: usize,
}

impl Default for OllamaEmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "all-minilm".to_string(),
            embedding_dim: 384,
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama embedder
pub struct OllamaEmbedder {
    client: Client,
    config: OllamaEmbeddingConfig,
}

impl OllamaEmbedder {
    pub fn new(config: OllamaEmbeddingConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn url(&self) -> String {
        format!("{}/api/embed", self.config.endpoint.trim_end_matches('/'))
    }

    async fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RagError> {
        let request = EmbedRequest {
            model: &self.config.model,
            input: texts.to_vec(),
        };

        let response = self
            .client
            .post(self.url())
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("Ollama request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!(
                "Ollama embedding failed: {} - {}",
                status, text
            )));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("Failed to parse Ollama response: {}", e)))?;

        if embed_response.embeddings.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                embed_response.embeddings.len()
            )));
        }

        Ok(embed_response.embeddings)
    }
}

#[async_trait]
impl TextEmbedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.request(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }

    fn dim(&self) -> usize {
        self.config.embedding_dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = OllamaEmbeddingConfig::default();
        assert_eq!(config.embedding_dim, 384);
        assert_eq!(config.endpoint, "http://localhost:11434");
    }

    #[test]
    fn test_request_serialization() {
        let request = EmbedRequest {
            model: "all-minilm",
            input: vec!["a", "b"],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "all-minilm");
        assert_eq!(json["input"][1], "b");
    }

    #[test]
    fn test_url() {
        let embedder = OllamaEmbedder::new(OllamaEmbeddingConfig {
            endpoint: "http://gpu:11434/".to_string(),
            ..Default::default()
        });
        assert_eq!(embedder.url(), "http://gpu:11434/api/embed");
        assert_eq!(embedder.model(), "all-minilm");
    }
}
