//! Text Embeddings
//!
//! Dense embeddings for the vector index. [`SimpleEmbedder`] needs no model and
//! is the default; [`OnnxEmbedder`] runs a sentence-transformer export with mean
//! pooling when the `onnx` feature is enabled.

use async_trait::async_trait;

#[cfg(feature = "onnx")]
use ndarray::Array2;
#[cfg(feature = "onnx")]
use ort::{session::builder::GraphOptimizationLevel, session::Session, value::Tensor};
#[cfg(feature = "onnx")]
use parking_lot::Mutex;
#[cfg(feature = "onnx")]
use std::path::Path;
#[cfg(feature = "onnx")]
use tokenizers::Tokenizer;

use crate::RagError;

/// Embedding configuration
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Maximum sequence length
    pub max_seq_len: usize,
    /// Embedding dimension
    pub embedding_dim: usize,
    /// Normalize embeddings
    pub normalize: bool,
    /// Batch size for bulk embedding
    pub batch_size: usize,
    /// ONNX output tensor holding token embeddings
    pub output_name: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            max_seq_len: 256,
            embedding_dim: 384,
            normalize: true,
            batch_size: 32,
            output_name: "last_hidden_state".to_string(),
        }
    }
}

impl EmbeddingConfig {
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim;
        self
    }
}

/// Text to vector
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;

    /// Embed multiple texts, in order
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Output dimension
    fn dim(&self) -> usize;
}

pub(crate) fn normalize(embedding: &mut [f32]) {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in embedding.iter_mut() {
            *v /= norm;
        }
    }
}

/// Hashed bag-of-words embedder (no model required)
///
/// Each lowercased alphanumeric token is hashed (FNV-1a) into a bucket, so texts
/// sharing vocabulary land close together under cosine similarity.
pub struct SimpleEmbedder {
    config: EmbeddingConfig,
}

impl SimpleEmbedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self { config }
    }

    fn bucket(&self, token: &str) -> usize {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in token.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        (hash % self.config.embedding_dim as u64) as usize
    }

    /// Embed synchronously
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.config.embedding_dim];
        if self.config.embedding_dim == 0 {
            return embedding;
        }

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let idx = self.bucket(&token.to_lowercase());
            embedding[idx] += 1.0;
        }

        if self.config.normalize {
            normalize(&mut embedding);
        }

        embedding
    }
}

impl Default for SimpleEmbedder {
    fn default() -> Self {
        Self::new(EmbeddingConfig::default())
    }
}

#[async_trait]
impl TextEmbedder for SimpleEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        Ok(self.embed_sync(text))
    }

    fn dim(&self) -> usize {
        self.config.embedding_dim
    }
}

/// Sentence-transformer embedder using ONNX Runtime
#[cfg(feature = "onnx")]
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    config: EmbeddingConfig,
}

#[cfg(feature = "onnx")]
impl OnnxEmbedder {
    pub fn new(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        config: EmbeddingConfig,
    ) -> Result<Self, RagError> {
        let session = Session::builder()
            .map_err(|e| RagError::Model(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| RagError::Model(e.to_string()))?
            .with_intra_threads(2)
            .map_err(|e| RagError::Model(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| RagError::Model(e.to_string()))?;

        let tokenizer =
            Tokenizer::from_file(tokenizer_path).map_err(|e| RagError::Model(e.to_string()))?;

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            config,
        })
    }

    fn embed_batch_internal(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RagError> {
        let batch_size = texts.len();
        let seq_len = self.config.max_seq_len;

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        let mut input_ids = vec![0i64; batch_size * seq_len];
        let mut attention_mask = vec![0i64; batch_size * seq_len];
        let mut token_type_ids = vec![0i64; batch_size * seq_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let types = encoding.get_type_ids();

            let len = ids.len().min(seq_len);
            let offset = i * seq_len;

            for j in 0..len {
                input_ids[offset + j] = ids[j] as i64;
                attention_mask[offset + j] = mask[j] as i64;
                token_type_ids[offset + j] = types[j] as i64;
            }
        }

        let to_tensor = |data: Vec<i64>| -> Result<Tensor<i64>, RagError> {
            let array = Array2::from_shape_vec((batch_size, seq_len), data)
                .map_err(|e| RagError::Embedding(e.to_string()))?;
            Tensor::from_array(array).map_err(|e| RagError::Model(e.to_string()))
        };

        let input_ids_tensor = to_tensor(input_ids)?;
        let attention_mask_tensor = to_tensor(attention_mask)?;
        let token_type_ids_tensor = to_tensor(token_type_ids)?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor,
            ])
            .map_err(|e| RagError::Model(e.to_string()))?;

        let (shape, hidden) = outputs
            .get(&self.config.output_name)
            .ok_or_else(|| {
                RagError::Model(format!(
                    "Missing output tensor: {}",
                    self.config.output_name
                ))
            })?
            .try_extract_tensor::<f32>()
            .map_err(|e| RagError::Model(e.to_string()))?;

        // [batch, seq_len, hidden_dim]
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        let (tensor_batch, tensor_seq, tensor_hidden) = match dims.as_slice() {
            [b, s, h] => (*b, *s, *h),
            _ => {
                return Err(RagError::Model(format!(
                    "Unexpected tensor shape: {:?}",
                    dims
                )))
            },
        };

        let mut embeddings = Vec::with_capacity(batch_size);
        for (i, encoding) in encodings.iter().enumerate().take(tensor_batch) {
            let tokens = encoding.get_ids().len().min(seq_len).min(tensor_seq);
            let mut embedding = vec![0.0f32; self.config.embedding_dim];

            for j in 0..tokens {
                for (k, slot) in embedding.iter_mut().enumerate().take(tensor_hidden) {
                    let idx = i * tensor_seq * tensor_hidden + j * tensor_hidden + k;
                    if let Some(v) = hidden.get(idx) {
                        *slot += v;
                    }
                }
            }

            if tokens > 0 {
                for v in &mut embedding {
                    *v /= tokens as f32;
                }
            }
            if self.config.normalize {
                normalize(&mut embedding);
            }
            embeddings.push(embedding);
        }

        Ok(embeddings)
    }
}

#[cfg(feature = "onnx")]
#[async_trait]
impl TextEmbedder for OnnxEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.embed_batch_internal(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            all.extend(self.embed_batch_internal(batch)?);
        }
        Ok(all)
    }

    fn dim(&self) -> usize {
        self.config.embedding_dim
    }
}
