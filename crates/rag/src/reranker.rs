//! Cross-Encoder Reranking
//!
//! Candidates from any retrieval strategy are re-scored jointly with the
//! original query and cut to `top_k`. All pairs of one call go to the
//! cross-encoder as a single batch.
//!
//! Two encoders are provided:
//! - [`OnnxCrossEncoder`]: ms-marco style cross-encoder via ONNX Runtime (feature `onnx`)
//! - [`LexicalCrossEncoder`]: TF-IDF-like keyword scorer, no model required

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

#[cfg(feature = "onnx")]
use ndarray::Array2;
#[cfg(feature = "onnx")]
use ort::{session::builder::GraphOptimizationLevel, session::Session, value::Tensor};
#[cfg(feature = "onnx")]
use std::path::Path;
#[cfg(feature = "onnx")]
use tokenizers::Tokenizer;

use litreview_core::Candidate;

use crate::RagError;

/// Joint (query, passage) relevance model
pub trait CrossEncoder: Send + Sync {
    /// Score every passage against the query; one score per passage, in order
    fn score_batch(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>, RagError>;

    /// Model identifier
    fn name(&self) -> &str;
}

/// Reranker configuration
#[derive(Debug, Clone)]
pub struct RerankerConfig {
    /// Maximum tokens per (query, passage) pair
    pub max_seq_len: usize,
    /// Pairs per inference run
    pub batch_size: usize,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            max_seq_len: 512,
            batch_size: 32,
        }
    }
}

/// Reranker statistics
#[derive(Debug, Clone, Default)]
pub struct RerankerStats {
    /// Total rerank calls
    pub total_calls: usize,
    /// Total pairs scored
    pub total_pairs: usize,
    /// Pairs in the largest single call
    pub max_batch: usize,
}

/// Scores candidates with a cross-encoder and keeps the best `top_k`
pub struct Reranker {
    encoder: Arc<dyn CrossEncoder>,
    stats: Mutex<RerankerStats>,
}

impl Reranker {
    pub fn new(encoder: Arc<dyn CrossEncoder>) -> Self {
        Self {
            encoder,
            stats: Mutex::new(RerankerStats::default()),
        }
    }

    /// Reranker over [`LexicalCrossEncoder`]
    pub fn lexical() -> Self {
        Self::new(Arc::new(LexicalCrossEncoder))
    }

    /// Rerank candidates against the original query
    ///
    /// Assigns `rerank_score` to every candidate, sorts descending (stable, so
    /// ties keep input order) and returns at most `top_k`. An empty input
    /// returns empty without consulting the model.
    pub fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<Candidate>,
        top_k: usize,
    ) -> Result<Vec<Candidate>, RagError> {
        if candidates.is_empty() {
            return Ok(candidates);
        }
        if top_k == 0 {
            return Err(RagError::InvalidArgument(
                "top_k must be a positive integer".to_string(),
            ));
        }

        let passages: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();
        let scores = self.encoder.score_batch(query, &passages)?;
        if scores.len() != candidates.len() {
            return Err(RagError::Reranker(format!(
                "Cross-encoder returned {} scores for {} pairs",
                scores.len(),
                candidates.len()
            )));
        }

        for (candidate, score) in candidates.iter_mut().zip(scores) {
            candidate.rerank_score = Some(score);
        }

        // sort_by is stable; NaN scores rank last
        candidates.sort_by(|a, b| rank_key(b.rerank_score).total_cmp(&rank_key(a.rerank_score)));

        let pairs = candidates.len();
        {
            let mut stats = self.stats.lock();
            stats.total_calls += 1;
            stats.total_pairs += pairs;
            stats.max_batch = stats.max_batch.max(pairs);
        }
        metrics::counter!("litreview_rerank_pairs_total").increment(pairs as u64);

        candidates.truncate(top_k);

        tracing::debug!(
            encoder = self.encoder.name(),
            pairs,
            kept = candidates.len(),
            "Reranked candidates"
        );

        Ok(candidates)
    }

    pub fn encoder_name(&self) -> &str {
        self.encoder.name()
    }

    /// Get reranker statistics
    pub fn stats(&self) -> RerankerStats {
        self.stats.lock().clone()
    }

    /// Reset statistics
    pub fn reset_stats(&self) {
        *self.stats.lock() = RerankerStats::default();
    }
}

fn rank_key(score: Option<f32>) -> f32 {
    match score {
        Some(s) if !s.is_nan() => s,
        _ => f32::NEG_INFINITY,
    }
}

/// Cross-encoder using ONNX Runtime
#[cfg(feature = "onnx")]
pub struct OnnxCrossEncoder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    config: RerankerConfig,
    name: String,
}

#[cfg(feature = "onnx")]
impl OnnxCrossEncoder {
    pub fn new(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        config: RerankerConfig,
    ) -> Result<Self, RagError> {
        let name = model_path.as_ref().display().to_string();
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
            name,
        })
    }

    fn score_chunk(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>, RagError> {
        let batch = passages.len();
        let seq_len = self.config.max_seq_len;

        let pairs: Vec<(&str, &str)> = passages.iter().map(|p| (query, *p)).collect();
        let encodings = self
            .tokenizer
            .encode_batch(pairs, true)
            .map_err(|e| RagError::Reranker(e.to_string()))?;

        let mut input_ids = vec![0i64; batch * seq_len];
        let mut attention_mask = vec![0i64; batch * seq_len];
        let mut token_type_ids = vec![0i64; batch * seq_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let types = encoding.get_type_ids();
            let len = ids.len().min(seq_len);
            let offset = i * seq_len;
            for j in 0..len {
                input_ids[offset + j] = ids[j] as i64;
                attention_mask[offset + j] = 1;
                token_type_ids[offset + j] = types[j] as i64;
            }
        }

        let to_tensor = |data: Vec<i64>| -> Result<Tensor<i64>, RagError> {
            let array = Array2::from_shape_vec((batch, seq_len), data)
                .map_err(|e| RagError::Reranker(e.to_string()))?;
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

        let (shape, logits) = outputs
            .get("logits")
            .ok_or_else(|| RagError::Model("Missing logits output".to_string()))?
            .try_extract_tensor::<f32>()
            .map_err(|e| RagError::Model(e.to_string()))?;

        // [batch, labels]
        let labels = shape.get(1).map(|&d| d as usize).unwrap_or(1).max(1);
        let scores = logits
            .chunks(labels)
            .take(batch)
            .map(relevance_from_logits)
            .collect();
        Ok(scores)
    }
}

/// Relevance probability from one row of logits
#[cfg(feature = "onnx")]
fn relevance_from_logits(row: &[f32]) -> f32 {
    match row {
        [] => 0.0,
        [single] => 1.0 / (1.0 + (-single).exp()),
        _ => {
            let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
            let exp_sum: f32 = row.iter().map(|&x| (x - max).exp()).sum();
            (row[1] - max).exp() / exp_sum
        },
    }
}

#[cfg(feature = "onnx")]
impl CrossEncoder for OnnxCrossEncoder {
    fn score_batch(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>, RagError> {
        let mut scores = Vec::with_capacity(passages.len());
        for chunk in passages.chunks(self.config.batch_size.max(1)) {
            scores.extend(self.score_chunk(query, chunk)?);
        }
        Ok(scores)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Keyword-overlap cross-encoder for use without a model
pub struct LexicalCrossEncoder;

impl CrossEncoder for LexicalCrossEncoder {
    fn score_batch(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>, RagError> {
        Ok(passages
            .iter()
            .map(|p| SimpleScorer::score(query, p))
            .collect())
    }

    fn name(&self) -> &str {
        "lexical"
    }
}

/// TF-IDF-like relevance scorer
pub struct SimpleScorer;

impl SimpleScorer {
    const STOPWORDS: &'static [&'static str] = &[
        "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
        "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "can",
        "to", "of", "in", "for", "on", "with", "at", "by", "from", "as", "into", "through",
        "between", "then", "than", "there", "when", "where", "why", "how", "all", "each", "more",
        "most", "other", "some", "such", "no", "not", "only", "so", "too", "very", "and", "but",
        "if", "or", "because", "while", "about", "we", "our", "you", "your", "it", "its", "they",
        "them", "their", "what", "which", "who", "this", "that", "these", "those", "vs", "versus",
    ];

    fn tokens(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric() && c != '-')
            .map(|t| t.trim_matches('-').to_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Score in [0, 1)
    ///
    /// - Term frequency: sqrt(count in passage)
    /// - IDF approximation: ln(1 + term length)
    /// - Earlier query terms weigh slightly more
    /// - Coverage bonus for matching more distinct query terms
    pub fn score(query: &str, passage: &str) -> f32 {
        let stopwords: HashSet<&str> = Self::STOPWORDS.iter().copied().collect();

        let mut seen = HashSet::new();
        let query_terms: Vec<String> = Self::tokens(query)
            .into_iter()
            .filter(|w| w.len() > 1 && !stopwords.contains(w.as_str()))
            .filter(|w| seen.insert(w.clone()))
            .collect();

        if query_terms.is_empty() {
            return 0.0;
        }

        let passage_terms = Self::tokens(passage);
        let passage_len = passage_terms.len().max(1) as f32;
        let length_norm = 1.0 / (1.0 + (passage_len / 50.0).sqrt());

        let mut total = 0.0f32;
        let mut matched = 0usize;

        for (pos, term) in query_terms.iter().enumerate() {
            let tf = passage_terms.iter().filter(|w| *w == term).count() as f32;
            if tf > 0.0 {
                matched += 1;
                let idf_approx = (1.0 + term.len() as f32).ln();
                let position_weight = 1.0 / (1.0 + pos as f32 * 0.1);
                total += tf.sqrt() * idf_approx * position_weight * length_norm;
            }
        }

        let coverage = matched as f32 / query_terms.len() as f32;
        let raw = total + coverage * 0.3;
        raw / (raw + 1.0)
    }
}
