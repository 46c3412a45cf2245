//! Context Refinement
//!
//! Before generation each retrieved chunk is reduced to the sentences relevant
//! to the query. A chunk survives only if the model did not answer with the
//! sentinel and the extraction is longer than `min_length` characters.
//!
//! Fail-open: if nothing survives, the unrefined chunks are returned.

use std::sync::Arc;

use litreview_config::constants::refinement;
use litreview_config::RefinementConfig;
use litreview_core::Candidate;
use litreview_llm::TextGenerator;

use crate::prompts;

/// Refiner configuration
#[derive(Debug, Clone)]
pub struct RefinerConfig {
    pub enabled: bool,
    /// Extractions must be longer than this many characters
    pub min_length: usize,
    /// Marker for "nothing relevant here"
    pub sentinel: String,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_length: refinement::MIN_LENGTH,
            sentinel: refinement::SENTINEL.to_string(),
        }
    }
}

impl From<&RefinementConfig> for RefinerConfig {
    fn from(config: &RefinementConfig) -> Self {
        Self {
            enabled: config.enabled,
            min_length: config.min_length,
            sentinel: config.sentinel.clone(),
        }
    }
}

/// LLM-driven sentence extraction over retrieved chunks
pub struct ContextRefiner {
    llm: Arc<dyn TextGenerator>,
    config: RefinerConfig,
}

impl ContextRefiner {
    pub fn new(llm: Arc<dyn TextGenerator>, config: RefinerConfig) -> Self {
        Self { llm, config }
    }

    fn keep(&self, extraction: &str) -> bool {
        !extraction.contains(self.config.sentinel.as_str())
            && extraction.chars().count() > self.config.min_length
    }

    /// Refine chunks one at a time, in order
    ///
    /// Kept chunks have their text replaced by the extraction; everything
    /// else about them is unchanged. A failed model call drops that chunk.
    pub async fn refine(&self, query: &str, chunks: Vec<Candidate>) -> Vec<Candidate> {
        if !self.config.enabled || chunks.is_empty() {
            return chunks;
        }

        let mut refined = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let prompt = prompts::refine(query, &chunk.text, &self.config.sentinel);
            let extraction = match self.llm.try_generate(&prompt).await {
                Ok(text) => text.trim().to_string(),
                Err(e) => {
                    tracing::warn!(chunk = %chunk.id, error = %e, "Refinement call failed, dropping chunk");
                    continue;
                },
            };

            if self.keep(&extraction) {
                let mut kept = chunk.clone();
                kept.text = extraction;
                refined.push(kept);
            } else {
                tracing::debug!(chunk = %chunk.id, "Chunk judged irrelevant");
            }
        }

        if refined.is_empty() {
            tracing::info!(
                chunks = chunks.len(),
                "Refinement removed every chunk, using unrefined context"
            );
            return chunks;
        }

        tracing::info!(
            before = chunks.len(),
            after = refined.len(),
            "Refined retrieved context"
        );
        refined
    }
}
