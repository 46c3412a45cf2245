//! Review Generation
//!
//! One prompt, one call. The model output is returned as-is.

use std::sync::Arc;

use litreview_core::Candidate;
use litreview_llm::TextGenerator;

use crate::prompts;
use crate::refiner::ContextRefiner;

/// Writes a literature review grounded in retrieved chunks
pub struct ReviewGenerator {
    llm: Arc<dyn TextGenerator>,
    refiner: Option<ContextRefiner>,
}

impl ReviewGenerator {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm, refiner: None }
    }

    /// Refine context before every review
    pub fn with_refiner(mut self, refiner: ContextRefiner) -> Self {
        self.refiner = Some(refiner);
        self
    }

    pub fn assemble_prompt(&self, query: &str, chunks: &[Candidate]) -> String {
        prompts::literature_review(query, chunks)
    }

    /// Refine (when configured) and generate
    ///
    /// Returns the chunks the prompt was built from along with the review, so
    /// callers can judge faithfulness against the same context.
    pub async fn generate_review(
        &self,
        query: &str,
        chunks: Vec<Candidate>,
    ) -> (String, Vec<Candidate>) {
        let context = match &self.refiner {
            Some(refiner) => refiner.refine(query, chunks).await,
            None => chunks,
        };

        let prompt = self.assemble_prompt(query, &context);
        tracing::debug!(
            chunks = context.len(),
            prompt_chars = prompt.len(),
            "Generating review"
        );

        // Provider failures come back as the review text
        let review = self.llm.generate(&prompt).await;
        (review, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refiner::RefinerConfig;
    use async_trait::async_trait;
    use litreview_core::{metadata_keys, Chunk, Metadata};
    use litreview_llm::LlmError;
    use parking_lot::Mutex;

    struct RecordingLlm {
        reply: Result<&'static str, &'static str>,
        prompts: Mutex<Vec<String>>,
    }

    impl RecordingLlm {
        fn new(reply: Result<&'static str, &'static str>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for RecordingLlm {
        async fn try_generate(&self, prompt: &str) -> Result<String, LlmError> {
            self.prompts.lock().push(prompt.to_string());
            self.reply
                .map(str::to_string)
                .map_err(|e| LlmError::Network(e.to_string()))
        }

        fn error_text(&self, err: &LlmError) -> String {
            format!("Error calling Ollama: {}", err)
        }

        fn model_name(&self) -> &str {
            "recording"
        }
    }

    fn chunk(title: &str, text: &str) -> Candidate {
        let mut metadata = Metadata::new();
        metadata.insert(metadata_keys::TITLE.to_string(), title.to_string());
        Chunk::new(format!("{}_0", title), text, metadata).into()
    }

    #[tokio::test]
    async fn test_single_call_raw_output() {
        let llm = RecordingLlm::new(Ok("  ## Review\nBody  "));
        let generator = ReviewGenerator::new(llm.clone());

        let (review, context) = generator
            .generate_review("RAG", vec![chunk("a.pdf", "alpha")])
            .await;

        assert_eq!(review, "  ## Review\nBody  ");
        assert_eq!(context.len(), 1);
        let prompts = llm.prompts.lock();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Source: a.pdf\nText: alpha"));
    }

    #[tokio::test]
    async fn test_failure_is_in_band() {
        let generator = ReviewGenerator::new(RecordingLlm::new(Err("connection refused")));
        let (review, _) = generator.generate_review("RAG", Vec::new()).await;
        assert!(review.starts_with("Error calling Ollama:"));
    }

    #[tokio::test]
    async fn test_refines_before_generating() {
        let llm = RecordingLlm::new(Ok("An extracted relevant sentence."));
        let refiner = ContextRefiner::new(llm.clone(), RefinerConfig::default());
        let generator = ReviewGenerator::new(llm.clone()).with_refiner(refiner);

        let (_, context) = generator
            .generate_review("RAG", vec![chunk("a.pdf", "original text")])
            .await;

        assert_eq!(context[0].text, "An extracted relevant sentence.");
        let prompts = llm.prompts.lock();
        // One refinement call, then one generation call
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("Text: An extracted relevant sentence."));
    }
}
