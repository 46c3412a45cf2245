//! Query Rewriting
//!
//! HyDE and sub-question decomposition. Each operation is one prompt to the
//! text generator with no retries. Generator failures are returned as
//! [`RagError::Generation`] so retrieval fails instead of quietly degrading.

use std::sync::Arc;

use litreview_config::constants::retrieval;
use litreview_llm::TextGenerator;

use crate::prompts;
use crate::RagError;

/// Rewrites a topic into search text
pub struct QueryRewriter {
    llm: Arc<dyn TextGenerator>,
    max_sub_questions: usize,
}

impl QueryRewriter {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self {
            llm,
            max_sub_questions: retrieval::MAX_SUB_QUESTIONS,
        }
    }

    pub fn with_max_sub_questions(mut self, max: usize) -> Self {
        self.max_sub_questions = max;
        self
    }

    /// Fabricate a plausible answer to embed in place of the query
    ///
    /// The output is not validated; an empty answer is passed through.
    pub async fn hypothetical_answer(&self, query: &str) -> Result<String, RagError> {
        let answer = self
            .llm
            .try_generate(&prompts::hypothetical_answer(query))
            .await
            .map_err(|e| RagError::Generation(format!("HyDE rewrite failed: {}", e)))?;
        let answer = answer.trim().to_string();

        tracing::debug!(
            query,
            preview = %answer.chars().take(100).collect::<String>(),
            "Generated hypothetical answer"
        );
        Ok(answer)
    }

    /// Decompose the query into at most `max_sub_questions` sub-questions
    ///
    /// Zero sub-questions is a valid outcome.
    pub async fn sub_questions(&self, query: &str) -> Result<Vec<String>, RagError> {
        let response = self
            .llm
            .try_generate(&prompts::sub_questions(query))
            .await
            .map_err(|e| RagError::Generation(format!("Query decomposition failed: {}", e)))?;

        let questions = parse_sub_questions(&response, self.max_sub_questions);
        tracing::debug!(query, count = questions.len(), ?questions, "Decomposed query");
        Ok(questions)
    }
}

/// One question per line; list markers stripped, empty lines dropped
pub fn parse_sub_questions(response: &str, max: usize) -> Vec<String> {
    response
        .lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| {
                    c.is_ascii_digit() || matches!(c, '-' | '*' | '.' | ')') || c.is_whitespace()
                })
                .trim_end()
        })
        .filter(|q| !q.is_empty())
        .take(max)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use litreview_llm::LlmError;
    use parking_lot::Mutex;

    struct ScriptedLlm {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err("connection refused".to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedLlm {
        async fn try_generate(&self, prompt: &str) -> Result<String, LlmError> {
            self.prompts.lock().push(prompt.to_string());
            self.reply.clone().map_err(LlmError::Network)
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    #[test]
    fn test_parse_strips_markers() {
        let parsed = parse_sub_questions(
            "1. What is RAG in medical QA?\n- What is fine-tuning?\n\n   2) How do they compare?\n",
            3,
        );
        assert_eq!(
            parsed,
            vec![
                "What is RAG in medical QA?",
                "What is fine-tuning?",
                "How do they compare?"
            ]
        );
    }

    #[test]
    fn test_parse_truncates() {
        let parsed = parse_sub_questions("a\nb\nc\nd\ne", 3);
        assert_eq!(parsed, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parse_degenerate() {
        assert!(parse_sub_questions("", 3).is_empty());
        assert!(parse_sub_questions("\n  \n1.\n-\n", 3).is_empty());
    }

    #[tokio::test]
    async fn test_hypothetical_answer_trims() {
        let llm = ScriptedLlm::ok("  Retrieval grounds generation in documents.  \n");
        let rewriter = QueryRewriter::new(llm.clone());
        let answer = rewriter.hypothetical_answer("What is RAG?").await.unwrap();
        assert_eq!(answer, "Retrieval grounds generation in documents.");
        assert!(llm.prompts.lock()[0].contains("QUESTION: What is RAG?"));
    }

    #[tokio::test]
    async fn test_empty_answer_passes_through() {
        let rewriter = QueryRewriter::new(ScriptedLlm::ok(""));
        assert_eq!(rewriter.hypothetical_answer("q").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_sub_questions_respect_limit() {
        let rewriter =
            QueryRewriter::new(ScriptedLlm::ok("one\ntwo\nthree")).with_max_sub_questions(2);
        assert_eq!(rewriter.sub_questions("q").await.unwrap(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_failure_is_generation_error() {
        let rewriter = QueryRewriter::new(ScriptedLlm::failing());
        assert!(matches!(
            rewriter.hypothetical_answer("q").await,
            Err(RagError::Generation(_))
        ));
        assert!(matches!(
            rewriter.sub_questions("q").await,
            Err(RagError::Generation(_))
        ));
    }
}
