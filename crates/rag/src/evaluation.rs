//! Evaluation
//!
//! LLM-as-judge scoring (faithfulness, relevance) and offline rank metrics
//! (hit rate, MRR) over labeled queries.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use litreview_core::Candidate;
use litreview_llm::TextGenerator;

use crate::prompts;

// Tolerates markdown emphasis between the label and the number ("**Score:** 4")
static SCORE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"Score:[\s*_]*(\d+)").unwrap());

/// Parsed judge verdict
///
/// `score` is 0 when the judge output had no `Score: N` line; `reasoning`
/// always holds the full judge text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub score: u32,
    pub reasoning: String,
}

impl EvaluationRecord {
    /// True when no score could be parsed
    pub fn is_unparsed(&self) -> bool {
        self.score == 0
    }
}

/// Parse free-form judge output
pub fn parse_judge_output(text: &str) -> EvaluationRecord {
    let score = SCORE_PATTERN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);

    EvaluationRecord {
        score,
        reasoning: text.to_string(),
    }
}

/// Judge-based and offline evaluation
pub struct Evaluator {
    llm: Arc<dyn TextGenerator>,
}

impl Evaluator {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    async fn judge(&self, prompt: &str) -> EvaluationRecord {
        let output = self.llm.generate(prompt).await;
        let record = parse_judge_output(output.trim());
        if record.is_unparsed() {
            tracing::warn!("Judge output had no parsable score");
        }
        record
    }

    /// Is the answer supported by the context?
    pub async fn faithfulness(&self, answer: &str, context: &[Candidate]) -> EvaluationRecord {
        let context_text = context
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let record = self
            .judge(&prompts::faithfulness_judge(&context_text, answer))
            .await;
        tracing::info!(score = record.score, "Faithfulness judged");
        record
    }

    /// Does the answer address the query?
    pub async fn relevance(&self, query: &str, answer: &str) -> EvaluationRecord {
        let record = self.judge(&prompts::relevance_judge(query, answer)).await;
        tracing::info!(score = record.score, "Relevance judged");
        record
    }

    fn titles(retrieved: &[Candidate]) -> impl Iterator<Item = &str> {
        retrieved.iter().map(|c| c.title().unwrap_or(""))
    }

    /// Fraction of queries with at least one relevant title retrieved
    ///
    /// Lists are paired by position; the denominator is the number of
    /// retrieved lists. Empty input gives 0.0.
    pub fn hit_rate(retrieved: &[Vec<Candidate>], relevant: &[Vec<String>]) -> f64 {
        if retrieved.is_empty() {
            return 0.0;
        }
        let hits = retrieved
            .iter()
            .zip(relevant)
            .filter(|(got, want)| Self::titles(got).any(|t| want.iter().any(|r| r == t)))
            .count();
        hits as f64 / retrieved.len() as f64
    }

    /// Mean reciprocal rank of the first relevant title
    pub fn mrr(retrieved: &[Vec<Candidate>], relevant: &[Vec<String>]) -> f64 {
        if retrieved.is_empty() {
            return 0.0;
        }
        let total: f64 = retrieved
            .iter()
            .zip(relevant)
            .map(|(got, want)| {
                Self::titles(got)
                    .position(|t| want.iter().any(|r| r == t))
                    .map(|i| 1.0 / (i + 1) as f64)
                    .unwrap_or(0.0)
            })
            .sum();
        total / retrieved.len() as f64
    }
}
