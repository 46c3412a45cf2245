//! Review files and quality reports

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use litreview_core::Result;
use litreview_ingest::sanitize_title;
use litreview_rag::EvaluationRecord;

/// `review_<sanitized topic, spaces as underscores>.md`
///
/// Path separators and other punctuation are dropped, so the file always
/// lands directly in the output directory.
pub fn review_file_name(topic: &str) -> String {
    format!("review_{}.md", sanitize_title(topic).replace(' ', "_"))
}

/// Markdown body of a saved review
pub fn render_review(topic: &str, strategy: &str, review: &str) -> String {
    format!("# {}\n\n**Strategy:** {}\n\n{}", topic, strategy, review)
}

/// Write the review into `output_dir`, creating it if needed
///
/// An existing review for the same topic is overwritten.
pub async fn save_review(
    output_dir: &Path,
    topic: &str,
    strategy: &str,
    review: &str,
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(output_dir).await?;
    let path = output_dir.join(review_file_name(topic));
    tokio::fs::write(&path, render_review(topic, strategy, review)).await?;
    tracing::info!(path = %path.display(), "Review saved");
    Ok(path)
}

/// Judge verdicts for one generated review
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualityReport {
    pub faithfulness: EvaluationRecord,
    pub relevance: EvaluationRecord,
}

/// First `max` characters of `text`
pub fn preview(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Faithfulness Score: {}/5", self.faithfulness.score)?;
        writeln!(f, "Reasoning: {}...", preview(&self.faithfulness.reasoning, 200))?;
        writeln!(f)?;
        writeln!(f, "Relevance Score: {}/5", self.relevance.score)?;
        write!(f, "Reasoning: {}...", preview(&self.relevance.reasoning, 200))
    }
}
