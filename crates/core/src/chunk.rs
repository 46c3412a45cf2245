//! Chunk and candidate types
//!
//! A [`Chunk`] is the atomic unit of indexing. A [`Candidate`] is a chunk as seen
//! by a single retrieval call, carrying the raw index score and, once reranked,
//! the cross-encoder score.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Flat string metadata attached to chunks
pub type Metadata = HashMap<String, String>;

/// Well-known metadata keys
pub mod metadata_keys {
    /// Source document title (file name for indexed papers)
    pub const TITLE: &str = "title";
    /// Path of the source document
    pub const FILEPATH: &str = "filepath";
}

/// Text chunk with provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique ID, `{source file name}_{sequence index}`
    pub id: String,
    /// Chunk text
    pub text: String,
    /// Metadata (at minimum `title` and `filepath`)
    #[serde(default)]
    pub metadata: Metadata,
}

impl Chunk {
    pub fn new(id: impl Into<String>, text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata,
        }
    }

    /// Source title, if present
    pub fn title(&self) -> Option<&str> {
        self.metadata.get(metadata_keys::TITLE).map(String::as_str)
    }
}

/// Where a candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSource {
    /// Dense vector search
    Vector,
    /// BM25 keyword search
    Sparse,
    /// Found by both dense and keyword search
    Hybrid,
}

impl fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateSource::Vector => write!(f, "vector"),
            CandidateSource::Sparse => write!(f, "sparse"),
            CandidateSource::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Retrieval candidate
///
/// `score` is whatever the producing source reports (a distance for the vector
/// index, lower is better; a BM25 or fused score otherwise) and is not comparable
/// across sources. Ordering after reranking is by `rerank_score` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Chunk ID
    pub id: String,
    /// Chunk text
    pub text: String,
    /// Chunk metadata
    pub metadata: Metadata,
    /// Raw source score
    pub score: f32,
    /// Producing source
    pub source: CandidateSource,
    /// Cross-encoder score, assigned by reranking
    pub rerank_score: Option<f32>,
}

impl Candidate {
    /// Candidate from a vector index hit
    pub fn from_vector(
        id: impl Into<String>,
        text: impl Into<String>,
        metadata: Metadata,
        distance: f32,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata,
            score: distance,
            source: CandidateSource::Vector,
            rerank_score: None,
        }
    }

    /// Source title, if present
    pub fn title(&self) -> Option<&str> {
        self.metadata.get(metadata_keys::TITLE).map(String::as_str)
    }
}

impl From<Chunk> for Candidate {
    fn from(chunk: Chunk) -> Self {
        Self::from_vector(chunk.id, chunk.text, chunk.metadata, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_title() {
        let mut metadata = Metadata::new();
        metadata.insert(metadata_keys::TITLE.to_string(), "paper.pdf".to_string());
        let chunk = Chunk::new("paper.pdf_0", "text", metadata);
        assert_eq!(chunk.title(), Some("paper.pdf"));

        let untitled = Chunk::new("x_0", "text", Metadata::new());
        assert_eq!(untitled.title(), None);
    }

    #[test]
    fn test_candidate_from_vector() {
        let candidate = Candidate::from_vector("a_0", "text", Metadata::new(), 0.25);
        assert_eq!(candidate.source, CandidateSource::Vector);
        assert_eq!(candidate.score, 0.25);
        assert!(candidate.rerank_score.is_none());
    }

    #[test]
    fn test_source_serialization() {
        let json = serde_json::to_string(&CandidateSource::Hybrid).unwrap();
        assert_eq!(json, "\"hybrid\"");
        assert_eq!(CandidateSource::Vector.to_string(), "vector");
    }
}
