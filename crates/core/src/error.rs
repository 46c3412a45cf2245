//! Error types

use thiserror::Error;

/// Umbrella error for the pipeline
///
/// Each crate keeps its own error enum and converts into this one at the boundary.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("RAG error: {0}")]
    Rag(String),

    #[error("Ingestion error: {0}")]
    Ingest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
