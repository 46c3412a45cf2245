//! Paper ingestion
//!
//! - [`source`]: catalog search (arXiv Atom API)
//! - [`downloader`]: PDF download into the papers directory
//! - [`parser`]: text extraction by file extension
//! - [`indexer`]: parse, chunk and index a directory of documents

pub mod downloader;
pub mod indexer;
pub mod parser;
pub mod source;

pub use downloader::{
    sanitize_title, DownloadOutcome, DownloadStats, DownloaderConfig, HttpFetcher,
    PaperDownloader, PaperRecord, PdfFetcher,
};
pub use indexer::{Indexer, IndexingStats};
#[cfg(feature = "pdf")]
pub use parser::PdfParser;
pub use parser::{DocumentParser, ParserRegistry, PlainTextParser};
pub use source::{ArxivSource, PaperMetadata, PaperSource};

use litreview_rag::RagError;
use thiserror::Error;

/// Ingestion errors
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported document: {0}")]
    Unsupported(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Index error: {0}")]
    Index(String),
}

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        IngestError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for IngestError {
    fn from(err: reqwest::Error) -> Self {
        IngestError::Network(err.to_string())
    }
}

impl From<RagError> for IngestError {
    fn from(err: RagError) -> Self {
        IngestError::Index(err.to_string())
    }
}

impl From<IngestError> for litreview_core::Error {
    fn from(err: IngestError) -> Self {
        litreview_core::Error::Ingest(err.to_string())
    }
}
