//! Recursive Character Chunking
//!
//! Splits document text into overlapping chunks of at most `chunk_size`
//! characters, preferring paragraph, then line, then sentence, then word
//! boundaries before falling back to single characters.
//!
//! # Algorithm
//!
//! 1. Pick the first separator that occurs in the text (the empty separator
//!    always matches) and split on it, keeping each separator at the start of
//!    the piece that follows it.
//! 2. Pieces shorter than `chunk_size` are greedily merged into chunks. When a
//!    chunk is emitted, whole pieces are dropped from its front until at most
//!    `chunk_overlap` characters remain; those carry over into the next chunk.
//! 3. Pieces that are too long are split recursively with the remaining
//!    separators.
//!
//! Chunks are whitespace-trimmed; empty chunks are dropped.
//!
//! # Usage
//!
//! ```ignore
//! let chunker = RecursiveChunker::new(ChunkConfig::default())?;
//! let chunks = chunker.chunk_text(&text, &metadata);
//! ```

use std::collections::VecDeque;
use std::path::Path;

use litreview_config::ChunkingConfig;
use litreview_core::{metadata_keys, Chunk, Metadata};

use crate::RagError;

/// Chunking configuration (sizes in characters)
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Separator priority; an empty string means "split into characters"
    pub separators: Vec<String>,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            separators: default_separators(),
        }
    }
}

fn default_separators() -> Vec<String> {
    litreview_config::constants::chunking::SEPARATORS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl From<&ChunkingConfig> for ChunkConfig {
    fn from(config: &ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            separators: default_separators(),
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split on `sep`, keeping the separator at the start of the following piece
fn split_keeping_separator<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    if sep.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(sep) {
        pieces.push(&text[start..idx]);
        start = idx;
    }
    pieces.push(&text[start..]);
    pieces.retain(|p| !p.is_empty());
    pieces
}

fn join_trimmed(pieces: &VecDeque<&str>) -> Option<String> {
    let joined: String = pieces.iter().copied().collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Recursive separator-priority chunker
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    config: ChunkConfig,
}

impl RecursiveChunker {
    pub fn new(config: ChunkConfig) -> Result<Self, RagError> {
        if config.chunk_size == 0 {
            return Err(RagError::InvalidArgument(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(RagError::InvalidArgument(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Split text into chunk strings
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.config.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = "";
        let mut remaining: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.config.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }
            if remaining.is_empty() {
                if let Some(doc) = join_trimmed(&VecDeque::from([piece])) {
                    chunks.push(doc);
                }
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }
        chunks
    }

    /// Greedily merge small pieces into chunks with overlap
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);

            if total + len > size && !current.is_empty() {
                if let Some(doc) = join_trimmed(&current) {
                    docs.push(doc);
                }
                while total > overlap || (total + len > size && total > 0) {
                    match current.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }

            current.push_back(piece);
            total += len;
        }

        if let Some(doc) = join_trimmed(&current) {
            docs.push(doc);
        }
        docs
    }

    /// Chunk a document
    ///
    /// Ids are `{file name}_{index}`, where the file name comes from the
    /// `filepath` metadata (falling back to `title`). Every chunk carries a
    /// copy of `metadata`.
    pub fn chunk_text(&self, text: &str, metadata: &Metadata) -> Vec<Chunk> {
        let source = metadata
            .get(metadata_keys::FILEPATH)
            .and_then(|p| Path::new(p).file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .or_else(|| metadata.get(metadata_keys::TITLE).cloned())
            .unwrap_or_else(|| "document".to_string());

        self.split_text(text)
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| Chunk::new(format!("{}_{}", source, i), chunk, metadata.clone()))
            .collect()
    }
}
