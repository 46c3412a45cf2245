//! Directory indexing
//!
//! Rebuilds the vector index (and keyword index, when present) from the
//! documents in a directory. The rebuild is destructive and must not overlap
//! with queries against the same collection.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use litreview_core::{metadata_keys, Chunk, Metadata};
use litreview_rag::{RecursiveChunker, SparseIndex, VectorIndex};

use crate::parser::ParserRegistry;
use crate::IngestError;

/// Counters for one indexing run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexingStats {
    pub files_found: usize,
    pub documents_indexed: usize,
    pub documents_failed: usize,
    pub chunks_indexed: usize,
}

/// Parses, chunks and indexes documents
pub struct Indexer {
    parsers: Arc<ParserRegistry>,
    chunker: RecursiveChunker,
    index: Arc<dyn VectorIndex>,
    sparse_index: Option<Arc<SparseIndex>>,
    extensions: Vec<String>,
}

impl Indexer {
    pub fn new(
        parsers: ParserRegistry,
        chunker: RecursiveChunker,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            parsers: Arc::new(parsers),
            chunker,
            index,
            sparse_index: None,
            extensions: vec![litreview_config::constants::ingestion::DOCUMENT_EXTENSION.to_string()],
        }
    }

    /// Also feed chunks to a keyword index
    pub fn with_sparse_index(mut self, index: Arc<SparseIndex>) -> Self {
        self.sparse_index = Some(index);
        self
    }

    /// File extensions to pick up (case-insensitive)
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    /// Matching files directly inside `dir`, sorted by name
    pub fn discover(&self, dir: &Path) -> Vec<PathBuf> {
        WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| self.extensions.contains(&e.to_ascii_lowercase()))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Parse and chunk one document
    pub async fn chunk_file(&self, path: &Path) -> Result<Vec<Chunk>, IngestError> {
        // Extraction is CPU-bound and pdf-extract can panic on malformed input
        let parsers = self.parsers.clone();
        let owned = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || parsers.parse(&owned))
            .await
            .map_err(|e| IngestError::Parse(format!("{}: {}", path.display(), e)))??;

        let mut metadata = Metadata::new();
        metadata.insert(
            metadata_keys::FILEPATH.to_string(),
            path.display().to_string(),
        );
        metadata.insert(
            metadata_keys::TITLE.to_string(),
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );

        Ok(self.chunker.chunk_text(&text, &metadata))
    }

    async fn index_file(&self, path: &Path) -> Result<usize, IngestError> {
        let chunks = self.chunk_file(path).await?;
        if chunks.is_empty() {
            return Ok(0);
        }

        self.index.upsert(&chunks).await?;
        if let Some(sparse) = &self.sparse_index {
            sparse.index_chunks(&chunks)?;
        }
        Ok(chunks.len())
    }

    /// Reset the indexes and index every matching file in `dir`
    ///
    /// A missing directory indexes nothing. Per-document failures are logged
    /// and counted; they do not stop the run.
    pub async fn index_directory(&self, dir: &Path) -> Result<IndexingStats, IngestError> {
        self.index.reset().await?;
        if let Some(sparse) = &self.sparse_index {
            sparse.clear()?;
        }

        let files = self.discover(dir);
        let mut stats = IndexingStats {
            files_found: files.len(),
            ..Default::default()
        };
        tracing::info!(dir = %dir.display(), files = files.len(), "Indexing documents");

        for path in &files {
            match self.index_file(path).await {
                Ok(chunks) => {
                    tracing::info!(file = %path.display(), chunks, "Indexed document");
                    stats.documents_indexed += 1;
                    stats.chunks_indexed += chunks;
                    metrics::counter!("litreview_chunks_indexed_total").increment(chunks as u64);
                },
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Skipping document");
                    stats.documents_failed += 1;
                    metrics::counter!("litreview_documents_failed_total").increment(1);
                },
            }
        }

        tracing::info!(
            indexed = stats.documents_indexed,
            failed = stats.documents_failed,
            chunks = stats.chunks_indexed,
            "Indexing complete"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use litreview_rag::{ChunkConfig, LocalVectorIndex, SimpleEmbedder, SparseConfig};
    use std::fs;

    fn indexer(index: Arc<LocalVectorIndex>) -> Indexer {
        let chunker = RecursiveChunker::new(ChunkConfig {
            chunk_size: 60,
            chunk_overlap: 10,
            ..Default::default()
        })
        .unwrap();
        Indexer::new(ParserRegistry::new(), chunker, index)
            .with_extensions(vec!["txt".to_string(), ".MD".to_string()])
    }

    fn local_index() -> Arc<LocalVectorIndex> {
        Arc::new(LocalVectorIndex::in_memory(
            Arc::new(SimpleEmbedder::default()),
            "test",
        ))
    }

    fn write_corpus(dir: &Path) {
        fs::write(dir.join("b.txt"), "Sparse keyword retrieval with BM25.").unwrap();
        fs::write(
            dir.join("a.txt"),
            "Dense passage retrieval.\n\nCross-encoders rerank passages jointly with the query.",
        )
        .unwrap();
        fs::write(dir.join("ignored.bin"), "binary").unwrap();
    }

    #[test]
    fn test_discover_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path());
        fs::write(dir.path().join("notes.md"), "markdown").unwrap();

        let files = indexer(local_index()).discover(dir.path());
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "notes.md"]);
    }

    #[tokio::test]
    async fn test_chunk_metadata_and_ids() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path());

        let chunks = indexer(local_index())
            .chunk_file(&dir.path().join("a.txt"))
            .await
            .unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].id, "a.txt_0");
        assert_eq!(chunks[1].id, "a.txt_1");
        assert_eq!(chunks[0].title(), Some("a.txt"));
        assert_eq!(
            chunks[0].metadata.get(metadata_keys::FILEPATH).map(String::as_str),
            Some(dir.path().join("a.txt").display().to_string().as_str())
        );
    }

    #[tokio::test]
    async fn test_index_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path());
        let index = local_index();

        let stats = indexer(index.clone()).index_directory(dir.path()).await.unwrap();

        assert_eq!(stats.files_found, 2);
        assert_eq!(stats.documents_indexed, 2);
        assert_eq!(stats.documents_failed, 0);
        assert_eq!(stats.chunks_indexed, 3);
        assert_eq!(index.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_reindex_resets() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path());
        let index = local_index();
        let indexer = indexer(index.clone());

        indexer.index_directory(dir.path()).await.unwrap();
        fs::remove_file(dir.path().join("a.txt")).unwrap();
        indexer.index_directory(dir.path()).await.unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_document_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path());
        fs::write(dir.path().join("corrupt.txt"), [0xff, 0xfe]).unwrap();

        let stats = indexer(local_index()).index_directory(dir.path()).await.unwrap();
        assert_eq!(stats.files_found, 3);
        assert_eq!(stats.documents_indexed, 2);
        assert_eq!(stats.documents_failed, 1);
    }

    #[tokio::test]
    async fn test_missing_directory_indexes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let stats = indexer(local_index())
            .index_directory(&dir.path().join("absent"))
            .await
            .unwrap();
        assert_eq!(stats, IndexingStats::default());
    }

    #[tokio::test]
    async fn test_feeds_sparse_index() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path());
        let sparse = Arc::new(SparseIndex::new(SparseConfig::default()).unwrap());

        indexer(local_index())
            .with_sparse_index(sparse.clone())
            .index_directory(dir.path())
            .await
            .unwrap();

        assert_eq!(sparse.doc_count(), 3);
        let hits = sparse.search("BM25", Some(5)).unwrap();
        assert_eq!(hits[0].id, "b.txt_0");
    }
}
