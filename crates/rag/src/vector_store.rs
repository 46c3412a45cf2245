//! Vector Index
//!
//! Nearest-neighbor search over embedded chunks. Upsert is keyed by chunk id
//! (a repeated id overwrites). Distances are cosine distances, lower is closer.
//!
//! - [`LocalVectorIndex`]: in-process, optionally persisted as a JSON snapshot
//! - [`QdrantVectorIndex`]: Qdrant collection

use async_trait::async_trait;
use parking_lot::RwLock;
use qdrant_client::{
    qdrant::{
        value::Kind, CreateCollectionBuilder, DeleteCollectionBuilder, Distance, PointStruct,
        SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
    },
    Qdrant,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use litreview_core::{Candidate, Chunk, Metadata};

use crate::embeddings::TextEmbedder;
use crate::RagError;

/// Result of a single-text query, nearest first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
    pub distances: Vec<f32>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn push(&mut self, id: String, document: String, metadata: Metadata, distance: f32) {
        self.ids.push(id);
        self.documents.push(document);
        self.metadatas.push(metadata);
        self.distances.push(distance);
    }

    /// Convert hits into vector-sourced candidates, preserving order
    pub fn into_candidates(self) -> Vec<Candidate> {
        self.ids
            .into_iter()
            .zip(self.documents)
            .zip(self.metadatas)
            .zip(self.distances)
            .map(|(((id, text), metadata), distance)| {
                Candidate::from_vector(id, text, metadata, distance)
            })
            .collect()
    }
}

/// Nearest-neighbor index over chunk text
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite chunks by id
    async fn upsert(&self, chunks: &[Chunk]) -> Result<(), RagError>;

    /// Top `n_results` chunks by similarity to `text`
    async fn query(&self, text: &str, n_results: usize) -> Result<QueryResult, RagError>;

    /// Drop and recreate the collection
    async fn reset(&self) -> Result<(), RagError>;

    /// Number of stored chunks
    async fn count(&self) -> Result<usize, RagError>;
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    1.0 - dot / (na * nb)
}

fn distance_key(distance: f32) -> f32 {
    if distance.is_nan() {
        f32::INFINITY
    } else {
        distance
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    id: String,
    text: String,
    metadata: Metadata,
    embedding: Vec<f32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    collection: String,
    entries: Vec<IndexEntry>,
}

/// In-process cosine index
///
/// Entries keep insertion order, so equal distances rank by first insertion.
pub struct LocalVectorIndex {
    embedder: Arc<dyn TextEmbedder>,
    collection: String,
    entries: RwLock<Vec<IndexEntry>>,
    snapshot_path: Option<PathBuf>,
}

impl LocalVectorIndex {
    /// Memory-only index
    pub fn in_memory(embedder: Arc<dyn TextEmbedder>, collection: impl Into<String>) -> Self {
        Self {
            embedder,
            collection: collection.into(),
            entries: RwLock::new(Vec::new()),
            snapshot_path: None,
        }
    }

    /// Index persisted at `path`, loading an existing snapshot if present
    pub fn open(
        embedder: Arc<dyn TextEmbedder>,
        collection: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<Self, RagError> {
        let collection = collection.into();
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| RagError::VectorStore(format!("{}: {}", path.display(), e)))?;
            let snapshot: Snapshot = serde_json::from_str(&raw)
                .map_err(|e| RagError::VectorStore(format!("Corrupt snapshot: {}", e)))?;
            if snapshot.collection != collection {
                tracing::warn!(
                    expected = %collection,
                    found = %snapshot.collection,
                    "Snapshot belongs to another collection, starting empty"
                );
                Vec::new()
            } else {
                snapshot.entries
            }
        } else {
            Vec::new()
        };

        tracing::debug!(
            path = %path.display(),
            entries = entries.len(),
            "Opened local vector index"
        );

        Ok(Self {
            embedder,
            collection,
            entries: RwLock::new(entries),
            snapshot_path: Some(path),
        })
    }

    fn persist(&self, entries: &[IndexEntry]) -> Result<(), RagError> {
        let Some(ref path) = self.snapshot_path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RagError::VectorStore(e.to_string()))?;
        }

        let snapshot = Snapshot {
            collection: self.collection.clone(),
            entries: entries.to_vec(),
        };
        let json =
            serde_json::to_string(&snapshot).map_err(|e| RagError::VectorStore(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| RagError::VectorStore(e.to_string()))
    }
}

#[async_trait]
impl VectorIndex for LocalVectorIndex {
    async fn upsert(&self, chunks: &[Chunk]) -> Result<(), RagError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::VectorStore(
                "Chunk and embedding count mismatch".to_string(),
            ));
        }

        let mut entries = self.entries.write();
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let entry = IndexEntry {
                id: chunk.id.clone(),
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
                embedding,
            };
            match entries.iter_mut().find(|e| e.id == chunk.id) {
                Some(existing) => *existing = entry,
                None => entries.push(entry),
            }
        }
        self.persist(&entries)
    }

    async fn query(&self, text: &str, n_results: usize) -> Result<QueryResult, RagError> {
        let query_embedding = self.embedder.embed(text).await?;

        let entries = self.entries.read();
        let mut scored: Vec<(usize, f32)> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_distance(&query_embedding, &e.embedding)))
            .collect();
        // NaN distances (zero-norm embeddings) sort last
        scored.sort_by(|a, b| distance_key(a.1).total_cmp(&distance_key(b.1)));

        let mut result = QueryResult::default();
        for (i, distance) in scored.into_iter().take(n_results) {
            let entry = &entries[i];
            result.push(
                entry.id.clone(),
                entry.text.clone(),
                entry.metadata.clone(),
                distance,
            );
        }
        Ok(result)
    }

    async fn reset(&self) -> Result<(), RagError> {
        let mut entries = self.entries.write();
        entries.clear();
        tracing::info!(collection = %self.collection, "Reset local vector index");
        self.persist(&entries)
    }

    async fn count(&self) -> Result<usize, RagError> {
        Ok(self.entries.read().len())
    }
}

/// Qdrant connection settings
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    pub endpoint: String,
    pub collection: String,
    pub vector_dim: usize,
    pub api_key: Option<String>,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:6334".to_string(),
            collection: "rag_papers".to_string(),
            vector_dim: 384,
            api_key: None,
        }
    }
}

const PAYLOAD_TEXT: &str = "text";
const PAYLOAD_CHUNK_ID: &str = "chunk_id";

/// Qdrant point id for a chunk id
///
/// Qdrant accepts only integers or UUIDs, so chunk ids map to name-based UUIDs.
pub fn point_id(chunk_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
}

/// Qdrant-backed index
pub struct QdrantVectorIndex {
    client: Qdrant,
    embedder: Arc<dyn TextEmbedder>,
    config: QdrantConfig,
}

impl QdrantVectorIndex {
    pub async fn connect(
        config: QdrantConfig,
        embedder: Arc<dyn TextEmbedder>,
    ) -> Result<Self, RagError> {
        let mut builder = Qdrant::from_url(&config.endpoint);
        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
            tracing::info!("Qdrant connection using API key authentication");
        }

        let client = builder
            .build()
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        let index = Self {
            client,
            embedder,
            config,
        };
        index.ensure_collection().await?;
        Ok(index)
    }

    async fn ensure_collection(&self) -> Result<(), RagError> {
        let exists = self
            .client
            .collection_exists(&self.config.collection)
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.config.collection).vectors_config(
                        VectorParamsBuilder::new(self.config.vector_dim as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| RagError::VectorStore(e.to_string()))?;
        }

        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn upsert(&self, chunks: &[Chunk]) -> Result<(), RagError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let points: Vec<PointStruct> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
                payload.insert(PAYLOAD_TEXT.to_string(), chunk.text.clone().into());
                payload.insert(PAYLOAD_CHUNK_ID.to_string(), chunk.id.clone().into());
                for (k, v) in &chunk.metadata {
                    payload.insert(k.clone(), v.clone().into());
                }
                PointStruct::new(point_id(&chunk.id), embedding, payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.config.collection, points).wait(true))
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        Ok(())
    }

    async fn query(&self, text: &str, n_results: usize) -> Result<QueryResult, RagError> {
        let embedding = self.embedder.embed(text).await?;

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.config.collection, embedding, n_results as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| RagError::Search(e.to_string()))?;

        let mut result = QueryResult::default();
        for point in response.result {
            let mut id = String::new();
            let mut document = String::new();
            let mut metadata = Metadata::new();

            for (k, v) in point.payload {
                if let Some(Kind::StringValue(s)) = v.kind {
                    match k.as_str() {
                        PAYLOAD_TEXT => document = s,
                        PAYLOAD_CHUNK_ID => id = s,
                        _ => {
                            metadata.insert(k, s);
                        },
                    }
                }
            }

            // Cosine similarity to distance
            result.push(id, document, metadata, 1.0 - point.score);
        }
        Ok(result)
    }

    async fn reset(&self) -> Result<(), RagError> {
        let exists = self
            .client
            .collection_exists(&self.config.collection)
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        if exists {
            self.client
                .delete_collection(DeleteCollectionBuilder::new(&self.config.collection))
                .await
                .map_err(|e| RagError::VectorStore(e.to_string()))?;
        }
        tracing::info!(collection = %self.config.collection, "Reset Qdrant collection");
        self.ensure_collection().await
    }

    async fn count(&self) -> Result<usize, RagError> {
        let info = self
            .client
            .collection_info(&self.config.collection)
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        Ok(info
            .result
            .and_then(|r| r.points_count)
            .unwrap_or(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::SimpleEmbedder;
    use litreview_core::metadata_keys;

    fn chunk(id: &str, text: &str, title: &str) -> Chunk {
        let mut metadata = Metadata::new();
        metadata.insert(metadata_keys::TITLE.to_string(), title.to_string());
        Chunk::new(id, text, metadata)
    }

    fn index() -> LocalVectorIndex {
        LocalVectorIndex::in_memory(Arc::new(SimpleEmbedder::default()), "test")
    }

    #[tokio::test]
    async fn test_query_orders_by_distance() {
        let index = index();
        index
            .upsert(&[
                chunk("a_0", "graph coloring heuristics", "a.pdf"),
                chunk("b_0", "retrieval augmented generation for medical QA", "b.pdf"),
            ])
            .await
            .unwrap();

        let result = index.query("medical retrieval", 2).await.unwrap();
        assert_eq!(result.ids, vec!["b_0", "a_0"]);
        assert!(result.distances[0] <= result.distances[1]);
        assert_eq!(result.metadatas[0].get("title").unwrap(), "b.pdf");
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let index = index();
        index.upsert(&[chunk("a_0", "old", "a.pdf")]).await.unwrap();
        index.upsert(&[chunk("a_0", "new", "a.pdf")]).await.unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
        let result = index.query("new", 5).await.unwrap();
        assert_eq!(result.documents, vec!["new"]);
    }

    #[tokio::test]
    async fn test_n_results_larger_than_index() {
        let index = index();
        index.upsert(&[chunk("a_0", "x", "a.pdf")]).await.unwrap();
        assert_eq!(index.query("x", 50).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_and_empty_query() {
        let index = index();
        index.upsert(&[chunk("a_0", "x", "a.pdf")]).await.unwrap();
        index.reset().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
        assert!(index.query("x", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let embedder: Arc<dyn TextEmbedder> = Arc::new(SimpleEmbedder::default());

        {
            let index = LocalVectorIndex::open(embedder.clone(), "papers", &path).unwrap();
            index
                .upsert(&[chunk("a_0", "sparse retrieval", "a.pdf")])
                .await
                .unwrap();
        }

        let reopened = LocalVectorIndex::open(embedder.clone(), "papers", &path).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);

        let other = LocalVectorIndex::open(embedder, "other", &path).unwrap();
        assert_eq!(other.count().await.unwrap(), 0);
    }

    #[test]
    fn test_into_candidates() {
        let mut result = QueryResult::default();
        result.push("a_0".into(), "t".into(), Metadata::new(), 0.3);
        let candidates = result.into_candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "a_0");
        assert_eq!(candidates[0].score, 0.3);
    }

    #[test]
    fn test_point_id_is_stable() {
        assert_eq!(point_id("paper.pdf_0"), point_id("paper.pdf_0"));
        assert_ne!(point_id("paper.pdf_0"), point_id("paper.pdf_1"));
        assert!(Uuid::parse_str(&point_id("x")).is_ok());
    }

    /// Embeds texts containing "void" as NaN vectors
    struct GlitchEmbedder;

    #[async_trait]
    impl TextEmbedder for GlitchEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
            Ok(if text.contains("void") {
                vec![f32::NAN, 1.0]
            } else if text.contains("near") {
                vec![1.0, 0.1]
            } else {
                vec![0.2, 1.0]
            })
        }

        fn dim(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn test_nan_distance_sorts_last() {
        let index = LocalVectorIndex::in_memory(Arc::new(GlitchEmbedder), "test");
        index
            .upsert(&[
                chunk("v_0", "void one", "v.pdf"),
                chunk("f_0", "far away", "f.pdf"),
                chunk("v_1", "void two", "v.pdf"),
                chunk("n_0", "near here", "n.pdf"),
            ])
            .await
            .unwrap();

        let result = index.query("near query", 4).await.unwrap();
        assert_eq!(result.ids, vec!["n_0", "f_0", "v_0", "v_1"]);
    }

    #[test]
    fn test_cosine_distance() {
        assert!((cosine_distance(&[1.0, 0.0], &[1.0, 0.0])).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }
}
