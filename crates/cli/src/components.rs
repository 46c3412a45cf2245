//! Component construction from [`Settings`]

use std::sync::Arc;

use litreview_config::{
    EmbeddingBackend, EmbeddingSettings, RerankerSettings, Settings, VectorStoreBackend,
};
use litreview_core::{Error, Result};
use litreview_ingest::{ArxivSource, HttpFetcher, PaperSource, PdfFetcher};
use litreview_llm::{LlmFactory, TextGenerator};
use litreview_rag::{
    EmbeddingConfig, LocalVectorIndex, OllamaEmbedder, OllamaEmbeddingConfig, QdrantConfig,
    QdrantVectorIndex, Reranker, SimpleEmbedder, SparseConfig, SparseIndex, TextEmbedder,
    VectorIndex,
};

/// Snapshot file for the local vector index
pub const INDEX_SNAPSHOT: &str = "index.json";

/// Directory for the keyword index
pub const SPARSE_DIR: &str = "sparse";

/// External collaborators shared by every command
#[derive(Clone)]
pub struct Components {
    pub llm: Arc<dyn TextGenerator>,
    pub index: Arc<dyn VectorIndex>,
    pub sparse_index: Option<Arc<SparseIndex>>,
    pub reranker: Arc<Reranker>,
    pub source: Arc<dyn PaperSource>,
    pub fetcher: Arc<dyn PdfFetcher>,
}

impl Components {
    /// Build every component the settings describe
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let llm = LlmFactory::from_settings(&settings.llm)?;
        let embedder = build_embedder(&settings.embedding)?;
        let index = build_vector_index(settings, embedder).await?;
        let sparse_index = Arc::new(build_sparse_index(settings)?);
        let reranker = Arc::new(build_reranker(&settings.reranker)?);

        let source = ArxivSource::new(settings.ingestion.catalog_endpoint.clone())?;
        let fetcher = HttpFetcher::new(&settings.ingestion.user_agent)?;

        tracing::info!(
            llm = llm.model_name(),
            embedding = ?settings.embedding.backend,
            vector_store = ?settings.vector_store.backend,
            reranker = reranker.encoder_name(),
            "Components ready"
        );

        Ok(Self {
            llm,
            index,
            sparse_index: Some(sparse_index),
            reranker,
            source: Arc::new(source),
            fetcher: Arc::new(fetcher),
        })
    }
}

pub fn build_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn TextEmbedder>> {
    match settings.backend {
        EmbeddingBackend::Simple => Ok(Arc::new(SimpleEmbedder::new(
            EmbeddingConfig::default().with_dim(settings.dim),
        ))),
        EmbeddingBackend::Ollama => Ok(Arc::new(OllamaEmbedder::new(OllamaEmbeddingConfig {
            endpoint: settings.ollama_endpoint.clone(),
            model: settings.model.clone(),
            embedding_dim: settings.dim,
        }))),
        EmbeddingBackend::Onnx => build_onnx_embedder(settings),
    }
}

#[cfg(feature = "onnx")]
fn build_onnx_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn TextEmbedder>> {
    let (model_path, tokenizer_path) = match (&settings.model_path, &settings.tokenizer_path) {
        (Some(m), Some(t)) => (m, t),
        _ => {
            return Err(Error::Config(
                "embedding.model_path and embedding.tokenizer_path are required for the onnx backend"
                    .to_string(),
            ))
        },
    };
    let embedder = litreview_rag::OnnxEmbedder::new(
        model_path,
        tokenizer_path,
        EmbeddingConfig::default().with_dim(settings.dim),
    )?;
    Ok(Arc::new(embedder))
}

#[cfg(not(feature = "onnx"))]
fn build_onnx_embedder(_settings: &EmbeddingSettings) -> Result<Arc<dyn TextEmbedder>> {
    Err(Error::Config(
        "embedding.backend = onnx needs a build with the `onnx` feature".to_string(),
    ))
}

/// Local snapshot under `vector_db_dir`, or a Qdrant collection
pub async fn build_vector_index(
    settings: &Settings,
    embedder: Arc<dyn TextEmbedder>,
) -> Result<Arc<dyn VectorIndex>> {
    let store = &settings.vector_store;
    match store.backend {
        VectorStoreBackend::Local => {
            let path = settings.paths.vector_db_dir().join(INDEX_SNAPSHOT);
            let index = LocalVectorIndex::open(embedder, store.collection.clone(), path)?;
            Ok(Arc::new(index))
        },
        VectorStoreBackend::Qdrant => {
            let config = QdrantConfig {
                endpoint: store.qdrant_endpoint.clone(),
                collection: store.collection.clone(),
                vector_dim: settings.embedding.dim,
                api_key: store.qdrant_api_key.clone(),
            };
            let index = QdrantVectorIndex::connect(config, embedder).await?;
            Ok(Arc::new(index))
        },
    }
}

/// BM25 index persisted next to the vector index
pub fn build_sparse_index(settings: &Settings) -> Result<SparseIndex> {
    let path = settings.paths.vector_db_dir().join(SPARSE_DIR);
    let index = SparseIndex::new(SparseConfig {
        index_path: Some(path.display().to_string()),
        top_k: settings.retrieval.sparse_window,
        ..Default::default()
    })?;
    Ok(index)
}

/// ONNX cross-encoder when a model is configured, lexical scoring otherwise
pub fn build_reranker(settings: &RerankerSettings) -> Result<Reranker> {
    match &settings.model_path {
        Some(model_path) => build_onnx_reranker(model_path, settings),
        None => {
            tracing::debug!("No cross-encoder model configured, using lexical scoring");
            Ok(Reranker::lexical())
        },
    }
}

#[cfg(feature = "onnx")]
fn build_onnx_reranker(model_path: &str, settings: &RerankerSettings) -> Result<Reranker> {
    let tokenizer_path = settings.tokenizer_path.as_deref().ok_or_else(|| {
        Error::Config("reranker.tokenizer_path is required with reranker.model_path".to_string())
    })?;
    let encoder = litreview_rag::OnnxCrossEncoder::new(
        model_path,
        tokenizer_path,
        litreview_rag::RerankerConfig {
            max_seq_len: settings.max_seq_len,
            batch_size: settings.batch_size,
        },
    )?;
    Ok(Reranker::new(Arc::new(encoder)))
}

#[cfg(not(feature = "onnx"))]
fn build_onnx_reranker(model_path: &str, _settings: &RerankerSettings) -> Result<Reranker> {
    tracing::warn!(
        model_path,
        "Built without the `onnx` feature, falling back to lexical reranking"
    );
    Ok(Reranker::lexical())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_in(dir: &std::path::Path) -> Settings {
        let mut settings = Settings::default();
        settings.paths.vector_db_dir = dir.join("vector_db").display().to_string();
        settings
    }

    #[test]
    fn test_simple_embedder_dim() {
        let mut settings = EmbeddingSettings::default();
        settings.dim = 64;
        assert_eq!(build_embedder(&settings).unwrap().dim(), 64);
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_onnx_backend_needs_feature() {
        let mut settings = EmbeddingSettings::default();
        settings.backend = EmbeddingBackend::Onnx;
        assert!(matches!(build_embedder(&settings), Err(Error::Config(_))));
    }

    #[test]
    fn test_lexical_reranker_by_default() {
        let reranker = build_reranker(&RerankerSettings::default()).unwrap();
        assert_eq!(reranker.encoder_name(), "lexical");
    }

    #[tokio::test]
    async fn test_local_index_under_vector_db_dir() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let embedder = build_embedder(&settings.embedding).unwrap();

        let index = build_vector_index(&settings, embedder).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[test]
    fn test_sparse_index_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());

        let index = build_sparse_index(&settings).unwrap();
        assert_eq!(index.doc_count(), 0);
        assert!(dir.path().join("vector_db").join(SPARSE_DIR).is_dir());
    }
}
