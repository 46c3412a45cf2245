//! Retrieval-augmented generation for literature reviews
//!
//! Features:
//! - Recursive character chunking with overlap
//! - Dense vector search (local JSON-snapshot index or Qdrant)
//! - Sparse BM25 search via Tantivy, fused with RRF for the hybrid strategy
//! - HyDE and sub-question decomposition query rewriting
//! - Batched cross-encoder reranking (ONNX or lexical fallback)
//! - Fail-open context refinement and review generation
//! - LLM-as-judge evaluation plus hit rate and MRR

pub mod chunker;
pub mod embeddings;
pub mod evaluation;
pub mod generator;
pub mod ollama_embeddings;
pub mod prompts;
pub mod query_rewriter;
pub mod refiner;
pub mod reranker;
pub mod retriever;
pub mod sparse_search;
pub mod vector_store;

pub use chunker::{ChunkConfig, RecursiveChunker};
#[cfg(feature = "onnx")]
pub use embeddings::OnnxEmbedder;
pub use embeddings::{EmbeddingConfig, SimpleEmbedder, TextEmbedder};
pub use evaluation::{parse_judge_output, EvaluationRecord, Evaluator};
pub use generator::ReviewGenerator;
pub use ollama_embeddings::{OllamaEmbedder, OllamaEmbeddingConfig};
pub use query_rewriter::{parse_sub_questions, QueryRewriter};
pub use refiner::{ContextRefiner, RefinerConfig};
#[cfg(feature = "onnx")]
pub use reranker::OnnxCrossEncoder;
pub use reranker::{
    CrossEncoder, LexicalCrossEncoder, Reranker, RerankerConfig, RerankerStats, SimpleScorer,
};
pub use retriever::{rrf_fusion, HybridRetriever, RetrievalStrategy, RetrieverConfig};
pub use sparse_search::{SparseConfig, SparseIndex};
pub use vector_store::{
    point_id, LocalVectorIndex, QdrantConfig, QdrantVectorIndex, QueryResult, VectorIndex,
};

use thiserror::Error;

/// RAG errors
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Reranker error: {0}")]
    Reranker(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<RagError> for litreview_core::Error {
    fn from(err: RagError) -> Self {
        litreview_core::Error::Rag(err.to_string())
    }
}
