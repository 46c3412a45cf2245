//! Centralized constants for the pipeline
//!
//! Single source of truth for default values. `Settings` defaults are built
//! from these, and components fall back to them when constructed without settings.

/// Filesystem layout
pub mod paths {
    /// Downloaded papers
    pub const PAPERS_DIR: &str = "data/papers";

    /// Vector index storage
    pub const VECTOR_DB_DIR: &str = "data/vector_db";

    /// Generated reviews
    pub const OUTPUT_DIR: &str = "output";
}

/// Paper ingestion
pub mod ingestion {
    /// Papers fetched per search
    pub const MAX_PAPERS: usize = 5;

    /// Downloads smaller than this are treated as corrupt and deleted
    pub const MIN_PDF_BYTES: u64 = 1000;

    /// Sent with every PDF download
    pub const USER_AGENT: &str = "Mozilla/5.0";

    /// File extension picked up by the indexer
    pub const DOCUMENT_EXTENSION: &str = "pdf";
}

/// Document segmentation (characters)
pub mod chunking {
    pub const CHUNK_SIZE: usize = 1000;
    pub const CHUNK_OVERLAP: usize = 200;

    /// Separator priority: paragraph, line, sentence, word, character
    pub const SEPARATORS: &[&str] = &["\n\n", "\n", ".", " ", ""];
}

/// Model identifiers
pub mod models {
    /// Sentence embedding model
    pub const EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";

    /// Output dimension of the embedding model
    pub const EMBEDDING_DIM: usize = 384;

    /// Cross-encoder used for reranking
    pub const CROSS_ENCODER_MODEL: &str = "cross-encoder/ms-marco-MiniLM-L-6-v2";

    /// Ollama generation model
    pub const OLLAMA_MODEL: &str = "mistral";

    /// OpenAI generation model
    pub const OPENAI_MODEL: &str = "gpt-4o-mini";
}

/// Vector store
pub mod vector_store {
    /// Collection holding paper chunks
    pub const COLLECTION: &str = "rag_papers";

    /// Snapshot file name for the local index
    pub const SNAPSHOT_FILE: &str = "index.json";

    /// Subdirectory for the keyword index
    pub const SPARSE_DIR: &str = "sparse";
}

/// Service endpoints (defaults for local development)
pub mod endpoints {
    /// Ollama endpoint
    pub const OLLAMA_DEFAULT: &str = "http://localhost:11434";

    /// Qdrant vector store endpoint
    pub const QDRANT_DEFAULT: &str = "http://127.0.0.1:6334";

    /// OpenAI API endpoint
    pub const OPENAI_DEFAULT: &str = "https://api.openai.com/v1";

    /// arXiv catalog query endpoint
    pub const ARXIV_DEFAULT: &str = "http://export.arxiv.org/api/query";
}

/// Retrieval policy
pub mod retrieval {
    /// Final number of results
    pub const TOP_K: usize = 5;

    /// Candidates fetched before reranking for single-query strategies
    pub const WINDOW_SIZE: usize = 50;

    /// Per-sub-question window is this multiple of `top_k`
    pub const SUB_QUESTION_WINDOW_MULTIPLIER: usize = 2;

    /// Sub-questions kept from a decomposition
    pub const MAX_SUB_QUESTIONS: usize = 3;

    /// Dense share of fused scores in hybrid retrieval
    pub const DENSE_WEIGHT: f32 = 0.5;

    /// Reciprocal rank fusion constant
    pub const RRF_K: f32 = 60.0;

    /// Candidates fetched from the keyword index
    pub const SPARSE_WINDOW: usize = 50;
}

/// Cross-encoder reranking
pub mod reranker {
    pub const MAX_SEQ_LEN: usize = 512;
    pub const BATCH_SIZE: usize = 32;
}

/// Context refinement
pub mod refinement {
    /// Marker the model emits for chunks with nothing relevant
    pub const SENTINEL: &str = "IRRELEVANT";

    /// Extractions at or below this many characters are discarded
    pub const MIN_LENGTH: usize = 10;
}

/// Text generation
pub mod generation {
    pub const TEMPERATURE: f32 = 0.3;

    /// Environment variable holding the OpenAI key
    pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
}
