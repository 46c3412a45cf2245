//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::{
    chunking, endpoints, generation, ingestion, models, paths, refinement, reranker, retrieval,
    vector_store,
};
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Relaxed validation, warnings only
    #[default]
    Development,
    /// Stricter validation
    Staging,
    /// All validations enforced
    Production,
}

impl RuntimeEnvironment {
    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub ingestion: IngestionConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub embedding: EmbeddingSettings,

    #[serde(default)]
    pub vector_store: VectorStoreSettings,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub reranker: RerankerSettings,

    #[serde(default)]
    pub refinement: RefinementConfig,

    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_chunking()?;
        self.validate_retrieval()?;
        self.validate_refinement()?;
        self.validate_llm()?;
        self.validate_models()?;
        Ok(())
    }

    fn validate_chunking(&self) -> Result<(), ConfigError> {
        let chunking = &self.chunking;

        if chunking.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "chunking.chunk_size".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if chunking.chunk_overlap >= chunking.chunk_size {
            return Err(ConfigError::InvalidValue {
                field: "chunking.chunk_overlap".to_string(),
                message: format!(
                    "Must be smaller than chunk_size ({}), got {}",
                    chunking.chunk_size, chunking.chunk_overlap
                ),
            });
        }

        Ok(())
    }

    fn validate_retrieval(&self) -> Result<(), ConfigError> {
        let r = &self.retrieval;

        if r.top_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.top_k".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if r.window_size < r.top_k {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.window_size".to_string(),
                message: format!(
                    "Must be at least top_k ({}), got {}",
                    r.top_k, r.window_size
                ),
            });
        }

        if r.sub_question_window_multiplier == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.sub_question_window_multiplier".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&r.dense_weight) {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.dense_weight".to_string(),
                message: format!("Must be between 0.0 and 1.0, got {}", r.dense_weight),
            });
        }

        if r.rrf_k <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.rrf_k".to_string(),
                message: format!("Must be positive, got {}", r.rrf_k),
            });
        }

        if r.max_sub_questions == 0 {
            tracing::warn!(
                "retrieval.max_sub_questions is 0, decomposition will never gather candidates"
            );
        }

        Ok(())
    }

    fn validate_refinement(&self) -> Result<(), ConfigError> {
        if self.refinement.enabled && self.refinement.sentinel.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "refinement.sentinel".to_string(),
                message: "Cannot be empty when refinement is enabled".to_string(),
            });
        }
        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        let llm = &self.llm;

        if !(0.0..=2.0).contains(&llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                message: format!("Must be between 0.0 and 2.0, got {}", llm.temperature),
            });
        }

        if llm.provider == LlmProviderKind::OpenAI && llm.openai_api_key.is_none() {
            if self.environment.is_strict() {
                return Err(ConfigError::MissingField("llm.openai_api_key".to_string()));
            }
            tracing::warn!(
                "llm.provider is openai but no API key is configured; calls will fail in-band"
            );
        }

        Ok(())
    }

    /// Model files are optional; only checked when a backend needs them
    fn validate_models(&self) -> Result<(), ConfigError> {
        let mut required: Vec<(&str, &Option<String>)> = Vec::new();

        if self.embedding.backend == EmbeddingBackend::Onnx {
            required.push(("embedding.model_path", &self.embedding.model_path));
            required.push(("embedding.tokenizer_path", &self.embedding.tokenizer_path));
        }
        if let Some(ref model_path) = self.reranker.model_path {
            if self.reranker.tokenizer_path.is_none() {
                return Err(ConfigError::InvalidValue {
                    field: "reranker.tokenizer_path".to_string(),
                    message: format!("Required when reranker.model_path is set ({})", model_path),
                });
            }
        }

        for (field, path) in required {
            match path {
                None => return Err(ConfigError::MissingField(field.to_string())),
                Some(p) if !Path::new(p).exists() => {
                    if self.environment.is_strict() {
                        return Err(ConfigError::FileNotFound(format!("{}: {}", field, p)));
                    }
                    tracing::warn!("Model not found: {} = {}", field, p);
                },
                Some(_) => {},
            }
        }

        Ok(())
    }
}

/// Filesystem layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_papers_dir")]
    pub papers_dir: String,

    #[serde(default = "default_vector_db_dir")]
    pub vector_db_dir: String,

    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_papers_dir() -> String {
    paths::PAPERS_DIR.to_string()
}

fn default_vector_db_dir() -> String {
    paths::VECTOR_DB_DIR.to_string()
}

fn default_output_dir() -> String {
    paths::OUTPUT_DIR.to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            papers_dir: default_papers_dir(),
            vector_db_dir: default_vector_db_dir(),
            output_dir: default_output_dir(),
        }
    }
}

impl PathsConfig {
    /// Create every configured directory
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.papers_dir, &self.vector_db_dir, &self.output_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn papers_dir(&self) -> PathBuf {
        PathBuf::from(&self.papers_dir)
    }

    pub fn vector_db_dir(&self) -> PathBuf {
        PathBuf::from(&self.vector_db_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }
}

/// Paper search and download
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    #[serde(default = "default_max_papers")]
    pub max_papers: usize,

    /// Downloads below this size are deleted
    #[serde(default = "default_min_pdf_bytes")]
    pub min_pdf_bytes: u64,

    #[serde(default = "default_catalog_endpoint")]
    pub catalog_endpoint: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// File extensions picked up by the indexer
    #[serde(default = "default_document_extensions")]
    pub document_extensions: Vec<String>,
}

fn default_max_papers() -> usize {
    ingestion::MAX_PAPERS
}

fn default_min_pdf_bytes() -> u64 {
    ingestion::MIN_PDF_BYTES
}

fn default_catalog_endpoint() -> String {
    endpoints::ARXIV_DEFAULT.to_string()
}

fn default_user_agent() -> String {
    ingestion::USER_AGENT.to_string()
}

fn default_document_extensions() -> Vec<String> {
    vec![ingestion::DOCUMENT_EXTENSION.to_string()]
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_papers: default_max_papers(),
            min_pdf_bytes: default_min_pdf_bytes(),
            catalog_endpoint: default_catalog_endpoint(),
            user_agent: default_user_agent(),
            document_extensions: default_document_extensions(),
        }
    }
}

/// Document segmentation, in characters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_chunk_size() -> usize {
    chunking::CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    chunking::CHUNK_OVERLAP
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

/// Embedding backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Hash-based embedder, no model required
    #[default]
    Simple,
    /// Ollama `/api/embed`
    Ollama,
    /// Local ONNX sentence-transformer
    Onnx,
}

/// Embedding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default)]
    pub backend: EmbeddingBackend,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_dim")]
    pub dim: usize,

    #[serde(default = "default_ollama_endpoint")]
    pub ollama_endpoint: String,

    /// ONNX model file
    #[serde(default)]
    pub model_path: Option<String>,

    /// `tokenizer.json` matching the ONNX model
    #[serde(default)]
    pub tokenizer_path: Option<String>,
}

fn default_embedding_model() -> String {
    models::EMBEDDING_MODEL.to_string()
}

fn default_embedding_dim() -> usize {
    models::EMBEDDING_DIM
}

fn default_ollama_endpoint() -> String {
    endpoints::OLLAMA_DEFAULT.to_string()
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            model: default_embedding_model(),
            dim: default_embedding_dim(),
            ollama_endpoint: default_ollama_endpoint(),
            model_path: None,
            tokenizer_path: None,
        }
    }
}

/// Vector store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreBackend {
    /// In-process cosine index persisted as a JSON snapshot
    #[default]
    Local,
    /// Qdrant server
    Qdrant,
}

/// Vector store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreSettings {
    #[serde(default)]
    pub backend: VectorStoreBackend,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default = "default_qdrant_endpoint")]
    pub qdrant_endpoint: String,

    #[serde(default, skip_serializing)]
    pub qdrant_api_key: Option<String>,
}

fn default_collection() -> String {
    vector_store::COLLECTION.to_string()
}

fn default_qdrant_endpoint() -> String {
    endpoints::QDRANT_DEFAULT.to_string()
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            backend: VectorStoreBackend::default(),
            collection: default_collection(),
            qdrant_endpoint: default_qdrant_endpoint(),
            qdrant_api_key: None,
        }
    }
}

/// Retrieval policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Oversized window for single-query strategies
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Per-sub-question window = multiplier * top_k
    #[serde(default = "default_sub_question_window_multiplier")]
    pub sub_question_window_multiplier: usize,

    #[serde(default = "default_max_sub_questions")]
    pub max_sub_questions: usize,

    /// Strategy used when none is requested
    #[serde(default = "default_strategy")]
    pub default_strategy: String,

    /// Dense share in hybrid fusion (0.0 = all keyword, 1.0 = all dense)
    #[serde(default = "default_dense_weight")]
    pub dense_weight: f32,

    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,

    #[serde(default = "default_sparse_window")]
    pub sparse_window: usize,
}

fn default_top_k() -> usize {
    retrieval::TOP_K
}

fn default_window_size() -> usize {
    retrieval::WINDOW_SIZE
}

fn default_sub_question_window_multiplier() -> usize {
    retrieval::SUB_QUESTION_WINDOW_MULTIPLIER
}

fn default_max_sub_questions() -> usize {
    retrieval::MAX_SUB_QUESTIONS
}

fn default_strategy() -> String {
    "hyde".to_string()
}

fn default_dense_weight() -> f32 {
    retrieval::DENSE_WEIGHT
}

fn default_rrf_k() -> f32 {
    retrieval::RRF_K
}

fn default_sparse_window() -> usize {
    retrieval::SPARSE_WINDOW
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            window_size: default_window_size(),
            sub_question_window_multiplier: default_sub_question_window_multiplier(),
            max_sub_questions: default_max_sub_questions(),
            default_strategy: default_strategy(),
            dense_weight: default_dense_weight(),
            rrf_k: default_rrf_k(),
            sparse_window: default_sparse_window(),
        }
    }
}

/// Cross-encoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerSettings {
    #[serde(default = "default_cross_encoder_model")]
    pub model: String,

    /// ONNX export of the cross-encoder; lexical scoring is used when unset
    #[serde(default)]
    pub model_path: Option<String>,

    #[serde(default)]
    pub tokenizer_path: Option<String>,

    #[serde(default = "default_max_seq_len")]
    pub max_seq_len: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_cross_encoder_model() -> String {
    models::CROSS_ENCODER_MODEL.to_string()
}

fn default_max_seq_len() -> usize {
    reranker::MAX_SEQ_LEN
}

fn default_batch_size() -> usize {
    reranker::BATCH_SIZE
}

impl Default for RerankerSettings {
    fn default() -> Self {
        Self {
            model: default_cross_encoder_model(),
            model_path: None,
            tokenizer_path: None,
            max_seq_len: default_max_seq_len(),
            batch_size: default_batch_size(),
        }
    }
}

/// Pre-generation context refinement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Extractions must be longer than this to be kept
    #[serde(default = "default_min_length")]
    pub min_length: usize,

    #[serde(default = "default_sentinel")]
    pub sentinel: String,
}

fn default_true() -> bool {
    true
}

fn default_min_length() -> usize {
    refinement::MIN_LENGTH
}

fn default_sentinel() -> String {
    refinement::SENTINEL.to_string()
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_length: default_min_length(),
            sentinel: default_sentinel(),
        }
    }
}

/// Text generation provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LlmProviderKind {
    #[default]
    #[serde(rename = "ollama")]
    Ollama,
    #[serde(rename = "openai")]
    OpenAI,
}

/// Text generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default)]
    pub provider: LlmProviderKind,

    #[serde(default = "default_ollama_endpoint")]
    pub ollama_endpoint: String,

    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,

    #[serde(default = "default_openai_endpoint")]
    pub openai_endpoint: String,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    /// Falls back to `OPENAI_API_KEY`
    #[serde(default = "default_openai_api_key", skip_serializing)]
    pub openai_api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout; unset means wait indefinitely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_ollama_model() -> String {
    models::OLLAMA_MODEL.to_string()
}

fn default_openai_endpoint() -> String {
    endpoints::OPENAI_DEFAULT.to_string()
}

fn default_openai_model() -> String {
    models::OPENAI_MODEL.to_string()
}

fn default_openai_api_key() -> Option<String> {
    std::env::var(generation::OPENAI_API_KEY_ENV).ok()
}

fn default_temperature() -> f32 {
    generation::TEMPERATURE
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::default(),
            ollama_endpoint: default_ollama_endpoint(),
            ollama_model: default_ollama_model(),
            openai_endpoint: default_openai_endpoint(),
            openai_model: default_openai_model(),
            openai_api_key: default_openai_api_key(),
            temperature: default_temperature(),
            timeout_secs: None,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from `config/` and the environment
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from("config", env)
}

/// Load settings from an explicit config directory
///
/// Priority: env vars > `{dir}/{env}.*` > `{dir}/default.*` > defaults
pub fn load_settings_from(
    dir: impl AsRef<Path>,
    env: Option<&str>,
) -> Result<Settings, ConfigError> {
    let dir = dir.as_ref();
    let mut builder = Config::builder();

    builder = builder.add_source(
        File::with_name(&dir.join("default").to_string_lossy()).required(false),
    );

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&dir.join(env_name).to_string_lossy()).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("LITREVIEW")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
