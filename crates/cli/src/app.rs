//! End-to-end pipeline
//!
//! [`App`] owns the settings and shared components and exposes one method per
//! command: ingest, index, retrieve, generate, evaluate, and `run` chaining
//! all of them.

use serde::Serialize;
use std::path::PathBuf;

use litreview_config::Settings;
use litreview_core::{Candidate, Result};
use litreview_ingest::{
    DownloadOutcome, DownloadStats, DownloaderConfig, Indexer, IndexingStats, PaperDownloader,
    ParserRegistry,
};
use litreview_rag::{
    ChunkConfig, ContextRefiner, Evaluator, HybridRetriever, QueryRewriter, RecursiveChunker,
    RefinerConfig, RetrievalStrategy, RetrieverConfig, ReviewGenerator,
};

use crate::components::Components;
use crate::report::{save_review, QualityReport};

/// A generated review and the context it was written from
#[derive(Debug, Clone, Serialize)]
pub struct Review {
    pub topic: String,
    pub strategy: String,
    pub text: String,
    pub context: Vec<Candidate>,
    /// Where the review was saved, if it was
    pub path: Option<PathBuf>,
}

/// Everything one `run` produced
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub download: DownloadStats,
    pub indexing: IndexingStats,
    pub review: Review,
    pub report: QualityReport,
}

pub struct App {
    settings: Settings,
    components: Components,
}

impl App {
    pub fn new(settings: Settings, components: Components) -> Self {
        Self {
            settings,
            components,
        }
    }

    /// Build components from the settings and wrap them
    pub async fn from_settings(settings: Settings) -> Result<Self> {
        let components = Components::from_settings(&settings).await?;
        Ok(Self::new(settings, components))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Named strategy, or the configured default
    ///
    /// Hybrid picks up the configured dense weight.
    pub fn strategy(&self, name: Option<&str>) -> Result<RetrievalStrategy> {
        let name = name.unwrap_or(&self.settings.retrieval.default_strategy);
        let strategy: RetrievalStrategy = name.parse()?;
        Ok(strategy.with_dense_weight(self.settings.retrieval.dense_weight))
    }

    pub fn retriever(&self) -> HybridRetriever {
        let rewriter = QueryRewriter::new(self.components.llm.clone())
            .with_max_sub_questions(self.settings.retrieval.max_sub_questions);
        let retriever = HybridRetriever::new(
            RetrieverConfig::from(&self.settings.retrieval),
            self.components.index.clone(),
            rewriter,
            self.components.reranker.clone(),
        );
        match &self.components.sparse_index {
            Some(sparse) => retriever.with_sparse_index(sparse.clone()),
            None => retriever,
        }
    }

    pub fn generator(&self) -> ReviewGenerator {
        let refiner = ContextRefiner::new(
            self.components.llm.clone(),
            RefinerConfig::from(&self.settings.refinement),
        );
        ReviewGenerator::new(self.components.llm.clone()).with_refiner(refiner)
    }

    pub fn evaluator(&self) -> Evaluator {
        Evaluator::new(self.components.llm.clone())
    }

    pub fn downloader(&self) -> PaperDownloader {
        PaperDownloader::new(
            self.components.source.clone(),
            self.components.fetcher.clone(),
            DownloaderConfig::from_settings(&self.settings.paths, &self.settings.ingestion),
        )
    }

    pub fn indexer(&self) -> Result<Indexer> {
        let chunker = RecursiveChunker::new(ChunkConfig::from(&self.settings.chunking))?;
        let indexer = Indexer::new(
            ParserRegistry::new(),
            chunker,
            self.components.index.clone(),
        )
        .with_extensions(self.settings.ingestion.document_extensions.clone());

        Ok(match &self.components.sparse_index {
            Some(sparse) => indexer.with_sparse_index(sparse.clone()),
            None => indexer,
        })
    }

    /// Search the catalog and download papers into the papers directory
    pub async fn ingest(&self, query: &str, max_papers: Option<usize>) -> Result<DownloadOutcome> {
        let max = max_papers.unwrap_or(self.settings.ingestion.max_papers);
        let outcome = self
            .downloader()
            .search_and_download_max(query, max)
            .await?;
        tracing::info!(
            query,
            papers = outcome.papers.len(),
            downloaded = outcome.stats.downloaded,
            "Ingestion complete"
        );
        Ok(outcome)
    }

    /// Rebuild the indexes from the papers directory
    pub async fn index(&self) -> Result<IndexingStats> {
        let stats = self
            .indexer()?
            .index_directory(&self.settings.paths.papers_dir())
            .await?;
        Ok(stats)
    }

    pub async fn retrieve(
        &self,
        query: &str,
        top_k: Option<usize>,
        strategy: RetrievalStrategy,
    ) -> Result<Vec<Candidate>> {
        let top_k = top_k.unwrap_or(self.settings.retrieval.top_k);
        Ok(self.retriever().retrieve(query, top_k, strategy).await?)
    }

    async fn write_review(&self, topic: &str, strategy: RetrievalStrategy) -> Result<Review> {
        let candidates = self.retrieve(topic, None, strategy).await?;
        if candidates.is_empty() {
            tracing::warn!(topic, "No context retrieved, generating without sources");
        }

        let (text, context) = self.generator().generate_review(topic, candidates).await;
        Ok(Review {
            topic: topic.to_string(),
            strategy: strategy.to_string(),
            text,
            context,
            path: None,
        })
    }

    /// Retrieve, refine, generate and save a review
    pub async fn generate(&self, topic: &str, strategy: RetrievalStrategy) -> Result<Review> {
        let mut review = self.write_review(topic, strategy).await?;
        let path = save_review(
            &self.settings.paths.output_dir(),
            topic,
            &review.strategy,
            &review.text,
        )
        .await?;
        review.path = Some(path);
        Ok(review)
    }

    /// Judge a review against the context it was written from
    pub async fn judge(&self, review: &Review) -> QualityReport {
        let evaluator = self.evaluator();
        QualityReport {
            faithfulness: evaluator.faithfulness(&review.text, &review.context).await,
            relevance: evaluator.relevance(&review.topic, &review.text).await,
        }
    }

    /// Generate a review (unsaved) and judge it
    pub async fn evaluate(
        &self,
        query: &str,
        strategy: RetrievalStrategy,
    ) -> Result<(Review, QualityReport)> {
        let review = self.write_review(query, strategy).await?;
        let report = self.judge(&review).await;
        Ok((review, report))
    }

    /// Ingest, index, generate, save and judge in one pass
    pub async fn run(
        &self,
        topic: &str,
        strategy: RetrievalStrategy,
        max_papers: Option<usize>,
    ) -> Result<RunSummary> {
        let download = self.ingest(topic, max_papers).await?.stats;
        let indexing = self.index().await?;
        if indexing.chunks_indexed == 0 {
            tracing::warn!(topic, "Nothing was indexed");
        }

        let review = self.generate(topic, strategy).await?;
        let report = self.judge(&review).await;

        metrics::counter!("litreview_runs_total", "strategy" => strategy.to_string()).increment(1);
        Ok(RunSummary {
            download,
            indexing,
            review,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use litreview_ingest::{IngestError, PaperMetadata, PaperSource, PdfFetcher};
    use litreview_llm::{LlmError, TextGenerator};
    use litreview_rag::{LocalVectorIndex, Reranker, SimpleEmbedder, SparseConfig, SparseIndex};
    use parking_lot::Mutex;
    use std::fs;
    use std::path::Path;
    use std::result::Result;
    use std::sync::Arc;

    /// Answers each pipeline prompt by its closing marker
    #[derive(Default)]
    struct PipelineLlm {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for PipelineLlm {
        async fn try_generate(&self, prompt: &str) -> Result<String, LlmError> {
            self.prompts.lock().push(prompt.to_string());
            let reply = if prompt.ends_with("HYPOTHETICAL ANSWER:\n") {
                "Cross-encoders rerank passages."
            } else if prompt.ends_with("RELEVANT SENTENCES:\n") {
                "Cross-encoders rerank passages jointly with the query."
            } else if prompt.ends_with("LITERATURE REVIEW:\n") {
                "Reranking improves precision [a.txt]."
            } else if prompt.contains("impartial judge") {
                "Reasoning: grounded.\nScore: 4"
            } else {
                return Err(LlmError::Generation("unexpected prompt".to_string()));
            };
            Ok(reply.to_string())
        }

        fn model_name(&self) -> &str {
            "pipeline"
        }
    }

    struct OnePaper;

    #[async_trait]
    impl PaperSource for OnePaper {
        async fn search(&self, _query: &str, max: usize) -> Result<Vec<PaperMetadata>, IngestError> {
            let paper = PaperMetadata {
                title: "Reranking Survey".to_string(),
                summary: String::new(),
                authors: vec![],
                published: None,
                pdf_url: "http://example.org/pdf/1".to_string(),
            };
            Ok(std::iter::repeat(paper).take(max.min(1)).collect())
        }

        fn name(&self) -> &str {
            "one"
        }
    }

    struct BytesFetcher;

    #[async_trait]
    impl PdfFetcher for BytesFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, IngestError> {
            Ok(vec![b'%'; 2048])
        }
    }

    fn settings_in(dir: &Path) -> Settings {
        let mut settings = Settings::default();
        settings.paths.papers_dir = dir.join("papers").display().to_string();
        settings.paths.vector_db_dir = dir.join("vector_db").display().to_string();
        settings.paths.output_dir = dir.join("output").display().to_string();
        settings.ingestion.document_extensions = vec!["txt".to_string()];
        settings.chunking.chunk_size = 80;
        settings.chunking.chunk_overlap = 10;
        settings
    }

    fn app_in(dir: &Path, llm: Arc<PipelineLlm>) -> App {
        let components = Components {
            llm,
            index: Arc::new(LocalVectorIndex::in_memory(
                Arc::new(SimpleEmbedder::default()),
                "test",
            )),
            sparse_index: Some(Arc::new(SparseIndex::new(SparseConfig::default()).unwrap())),
            reranker: Arc::new(Reranker::lexical()),
            source: Arc::new(OnePaper),
            fetcher: Arc::new(BytesFetcher),
        };
        App::new(settings_in(dir), components)
    }

    fn write_papers(app: &App) {
        let papers = app.settings().paths.papers_dir();
        fs::create_dir_all(&papers).unwrap();
        fs::write(
            papers.join("a.txt"),
            "Cross-encoders rerank passages jointly with the query.",
        )
        .unwrap();
        fs::write(papers.join("b.txt"), "Tokenizers split text into subwords.").unwrap();
    }

    #[test]
    fn test_strategy_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_in(dir.path(), Arc::new(PipelineLlm::default()));

        assert_eq!(app.strategy(None).unwrap(), RetrievalStrategy::Hyde);
        assert_eq!(
            app.strategy(Some("complex")).unwrap(),
            RetrievalStrategy::Decomposition
        );
        assert_eq!(
            app.strategy(Some("hybrid")).unwrap(),
            RetrievalStrategy::Hybrid { dense_weight: 0.5 }
        );
        assert!(app.strategy(Some("fastest")).is_err());
    }

    #[tokio::test]
    async fn test_index_then_retrieve() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_in(dir.path(), Arc::new(PipelineLlm::default()));
        write_papers(&app);

        let stats = app.index().await.unwrap();
        assert_eq!(stats.documents_indexed, 2);

        let results = app
            .retrieve("rerank passages", Some(1), RetrievalStrategy::Standard)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title(), Some("a.txt"));
        assert!(results[0].rerank_score.is_some());
    }

    #[tokio::test]
    async fn test_generate_saves_review() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_in(dir.path(), Arc::new(PipelineLlm::default()));
        write_papers(&app);
        app.index().await.unwrap();

        let review = app
            .generate("cross encoder reranking", RetrievalStrategy::Hyde)
            .await
            .unwrap();

        assert_eq!(review.text, "Reranking improves precision [a.txt].");
        let path = review.path.clone().unwrap();
        assert_eq!(
            path,
            dir.path().join("output").join("review_cross_encoder_reranking.md")
        );
        let saved = fs::read_to_string(path).unwrap();
        assert!(saved.starts_with("# cross encoder reranking\n\n**Strategy:** hyde\n\n"));
        // Refinement replaced the chunk text with the extraction
        assert!(review
            .context
            .iter()
            .all(|c| c.text == "Cross-encoders rerank passages jointly with the query."));
    }

    #[tokio::test]
    async fn test_evaluate_judges_without_saving() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(PipelineLlm::default());
        let app = app_in(dir.path(), llm.clone());
        write_papers(&app);
        app.index().await.unwrap();

        let (review, report) = app
            .evaluate("rerank passages", RetrievalStrategy::Standard)
            .await
            .unwrap();

        assert!(review.path.is_none());
        assert_eq!(report.faithfulness.score, 4);
        assert_eq!(report.relevance.score, 4);
        assert!(!dir.path().join("output").exists());

        let judged = llm
            .prompts
            .lock()
            .iter()
            .filter(|p| p.contains("impartial judge"))
            .count();
        assert_eq!(judged, 2);
    }

    #[tokio::test]
    async fn test_hybrid_uses_keyword_index() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_in(dir.path(), Arc::new(PipelineLlm::default()));
        write_papers(&app);
        app.index().await.unwrap();

        let strategy = app.strategy(Some("hybrid")).unwrap();
        let results = app.retrieve("subwords", Some(2), strategy).await.unwrap();
        assert_eq!(results[0].title(), Some("b.txt"));
    }

    #[tokio::test]
    async fn test_run_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_in(dir.path(), Arc::new(PipelineLlm::default()));

        let summary = app
            .run("reranking", RetrievalStrategy::Standard, Some(3))
            .await
            .unwrap();

        assert_eq!(summary.download.found, 1);
        assert_eq!(summary.download.downloaded, 1);
        assert!(dir.path().join("papers").join("Reranking Survey.pdf").exists());
        // Only .txt documents are indexed here
        assert_eq!(summary.indexing.files_found, 0);
        assert!(summary.review.context.is_empty());
        assert!(summary.review.path.unwrap().exists());
        assert_eq!(summary.report.relevance.score, 4);
    }
}
