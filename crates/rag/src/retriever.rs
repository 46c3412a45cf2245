//! Hybrid Retriever
//!
//! Strategy dispatch, candidate gathering, deduplication and cross-encoder
//! reranking behind one `retrieve` call.
//!
//! Every strategy produces the same [`Candidate`] shape, so reranking does not
//! care how candidates were found. Reranking always scores against the
//! original query, never the rewritten text.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use litreview_config::constants::retrieval;
use litreview_config::RetrievalConfig;
use litreview_core::{Candidate, CandidateSource};

use crate::query_rewriter::QueryRewriter;
use crate::reranker::Reranker;
use crate::sparse_search::SparseIndex;
use crate::vector_store::VectorIndex;
use crate::RagError;

/// How candidates are gathered before reranking
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetrievalStrategy {
    /// Embed a hypothetical answer instead of the query
    Hyde,
    /// Query once per sub-question and merge, first occurrence wins
    Decomposition,
    /// Query with the raw text
    Standard,
    /// Dense and BM25 results fused with weighted reciprocal rank
    Hybrid { dense_weight: f32 },
}

impl RetrievalStrategy {
    /// Replace the fusion weight (no-op for non-hybrid strategies)
    pub fn with_dense_weight(self, weight: f32) -> Self {
        match self {
            RetrievalStrategy::Hybrid { .. } => RetrievalStrategy::Hybrid {
                dense_weight: weight,
            },
            other => other,
        }
    }
}

impl Default for RetrievalStrategy {
    fn default() -> Self {
        RetrievalStrategy::Hyde
    }
}

impl FromStr for RetrievalStrategy {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hyde" => Ok(RetrievalStrategy::Hyde),
            "complex" | "decomposition" => Ok(RetrievalStrategy::Decomposition),
            "standard" | "naive" => Ok(RetrievalStrategy::Standard),
            "hybrid" => Ok(RetrievalStrategy::Hybrid {
                dense_weight: retrieval::DENSE_WEIGHT,
            }),
            other => Err(RagError::InvalidArgument(format!(
                "Unknown retrieval strategy '{}' (expected hyde, complex, standard or hybrid)",
                other
            ))),
        }
    }
}

impl fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalStrategy::Hyde => write!(f, "hyde"),
            RetrievalStrategy::Decomposition => write!(f, "complex"),
            RetrievalStrategy::Standard => write!(f, "standard"),
            RetrievalStrategy::Hybrid { .. } => write!(f, "hybrid"),
        }
    }
}

/// Retriever configuration
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Candidates fetched for single-query strategies
    pub window_size: usize,
    /// Per-sub-question window is this multiple of `top_k`
    pub sub_question_window_multiplier: usize,
    /// Candidates fetched from the keyword index
    pub sparse_window: usize,
    /// RRF k parameter
    pub rrf_k: f32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            window_size: retrieval::WINDOW_SIZE,
            sub_question_window_multiplier: retrieval::SUB_QUESTION_WINDOW_MULTIPLIER,
            sparse_window: retrieval::SPARSE_WINDOW,
            rrf_k: retrieval::RRF_K,
        }
    }
}

impl From<&RetrievalConfig> for RetrieverConfig {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            window_size: config.window_size,
            sub_question_window_multiplier: config.sub_question_window_multiplier,
            sparse_window: config.sparse_window,
            rrf_k: config.rrf_k,
        }
    }
}

/// Merge candidate lists keeping the first occurrence of each id
fn dedup_first_wins(batches: Vec<Vec<Candidate>>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for candidate in batches.into_iter().flatten() {
        if seen.insert(candidate.id.clone()) {
            merged.push(candidate);
        }
    }
    merged
}

/// Weighted Reciprocal Rank Fusion
///
/// Each list contributes `weight / (k + rank + 1)` per item. Items present in
/// both lists become [`CandidateSource::Hybrid`]. Output is sorted by fused
/// score; ties keep first-seen order (dense before sparse).
pub fn rrf_fusion(
    dense: Vec<Candidate>,
    sparse: Vec<Candidate>,
    dense_weight: f32,
    rrf_k: f32,
) -> Vec<Candidate> {
    let mut fused: Vec<Candidate> = Vec::with_capacity(dense.len() + sparse.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    let sparse_weight = 1.0 - dense_weight;
    let lists = [(dense, dense_weight), (sparse, sparse_weight)];

    for (list, weight) in lists {
        for (rank, mut candidate) in list.into_iter().enumerate() {
            let weighted = weight / (rrf_k + rank as f32 + 1.0);
            match positions.get(&candidate.id) {
                Some(&pos) => {
                    let existing = &mut fused[pos];
                    existing.score += weighted;
                    if existing.source != candidate.source {
                        existing.source = CandidateSource::Hybrid;
                    }
                },
                None => {
                    candidate.score = weighted;
                    positions.insert(candidate.id.clone(), fused.len());
                    fused.push(candidate);
                },
            }
        }
    }

    fused.sort_by(|a, b| b.score.total_cmp(&a.score));
    fused
}

/// Retriever combining query rewriting, dense/sparse search and reranking
pub struct HybridRetriever {
    config: RetrieverConfig,
    index: Arc<dyn VectorIndex>,
    rewriter: QueryRewriter,
    reranker: Arc<Reranker>,
    sparse_index: Option<Arc<SparseIndex>>,
}

impl HybridRetriever {
    pub fn new(
        config: RetrieverConfig,
        index: Arc<dyn VectorIndex>,
        rewriter: QueryRewriter,
        reranker: Arc<Reranker>,
    ) -> Self {
        Self {
            config,
            index,
            rewriter,
            reranker,
            sparse_index: None,
        }
    }

    /// Enable the hybrid strategy
    pub fn with_sparse_index(mut self, index: Arc<SparseIndex>) -> Self {
        self.sparse_index = Some(index);
        self
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    pub fn reranker(&self) -> &Reranker {
        &self.reranker
    }

    fn window(&self, top_k: usize) -> usize {
        self.config.window_size.max(top_k)
    }

    async fn search_dense(&self, text: &str, n: usize) -> Result<Vec<Candidate>, RagError> {
        Ok(self.index.query(text, n).await?.into_candidates())
    }

    async fn search_sparse(&self, query: &str) -> Result<Vec<Candidate>, RagError> {
        let sparse = self.sparse_index.clone().ok_or_else(|| {
            RagError::Search("Hybrid retrieval requires a keyword index".to_string())
        })?;

        // Tantivy search is CPU-bound; keep it off the async executor
        let query_owned = query.to_string();
        let window = self.config.sparse_window;
        tokio::task::spawn_blocking(move || sparse.search(&query_owned, Some(window)))
            .await
            .map_err(|e| RagError::Search(format!("Sparse search task failed: {}", e)))?
    }

    /// Gather candidates for `query` without reranking
    pub async fn gather(
        &self,
        query: &str,
        top_k: usize,
        strategy: RetrievalStrategy,
    ) -> Result<Vec<Candidate>, RagError> {
        let candidates = match strategy {
            RetrievalStrategy::Hyde => {
                let hypothetical = self.rewriter.hypothetical_answer(query).await?;
                self.search_dense(&hypothetical, self.window(top_k)).await?
            },
            RetrievalStrategy::Decomposition => {
                let sub_questions = self.rewriter.sub_questions(query).await?;
                let window = top_k * self.config.sub_question_window_multiplier.max(1);

                // One at a time, in order, so the first occurrence is deterministic
                let mut batches = Vec::with_capacity(sub_questions.len());
                for sub_question in &sub_questions {
                    batches.push(self.search_dense(sub_question, window).await?);
                }
                let merged = dedup_first_wins(batches);

                tracing::info!(
                    sub_questions = sub_questions.len(),
                    unique = merged.len(),
                    "Merged sub-question candidates"
                );
                merged
            },
            RetrievalStrategy::Standard => self.search_dense(query, self.window(top_k)).await?,
            RetrievalStrategy::Hybrid { dense_weight } => {
                let dense = self.search_dense(query, self.window(top_k)).await?;
                let sparse = self.search_sparse(query).await?;
                tracing::debug!(
                    dense = dense.len(),
                    sparse = sparse.len(),
                    dense_weight,
                    "Fusing dense and sparse candidates"
                );
                rrf_fusion(dense, sparse, dense_weight, self.config.rrf_k)
            },
        };

        Ok(candidates)
    }

    /// Retrieve the `top_k` most relevant chunks for `query`
    ///
    /// Rewriting failures fail the call; there is no fallback to another
    /// strategy. Results are sorted by `rerank_score` descending.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        strategy: RetrievalStrategy,
    ) -> Result<Vec<Candidate>, RagError> {
        if top_k == 0 {
            return Err(RagError::InvalidArgument(
                "top_k must be a positive integer".to_string(),
            ));
        }

        let candidates = self.gather(query, top_k, strategy).await?;
        let gathered = candidates.len();

        let results = self.reranker.rerank(query, candidates, top_k)?;

        metrics::counter!("litreview_retrievals_total", "strategy" => strategy.to_string())
            .increment(1);
        tracing::info!(
            %strategy,
            candidates = gathered,
            returned = results.len(),
            "Retrieval complete"
        );

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reranker::CrossEncoder;
    use crate::sparse_search::SparseConfig;
    use crate::vector_store::QueryResult;
    use async_trait::async_trait;
    use litreview_core::{metadata_keys, Chunk, Metadata};
    use litreview_llm::{LlmError, TextGenerator};
    use parking_lot::Mutex;

    fn metadata(title: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert(metadata_keys::TITLE.to_string(), title.to_string());
        m
    }

    /// Serves fixed hits per query text; unknown texts get `default`
    struct MockIndex {
        by_text: HashMap<String, Vec<(&'static str, &'static str, f32)>>,
        default: Vec<(&'static str, &'static str, f32)>,
        queries: Mutex<Vec<(String, usize)>>,
    }

    impl MockIndex {
        fn returning(hits: Vec<(&'static str, &'static str, f32)>) -> Self {
            Self {
                by_text: HashMap::new(),
                default: hits,
                queries: Mutex::new(Vec::new()),
            }
        }

        fn on(mut self, text: &str, hits: Vec<(&'static str, &'static str, f32)>) -> Self {
            self.by_text.insert(text.to_string(), hits);
            self
        }
    }

    #[async_trait]
    impl VectorIndex for MockIndex {
        async fn upsert(&self, _chunks: &[Chunk]) -> Result<(), RagError> {
            Ok(())
        }

        async fn query(&self, text: &str, n_results: usize) -> Result<QueryResult, RagError> {
            self.queries.lock().push((text.to_string(), n_results));
            let hits = self.by_text.get(text).unwrap_or(&self.default);
            let mut result = QueryResult::default();
            for (id, body, distance) in hits.iter().take(n_results) {
                result.ids.push(id.to_string());
                result.documents.push(body.to_string());
                result.metadatas.push(metadata(&id[..1]));
                result.distances.push(*distance);
            }
            Ok(result)
        }

        async fn reset(&self) -> Result<(), RagError> {
            Ok(())
        }

        async fn count(&self) -> Result<usize, RagError> {
            Ok(self.default.len())
        }
    }

    struct TableEncoder(HashMap<&'static str, f32>);

    impl CrossEncoder for TableEncoder {
        fn score_batch(&self, _query: &str, passages: &[&str]) -> Result<Vec<f32>, RagError> {
            Ok(passages
                .iter()
                .map(|p| self.0.get(p).copied().unwrap_or(0.0))
                .collect())
        }

        fn name(&self) -> &str {
            "table"
        }
    }

    struct ScriptedLlm(Result<&'static str, &'static str>);

    #[async_trait]
    impl TextGenerator for ScriptedLlm {
        async fn try_generate(&self, _prompt: &str) -> Result<String, LlmError> {
            self.0
                .map(str::to_string)
                .map_err(|e| LlmError::Network(e.to_string()))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn corpus() -> Vec<(&'static str, &'static str, f32)> {
        vec![
            ("A_0", "alpha zero", 0.3),
            ("A_1", "alpha one", 0.1),
            ("B_0", "beta zero", 0.2),
        ]
    }

    fn reranker() -> Arc<Reranker> {
        Arc::new(Reranker::new(Arc::new(TableEncoder(HashMap::from([
            ("alpha zero", 0.9),
            ("alpha one", 0.1),
            ("beta zero", 0.5),
        ])))))
    }

    fn retriever(index: Arc<MockIndex>, llm: ScriptedLlm) -> HybridRetriever {
        HybridRetriever::new(
            RetrieverConfig::default(),
            index,
            QueryRewriter::new(Arc::new(llm)),
            reranker(),
        )
    }

    fn ids(results: &[Candidate]) -> Vec<&str> {
        results.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("hyde".parse::<RetrievalStrategy>().unwrap(), RetrievalStrategy::Hyde);
        assert_eq!(
            "complex".parse::<RetrievalStrategy>().unwrap(),
            RetrievalStrategy::Decomposition
        );
        assert_eq!(
            "Naive".parse::<RetrievalStrategy>().unwrap(),
            RetrievalStrategy::Standard
        );
        assert!(matches!(
            "hybrid".parse::<RetrievalStrategy>().unwrap(),
            RetrievalStrategy::Hybrid { .. }
        ));
        assert!("bm25".parse::<RetrievalStrategy>().is_err());
        assert_eq!(RetrievalStrategy::Decomposition.to_string(), "complex");
    }

    #[test]
    fn test_with_dense_weight() {
        let hybrid = RetrievalStrategy::Hybrid { dense_weight: 0.5 }.with_dense_weight(0.8);
        assert_eq!(hybrid, RetrievalStrategy::Hybrid { dense_weight: 0.8 });
        assert_eq!(
            RetrievalStrategy::Hyde.with_dense_weight(0.8),
            RetrievalStrategy::Hyde
        );
    }

    #[tokio::test]
    async fn test_end_to_end_rerank_order() {
        let index = Arc::new(MockIndex::returning(corpus()));
        let retriever = retriever(index.clone(), ScriptedLlm(Ok("unused")));

        let results = retriever
            .retrieve("X", 2, RetrievalStrategy::Standard)
            .await
            .unwrap();

        assert_eq!(ids(&results), vec!["A_0", "B_0"]);
        assert_eq!(results[0].rerank_score, Some(0.9));
        assert_eq!(results[1].rerank_score, Some(0.5));
        // Raw query, oversized window
        assert_eq!(index.queries.lock()[0], ("X".to_string(), retrieval::WINDOW_SIZE));
    }

    #[tokio::test]
    async fn test_hyde_queries_with_hypothetical_text() {
        let index = Arc::new(MockIndex::returning(corpus()));
        let retriever = retriever(index.clone(), ScriptedLlm(Ok("  a fabricated answer ")));

        let results = retriever
            .retrieve("X", 2, RetrievalStrategy::Hyde)
            .await
            .unwrap();

        assert_eq!(ids(&results), vec!["A_0", "B_0"]);
        assert_eq!(index.queries.lock()[0].0, "a fabricated answer");
    }

    #[tokio::test]
    async fn test_top_k_larger_than_candidates() {
        let index = Arc::new(MockIndex::returning(corpus()));
        let retriever = retriever(index, ScriptedLlm(Ok("")));
        let results = retriever
            .retrieve("X", 10, RetrievalStrategy::Standard)
            .await
            .unwrap();
        assert_eq!(ids(&results), vec!["A_0", "B_0", "A_1"]);
    }

    #[tokio::test]
    async fn test_zero_top_k_rejected() {
        let index = Arc::new(MockIndex::returning(corpus()));
        let retriever = retriever(index.clone(), ScriptedLlm(Ok("")));
        assert!(matches!(
            retriever.retrieve("X", 0, RetrievalStrategy::Hyde).await,
            Err(RagError::InvalidArgument(_))
        ));
        assert!(index.queries.lock().is_empty());
    }

    #[tokio::test]
    async fn test_decomposition_dedups_first_wins() {
        let index = Arc::new(
            MockIndex::returning(Vec::new())
                .on("What is alpha?", vec![("A_0", "alpha zero", 0.1), ("A_1", "alpha one", 0.2)])
                .on("What is beta?", vec![("A_1", "alpha one", 0.7), ("B_0", "beta zero", 0.3)]),
        );
        let retriever = retriever(
            index.clone(),
            ScriptedLlm(Ok("1. What is alpha?\n2. What is beta?\n")),
        );

        let candidates = retriever
            .gather("Compare alpha and beta", 3, RetrievalStrategy::Decomposition)
            .await
            .unwrap();

        assert_eq!(ids(&candidates), vec!["A_0", "A_1", "B_0"]);
        // A_1 keeps the distance from the first sub-question
        assert_eq!(candidates[1].score, 0.2);

        let queries = index.queries.lock().clone();
        assert_eq!(
            queries,
            vec![
                ("What is alpha?".to_string(), 6),
                ("What is beta?".to_string(), 6)
            ]
        );
    }

    #[tokio::test]
    async fn test_decomposition_never_duplicates() {
        let index = Arc::new(MockIndex::returning(corpus()));
        let retriever = retriever(index, ScriptedLlm(Ok("one\ntwo\nthree")));

        let results = retriever
            .retrieve("q", 5, RetrievalStrategy::Decomposition)
            .await
            .unwrap();

        let unique: HashSet<_> = results.iter().map(|c| c.id.clone()).collect();
        assert_eq!(unique.len(), results.len());
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_zero_sub_questions_yield_nothing() {
        let index = Arc::new(MockIndex::returning(corpus()));
        let retriever = retriever(index.clone(), ScriptedLlm(Ok("\n\n")));

        let results = retriever
            .retrieve("q", 5, RetrievalStrategy::Decomposition)
            .await
            .unwrap();

        assert!(results.is_empty());
        assert!(index.queries.lock().is_empty());
    }

    #[tokio::test]
    async fn test_rewrite_failure_fails_retrieval() {
        let index = Arc::new(MockIndex::returning(corpus()));
        let retriever = retriever(index.clone(), ScriptedLlm(Err("connection refused")));

        for strategy in [RetrievalStrategy::Hyde, RetrievalStrategy::Decomposition] {
            assert!(matches!(
                retriever.retrieve("q", 2, strategy).await,
                Err(RagError::Generation(_))
            ));
        }
        // No silent fallback to a raw query
        assert!(index.queries.lock().is_empty());
    }

    #[tokio::test]
    async fn test_hybrid_without_sparse_index() {
        let index = Arc::new(MockIndex::returning(corpus()));
        let retriever = retriever(index, ScriptedLlm(Ok("")));
        assert!(matches!(
            retriever
                .retrieve("q", 2, RetrievalStrategy::Hybrid { dense_weight: 0.5 })
                .await,
            Err(RagError::Search(_))
        ));
    }

    #[tokio::test]
    async fn test_hybrid_fuses_sparse_hits() {
        let sparse = SparseIndex::new(SparseConfig::default()).unwrap();
        sparse
            .index_chunks(&[
                Chunk::new("B_0", "beta zero", metadata("B")),
                Chunk::new("C_0", "gamma zero", metadata("C")),
            ])
            .unwrap();

        let index = Arc::new(MockIndex::returning(vec![("B_0", "beta zero", 0.2)]));
        let retriever =
            retriever(index, ScriptedLlm(Ok(""))).with_sparse_index(Arc::new(sparse));

        let candidates = retriever
            .gather("zero", 2, RetrievalStrategy::Hybrid { dense_weight: 0.5 })
            .await
            .unwrap();

        let b = candidates.iter().find(|c| c.id == "B_0").unwrap();
        assert_eq!(b.source, CandidateSource::Hybrid);
        let c = candidates.iter().find(|c| c.id == "C_0").unwrap();
        assert_eq!(c.source, CandidateSource::Sparse);
        assert_eq!(candidates[0].id, "B_0");
    }

    #[test]
    fn test_rrf_fusion() {
        let dense = vec![
            Candidate::from_vector("1", "doc1", Metadata::new(), 0.1),
            Candidate::from_vector("2", "doc2", Metadata::new(), 0.2),
        ];
        let mut sparse2: Candidate = Chunk::new("2", "doc2", Metadata::new()).into();
        sparse2.source = CandidateSource::Sparse;
        let mut sparse3: Candidate = Chunk::new("3", "doc3", Metadata::new()).into();
        sparse3.source = CandidateSource::Sparse;

        let fused = rrf_fusion(dense, vec![sparse2, sparse3], 0.5, 60.0);

        // doc2 appears in both lists and ranks first
        assert_eq!(fused.len(), 3);
        assert_eq!(fused[0].id, "2");
        assert_eq!(fused[0].source, CandidateSource::Hybrid);
        assert!((fused[0].score - (0.5 / 62.0 + 0.5 / 61.0)).abs() < 1e-6);
    }

    #[test]
    fn test_rrf_fusion_dense_only_weight() {
        let dense = vec![Candidate::from_vector("1", "doc1", Metadata::new(), 0.1)];
        let mut sparse: Candidate = Chunk::new("2", "doc2", Metadata::new()).into();
        sparse.source = CandidateSource::Sparse;

        let fused = rrf_fusion(dense, vec![sparse], 1.0, 60.0);
        assert_eq!(fused[0].id, "1");
        assert_eq!(fused[1].score, 0.0);
    }
}
