//! Sparse Search using Tantivy (BM25)
//!
//! Keyword index over the same chunks as the vector index, used by the hybrid
//! strategy.

use parking_lot::RwLock;
use std::path::Path;
use tantivy::{
    collector::TopDocs,
    query::QueryParser,
    schema::{Field, OwnedValue, Schema, TextFieldIndexing, TextOptions, STORED, STRING},
    tokenizer::{Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer},
    Index, IndexReader, IndexWriter, TantivyDocument,
};

use litreview_core::{Candidate, CandidateSource, Chunk, Metadata};

use crate::RagError;

const TOKENIZER: &str = "english_stem";

/// Sparse search configuration
#[derive(Debug, Clone)]
pub struct SparseConfig {
    /// Index directory (RAM if None)
    pub index_path: Option<String>,
    /// Default number of results
    pub top_k: usize,
    /// Enable English stemming
    pub stemming: bool,
}

impl Default for SparseConfig {
    fn default() -> Self {
        Self {
            index_path: None,
            top_k: 50,
            stemming: true,
        }
    }
}

/// BM25 index over chunks
pub struct SparseIndex {
    index: Index,
    reader: IndexReader,
    writer: RwLock<IndexWriter>,
    id_field: Field,
    text_field: Field,
    title_field: Field,
    metadata_field: Field,
    config: SparseConfig,
}

impl SparseIndex {
    pub fn new(config: SparseConfig) -> Result<Self, RagError> {
        let mut schema_builder = Schema::builder();

        let text_options = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer(TOKENIZER)
                    .set_index_option(tantivy::schema::IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();

        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let text_field = schema_builder.add_text_field("text", text_options.clone());
        let title_field = schema_builder.add_text_field("title", text_options);
        let metadata_field = schema_builder.add_text_field("metadata", STORED);

        let schema = schema_builder.build();

        let index = if let Some(ref path) = config.index_path {
            std::fs::create_dir_all(path).map_err(|e| RagError::Index(e.to_string()))?;
            let dir = tantivy::directory::MmapDirectory::open(Path::new(path))
                .map_err(|e| RagError::Index(e.to_string()))?;
            Index::open_or_create(dir, schema).map_err(|e| RagError::Index(e.to_string()))?
        } else {
            Index::create_in_ram(schema)
        };

        index
            .tokenizers()
            .register(TOKENIZER, Self::build_tokenizer(&config));

        let reader = index.reader().map_err(|e| RagError::Index(e.to_string()))?;

        let writer = index
            .writer(50_000_000) // 50MB buffer
            .map_err(|e| RagError::Index(e.to_string()))?;

        tracing::debug!(
            path = config.index_path.as_deref().unwrap_or("<ram>"),
            stemming = config.stemming,
            "Sparse index opened"
        );

        Ok(Self {
            index,
            reader,
            writer: RwLock::new(writer),
            id_field,
            text_field,
            title_field,
            metadata_field,
            config,
        })
    }

    fn build_tokenizer(config: &SparseConfig) -> TextAnalyzer {
        let base = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(100))
            .filter(LowerCaser);

        if config.stemming {
            base.filter(Stemmer::new(Language::English)).build()
        } else {
            base.build()
        }
    }

    fn commit(&self, writer: &mut IndexWriter) -> Result<(), RagError> {
        writer
            .commit()
            .map_err(|e| RagError::Index(e.to_string()))?;
        self.reader
            .reload()
            .map_err(|e| RagError::Index(e.to_string()))
    }

    /// Index chunks, replacing any with the same id
    pub fn index_chunks(&self, chunks: &[Chunk]) -> Result<(), RagError> {
        let mut writer = self.writer.write();

        for chunk in chunks {
            writer.delete_term(tantivy::Term::from_field_text(self.id_field, &chunk.id));

            let mut doc = TantivyDocument::default();
            doc.add_text(self.id_field, &chunk.id);
            doc.add_text(self.text_field, &chunk.text);
            if let Some(title) = chunk.title() {
                doc.add_text(self.title_field, title);
            }
            let metadata = serde_json::to_string(&chunk.metadata)
                .map_err(|e| RagError::Index(e.to_string()))?;
            doc.add_text(self.metadata_field, &metadata);

            writer
                .add_document(doc)
                .map_err(|e| RagError::Index(e.to_string()))?;
        }

        self.commit(&mut writer)
    }

    /// Remove every document
    pub fn clear(&self) -> Result<(), RagError> {
        let mut writer = self.writer.write();
        writer
            .delete_all_documents()
            .map_err(|e| RagError::Index(e.to_string()))?;
        self.commit(&mut writer)
    }

    fn stored_str(doc: &TantivyDocument, field: Field) -> Option<&str> {
        match doc.get_first(field) {
            Some(OwnedValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// BM25 search, best first
    ///
    /// Query syntax errors are tolerated; whatever parses is searched.
    pub fn search(&self, query: &str, top_k: Option<usize>) -> Result<Vec<Candidate>, RagError> {
        let k = top_k.unwrap_or(self.config.top_k);
        if k == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let query_parser =
            QueryParser::for_index(&self.index, vec![self.text_field, self.title_field]);
        let (parsed, errors) = query_parser.parse_query_lenient(query);
        if !errors.is_empty() {
            tracing::debug!(query, errors = errors.len(), "Lenient query parse");
        }

        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(k))
            .map_err(|e| RagError::Search(e.to_string()))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| RagError::Search(e.to_string()))?;

            let metadata: Metadata = match Self::stored_str(&doc, self.metadata_field) {
                Some(raw) => {
                    serde_json::from_str(raw).map_err(|e| RagError::Search(e.to_string()))?
                },
                None => Metadata::new(),
            };

            results.push(Candidate {
                id: Self::stored_str(&doc, self.id_field).unwrap_or("").to_string(),
                text: Self::stored_str(&doc, self.text_field)
                    .unwrap_or("")
                    .to_string(),
                metadata,
                score,
                source: CandidateSource::Sparse,
                rerank_score: None,
            });
        }

        Ok(results)
    }

    /// Get document count
    pub fn doc_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}
