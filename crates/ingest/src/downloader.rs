//! Paper download
//!
//! Searches the catalog and saves each PDF as `<sanitized title>.pdf` in the
//! papers directory. The directory is emptied first, so it always reflects
//! the latest search. Per-paper failures are logged and skipped; a catalog
//! failure yields no papers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use litreview_config::constants::ingestion;
use litreview_config::{IngestionConfig, PathsConfig};

use crate::source::{PaperMetadata, PaperSource};
use crate::IngestError;

/// Fetches raw PDF bytes
#[async_trait]
pub trait PdfFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, IngestError>;
}

/// HTTP fetcher sending a browser-like `User-Agent`
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self, IngestError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PdfFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, IngestError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(IngestError::Network(format!(
                "GET {} returned {}",
                url,
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Downloader configuration
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub papers_dir: PathBuf,
    pub max_papers: usize,
    /// Files smaller than this are deleted as incomplete
    pub min_pdf_bytes: u64,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            papers_dir: PathBuf::from(litreview_config::constants::paths::PAPERS_DIR),
            max_papers: ingestion::MAX_PAPERS,
            min_pdf_bytes: ingestion::MIN_PDF_BYTES,
        }
    }
}

impl DownloaderConfig {
    pub fn from_settings(paths: &PathsConfig, ingestion: &IngestionConfig) -> Self {
        Self {
            papers_dir: paths.papers_dir(),
            max_papers: ingestion.max_papers,
            min_pdf_bytes: ingestion.min_pdf_bytes,
        }
    }
}

/// A downloaded (or attempted) paper
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaperRecord {
    pub title: String,
    pub filepath: PathBuf,
    pub summary: String,
    pub authors: Vec<String>,
    pub published: Option<DateTime<Utc>>,
    pub url: String,
}

impl PaperRecord {
    fn new(paper: PaperMetadata, filepath: PathBuf) -> Self {
        Self {
            title: paper.title,
            filepath,
            summary: paper.summary,
            authors: paper.authors,
            published: paper.published,
            url: paper.pdf_url,
        }
    }
}

/// Download counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadStats {
    pub found: usize,
    pub downloaded: usize,
    pub already_present: usize,
    /// Deleted for being under the size threshold
    pub undersized: usize,
    pub failed: usize,
}

/// Papers and counters from one search
#[derive(Debug, Clone, Default)]
pub struct DownloadOutcome {
    pub papers: Vec<PaperRecord>,
    pub stats: DownloadStats,
}

/// Keep alphanumerics, space, `-` and `_`; trim trailing whitespace
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Remove regular files in `dir`, creating it if missing
async fn clear_directory(dir: &Path) -> Result<(), IngestError> {
    if !dir.exists() {
        tokio::fs::create_dir_all(dir).await?;
        return Ok(());
    }

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %e, "Could not delete old paper");
            }
        }
    }
    Ok(())
}

/// Searches and downloads papers into the papers directory
pub struct PaperDownloader {
    source: Arc<dyn PaperSource>,
    fetcher: Arc<dyn PdfFetcher>,
    config: DownloaderConfig,
}

impl PaperDownloader {
    pub fn new(
        source: Arc<dyn PaperSource>,
        fetcher: Arc<dyn PdfFetcher>,
        config: DownloaderConfig,
    ) -> Self {
        Self {
            source,
            fetcher,
            config,
        }
    }

    pub fn papers_dir(&self) -> &Path {
        &self.config.papers_dir
    }

    /// Search with the configured paper limit
    pub async fn search_and_download(&self, query: &str) -> Result<DownloadOutcome, IngestError> {
        self.search_and_download_max(query, self.config.max_papers)
            .await
    }

    /// Clear the papers directory, search, and download up to `max_results` PDFs
    ///
    /// Only clearing the directory can fail the call.
    pub async fn search_and_download_max(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<DownloadOutcome, IngestError> {
        clear_directory(&self.config.papers_dir).await?;

        let papers = match self.source.search(query, max_results).await {
            Ok(papers) => papers,
            Err(e) => {
                tracing::warn!(source = self.source.name(), query, error = %e, "Catalog search failed");
                return Ok(DownloadOutcome::default());
            },
        };

        let mut outcome = DownloadOutcome {
            papers: Vec::with_capacity(papers.len()),
            stats: DownloadStats {
                found: papers.len(),
                ..Default::default()
            },
        };

        for paper in papers {
            let filename = format!("{}.pdf", sanitize_title(&paper.title));
            let filepath = self.config.papers_dir.join(filename);

            if filepath.exists() {
                tracing::debug!(title = %paper.title, "Already downloaded");
                outcome.stats.already_present += 1;
                outcome.papers.push(PaperRecord::new(paper, filepath));
                continue;
            }

            match self.download(&paper.pdf_url, &filepath).await {
                Ok(size) if size < self.config.min_pdf_bytes => {
                    tracing::warn!(
                        title = %paper.title,
                        bytes = size,
                        "Downloaded file too small, deleting"
                    );
                    if let Err(e) = tokio::fs::remove_file(&filepath).await {
                        tracing::warn!(path = %filepath.display(), error = %e, "Could not delete undersized file");
                    }
                    outcome.stats.undersized += 1;
                    // The catalog entry is still reported
                    outcome.papers.push(PaperRecord::new(paper, filepath));
                },
                Ok(size) => {
                    tracing::info!(title = %paper.title, bytes = size, "Downloaded paper");
                    outcome.stats.downloaded += 1;
                    outcome.papers.push(PaperRecord::new(paper, filepath));
                },
                Err(e) => {
                    tracing::warn!(title = %paper.title, error = %e, "Failed to download paper");
                    outcome.stats.failed += 1;
                },
            }
        }

        metrics::counter!("litreview_papers_downloaded_total").increment(outcome.stats.downloaded as u64);
        tracing::info!(
            query,
            found = outcome.stats.found,
            downloaded = outcome.stats.downloaded,
            failed = outcome.stats.failed,
            "Ingestion complete"
        );
        Ok(outcome)
    }

    async fn download(&self, url: &str, filepath: &Path) -> Result<u64, IngestError> {
        let bytes = self.fetcher.fetch(url).await?;
        tokio::fs::write(filepath, &bytes).await?;
        Ok(tokio::fs::metadata(filepath).await?.len())
    }
}
