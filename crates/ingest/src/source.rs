//! Paper catalog
//!
//! [`ArxivSource`] queries the arXiv Atom API, relevance-sorted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use litreview_config::constants::endpoints;

use crate::IngestError;

/// Catalog entry for one paper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperMetadata {
    pub title: String,
    pub summary: String,
    pub authors: Vec<String>,
    pub published: Option<DateTime<Utc>>,
    pub pdf_url: String,
}

/// Searches a paper catalog
#[async_trait]
pub trait PaperSource: Send + Sync {
    /// Up to `max_results` papers matching `query`, best match first
    async fn search(&self, query: &str, max_results: usize)
        -> Result<Vec<PaperMetadata>, IngestError>;

    /// Source name for logs
    fn name(&self) -> &str;
}

static ENTRY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<entry>(.*?)</entry>").unwrap());
static TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<title[^>]*>(.*?)</title>").unwrap());
static SUMMARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<summary[^>]*>(.*?)</summary>").unwrap());
static AUTHOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<name>(.*?)</name>").unwrap());
static PUBLISHED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<published>\s*(.*?)\s*</published>").unwrap());
static ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"<id>\s*(.*?)\s*</id>").unwrap());
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"<link\s([^>]*?)/?>").unwrap());
static ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(\w+)="([^"]*)""#).unwrap());
static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|lt|gt|quot|apos|amp);").unwrap());

/// Decode XML entities in one pass; invalid code points are left as written
fn unescape(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let decoded = match name {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "amp" => Some('&'),
                _ => {
                    let digits = &name[1..];
                    let code = match digits.strip_prefix(['x', 'X']) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => digits.parse::<u32>().ok(),
                    };
                    code.and_then(char::from_u32)
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

/// Collapse runs of whitespace (titles and abstracts wrap across lines)
fn collapse(text: &str) -> String {
    unescape(text).split_whitespace().collect::<Vec<_>>().join(" ")
}

fn pdf_link(entry: &str) -> Option<String> {
    for link in LINK.captures_iter(entry) {
        let attrs: Vec<(&str, &str)> = ATTR
            .captures_iter(&link[1])
            .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
            .collect();
        let is_pdf = attrs
            .iter()
            .any(|(k, v)| (*k == "title" && *v == "pdf") || (*k == "type" && *v == "application/pdf"));
        if is_pdf {
            if let Some((_, href)) = attrs.iter().find(|(k, _)| *k == "href") {
                return Some(unescape(href));
            }
        }
    }

    // Fall back to the abstract id: /abs/<id> -> /pdf/<id>
    ID.captures(entry)
        .map(|c| c[1].replace("/abs/", "/pdf/"))
}

/// Parse an arXiv Atom feed
///
/// Entries without a title or a PDF link are skipped.
pub fn parse_atom_feed(feed: &str) -> Vec<PaperMetadata> {
    ENTRY
        .captures_iter(feed)
        .filter_map(|entry| {
            let body = &entry[1];
            let title = collapse(&TITLE.captures(body)?[1]);
            if title.is_empty() {
                return None;
            }
            let pdf_url = pdf_link(body)?;

            Some(PaperMetadata {
                title,
                summary: SUMMARY
                    .captures(body)
                    .map(|c| collapse(&c[1]))
                    .unwrap_or_default(),
                authors: AUTHOR
                    .captures_iter(body)
                    .map(|c| collapse(&c[1]))
                    .collect(),
                published: PUBLISHED
                    .captures(body)
                    .and_then(|c| DateTime::parse_from_rfc3339(&c[1]).ok())
                    .map(|d| d.with_timezone(&Utc)),
                pdf_url,
            })
        })
        .collect()
}

/// arXiv catalog search
pub struct ArxivSource {
    client: Client,
    endpoint: String,
}

impl ArxivSource {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, IngestError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl Default for ArxivSource {
    fn default() -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoints::ARXIV_DEFAULT.to_string(),
        }
    }
}

#[async_trait]
impl PaperSource for ArxivSource {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<PaperMetadata>, IngestError> {
        let max = max_results.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("search_query", query),
                ("start", "0"),
                ("max_results", max.as_str()),
                ("sortBy", "relevance"),
                ("sortOrder", "descending"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IngestError::Network(format!(
                "arXiv query failed: {}",
                response.status()
            )));
        }

        let feed = response.text().await?;
        let mut papers = parse_atom_feed(&feed);
        papers.truncate(max_results);

        tracing::info!(query, results = papers.len(), "arXiv search complete");
        Ok(papers)
    }

    fn name(&self) -> &str {
        "arxiv"
    }
}
