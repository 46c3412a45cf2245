//! Document parsers
//!
//! Text extraction keyed by file extension. A missing file is always
//! [`IngestError::NotFound`], whichever parser is asked.

use std::fs;
use std::path::Path;

use crate::IngestError;

/// Extracts plain text from a document on disk
pub trait DocumentParser: Send + Sync {
    /// Extract the document text
    fn parse(&self, path: &Path) -> Result<String, IngestError>;

    /// Lowercase extensions this parser accepts
    fn extensions(&self) -> &[&'static str];

    /// Check if this parser can handle the file
    fn can_parse(&self, path: &Path) -> bool {
        extension_of(path)
            .map(|ext| self.extensions().contains(&ext.as_str()))
            .unwrap_or(false)
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn ensure_exists(path: &Path) -> Result<(), IngestError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(IngestError::NotFound(path.display().to_string()))
    }
}

/// UTF-8 text and Markdown files
pub struct PlainTextParser;

impl DocumentParser for PlainTextParser {
    fn parse(&self, path: &Path) -> Result<String, IngestError> {
        ensure_exists(path)?;
        let bytes = fs::read(path)?;
        String::from_utf8(bytes)
            .map_err(|e| IngestError::Parse(format!("{}: {}", path.display(), e)))
    }

    fn extensions(&self) -> &[&'static str] {
        &["txt", "md", "markdown"]
    }
}

/// PDF text extraction via `pdf-extract`
#[cfg(feature = "pdf")]
pub struct PdfParser;

#[cfg(feature = "pdf")]
impl DocumentParser for PdfParser {
    fn parse(&self, path: &Path) -> Result<String, IngestError> {
        ensure_exists(path)?;
        pdf_extract::extract_text(path)
            .map_err(|e| IngestError::Parse(format!("{}: {}", path.display(), e)))
    }

    fn extensions(&self) -> &[&'static str] {
        &["pdf"]
    }
}

/// Dispatches to the first parser that accepts the file's extension
pub struct ParserRegistry {
    parsers: Vec<Box<dyn DocumentParser>>,
}

impl ParserRegistry {
    /// Registry with every built-in parser
    pub fn new() -> Self {
        #[allow(unused_mut)]
        let mut parsers: Vec<Box<dyn DocumentParser>> = vec![Box::new(PlainTextParser)];
        #[cfg(feature = "pdf")]
        parsers.push(Box::new(PdfParser));
        Self { parsers }
    }

    /// Registry with explicit parsers
    pub fn with_parsers(parsers: Vec<Box<dyn DocumentParser>>) -> Self {
        Self { parsers }
    }

    /// Whether some parser accepts the file's extension
    pub fn supports(&self, path: &Path) -> bool {
        self.parsers.iter().any(|p| p.can_parse(path))
    }

    /// Parse a document
    pub fn parse(&self, path: &Path) -> Result<String, IngestError> {
        ensure_exists(path)?;
        self.parsers
            .iter()
            .find(|p| p.can_parse(path))
            .ok_or_else(|| IngestError::Unsupported(path.display().to_string()))?
            .parse(path)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}
