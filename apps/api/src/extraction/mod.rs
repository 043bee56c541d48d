//! Turns an uploaded resume (plain text or PDF) into a single string.

use std::panic::AssertUnwindSafe;

use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Unsupported document type: {0}")]
    Unsupported(String),

    #[error("Document is not valid UTF-8 text: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Failed to read PDF: {0}")]
    Pdf(String),
}

/// The document formats the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    PlainText,
    Pdf,
}

impl DocumentKind {
    /// Resolves the kind from the declared MIME type, falling back to the file extension
    /// when the browser sent nothing useful (e.g. `application/octet-stream`).
    pub fn detect(content_type: Option<&str>, file_name: Option<&str>) -> Result<Self, ExtractionError> {
        let mime = content_type
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
            .unwrap_or_default();

        match mime.as_str() {
            "text/plain" => return Ok(DocumentKind::PlainText),
            "application/pdf" => return Ok(DocumentKind::Pdf),
            _ => {}
        }

        let extension = file_name
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("txt") => Ok(DocumentKind::PlainText),
            Some("pdf") => Ok(DocumentKind::Pdf),
            _ => Err(ExtractionError::Unsupported(format!(
                "{} ({})",
                file_name.unwrap_or("<unnamed>"),
                if mime.is_empty() { "no content type" } else { mime.as_str() }
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::PlainText => "text/plain",
            DocumentKind::Pdf => "application/pdf",
        }
    }
}

/// A single uploaded document as received from the form.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl Upload {
    /// Browsers send an empty file part when nothing was selected.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn kind(&self) -> Result<DocumentKind, ExtractionError> {
        DocumentKind::detect(self.content_type.as_deref(), self.file_name.as_deref())
    }
}

/// Extracts the full text of a document.
///
/// Plain text is decoded as UTF-8 verbatim. PDF text is extracted page by page and the
/// non-empty pages are concatenated in page order. PDF parsing is CPU-bound; callers on
/// the async runtime should run this on the blocking pool.
pub fn extract_text(kind: DocumentKind, bytes: &[u8]) -> Result<String, ExtractionError> {
    match kind {
        DocumentKind::PlainText => Ok(String::from_utf8(bytes.to_vec())?),
        DocumentKind::Pdf => {
            // pdf-extract panics on some malformed inputs instead of returning an error.
            let pages = std::panic::catch_unwind(AssertUnwindSafe(|| {
                pdf_extract::extract_text_from_mem_by_pages(bytes)
            }))
            .map_err(|_| ExtractionError::Pdf("parser panicked on malformed input".to_string()))?
            .map_err(|e| ExtractionError::Pdf(e.to_string()))?;
            debug!("PDF parsed: {} pages", pages.len());
            Ok(join_pages(pages))
        }
    }
}

/// Concatenates page texts, skipping pages that produced no extractable text.
fn join_pages<I>(pages: I) -> String
where
    I: IntoIterator<Item = String>,
{
    pages
        .into_iter()
        .filter(|page| !page.trim().is_empty())
        .collect()
}
