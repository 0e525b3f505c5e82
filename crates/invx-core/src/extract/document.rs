//! Rate-limited extraction of a single document.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use invx_genai::{Content, GenerativeBackend, Part};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::EXTRACTION_PROMPT;
use crate::error::Result;
use crate::limiter::RateLimiter;
use crate::pdf::{PdfInfo, PDF_MIME_TYPE};

/// Unvalidated extraction output for one document.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedDocument {
    /// File name without extension.
    pub filename: String,
    /// Concatenated model output; expected to be a JSON array of pages.
    pub raw_text: String,
    /// Page count, when the document could be inspected locally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    /// When the extraction finished.
    pub extracted_at: DateTime<Utc>,
}

/// Turns one document into one per-page JSON text blob with a single call.
pub struct DocumentExtractor<B: GenerativeBackend> {
    backend: Arc<B>,
    limiter: Arc<RateLimiter>,
    mime_type: String,
}

impl<B: GenerativeBackend> DocumentExtractor<B> {
    /// Create an extractor sharing `limiter` with other callers.
    pub fn new(backend: Arc<B>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            backend,
            limiter,
            mime_type: PDF_MIME_TYPE.to_string(),
        }
    }

    /// Set the MIME type documents are tagged with.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Read a document from disk and extract it.
    pub fn extract(&self, path: &Path) -> Result<ExtractedDocument> {
        info!("Processing PDF: {}", path.display());

        let bytes = std::fs::read(path)?;
        self.extract_bytes(file_stem(path), bytes)
    }

    /// Extract a document already held in memory.
    pub fn extract_bytes(
        &self,
        filename: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<ExtractedDocument> {
        let filename = filename.into();

        let info = PdfInfo::inspect(&bytes);
        if info.is_some_and(|info| info.encrypted) {
            warn!("{} is encrypted; the service may not be able to read it", filename);
        }
        let page_count = info.map(|info| info.page_count);
        debug!(
            "Extracting {} ({} bytes, {:?} pages)",
            filename,
            bytes.len(),
            page_count
        );

        let contents = vec![Content::user(vec![
            Part::inline(self.mime_type.clone(), bytes),
            Part::text(EXTRACTION_PROMPT),
        ])];

        self.limiter.wait();
        let raw_text = self.backend.stream_generate(&contents)?.collect_text()?;

        debug!("Received {} bytes for {}", raw_text.len(), filename);

        Ok(ExtractedDocument {
            filename,
            raw_text,
            page_count,
            extracted_at: Utc::now(),
        })
    }
}

impl<B: GenerativeBackend> Clone for DocumentExtractor<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            limiter: Arc::clone(&self.limiter),
            mime_type: self.mime_type.clone(),
        }
    }
}

/// File name with the extension stripped.
pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}
