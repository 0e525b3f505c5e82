//! Lightweight PDF inspection using lopdf.
//!
//! Documents are sent to the service as raw bytes; inspection only gathers
//! metadata for logging and reporting and never rejects a document.

use lopdf::Document;
use tracing::debug;

/// MIME type of PDF documents.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Basic facts about a PDF document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfInfo {
    /// Number of pages.
    pub page_count: u32,
    /// Whether the document is encrypted.
    pub encrypted: bool,
}

impl PdfInfo {
    /// Inspect PDF bytes; `None` if lopdf cannot parse them.
    pub fn inspect(bytes: &[u8]) -> Option<Self> {
        if !looks_like_pdf(bytes) {
            return None;
        }

        match Document::load_mem(bytes) {
            Ok(document) => Some(Self {
                page_count: document.get_pages().len() as u32,
                encrypted: document.is_encrypted(),
            }),
            Err(e) => {
                debug!("PDF inspection failed: {}", e);
                None
            }
        }
    }
}

/// Whether the bytes start with the PDF header.
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_detection() {
        assert!(looks_like_pdf(b"%PDF-1.7\n..."));
        assert!(!looks_like_pdf(b"PK\x03\x04"));
        assert!(!looks_like_pdf(b""));
    }

    #[test]
    fn test_inspect_rejects_non_pdf() {
        assert_eq!(PdfInfo::inspect(b"plain text, not a document"), None);
    }

    #[test]
    fn test_inspect_tolerates_truncated_pdf() {
        let info = PdfInfo::inspect(b"%PDF-1.4\n1 0 obj\n<<");
        assert!(info.map_or(true, |info| info.page_count == 0));
    }
}
