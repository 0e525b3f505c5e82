//! Remote service backend implementations.

#[cfg(feature = "gemini")]
pub mod gemini;

use crate::{Content, Conversation, DocumentHandle, DocumentState, Result, TextStream};

/// Trait for generative document-understanding services.
///
/// Implementations accept documents plus prompts and answer with text. Every
/// method performs exactly one remote call; retries are the caller's concern.
pub trait GenerativeBackend: Send + Sync {
    /// Register a document with the service.
    ///
    /// # Arguments
    /// * `bytes` - Full document contents
    /// * `mime_type` - MIME type of the document
    /// * `display_name` - Name shown by the service, usually the file name
    fn register_document(
        &self,
        bytes: &[u8],
        mime_type: &str,
        display_name: &str,
    ) -> Result<DocumentHandle>;

    /// Query the current lifecycle state of a registered document.
    fn document_state(&self, handle: &DocumentHandle) -> Result<DocumentState>;

    /// Send a prompt and stream the reply.
    ///
    /// `contents` is the full turn history, the last turn being the prompt.
    fn stream_generate(&self, contents: &[Content]) -> Result<TextStream>;

    /// Open a conversation seeded with registered documents.
    fn open_context(&self, seed: &[DocumentHandle]) -> Conversation {
        Conversation::seeded(seed)
    }

    /// Model identifier used for generation.
    fn model_name(&self) -> &str;
}
