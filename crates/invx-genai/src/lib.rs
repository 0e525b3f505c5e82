//! Generative document-understanding service abstraction for invx.
//!
//! This crate provides a unified interface for the remote service the
//! extraction pipeline delegates to:
//! - document registration and lifecycle polling
//! - prompts mixing text, inline bytes and registered documents
//! - streamed replies as a lazy [`TextStream`]
//!
//! The `gemini` feature enables the Gemini REST backend.

mod backend;
mod content;
mod error;
mod stream;

pub use backend::GenerativeBackend;
pub use content::{Content, Conversation, DocumentHandle, DocumentState, Part, Role};
pub use error::GenAiError;
pub use stream::{StreamState, TextStream};

#[cfg(feature = "gemini")]
pub use backend::gemini::{GeminiBackend, GeminiSettings, GenerationConfig, DEFAULT_BASE_URL};

/// Result type for remote service operations.
pub type Result<T> = std::result::Result<T, GenAiError>;
