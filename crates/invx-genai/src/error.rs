//! Error types for the remote service layer.

use thiserror::Error;

/// Errors that can occur while talking to the generative service.
#[derive(Error, Debug)]
pub enum GenAiError {
    /// Transport-level failure (connection, TLS, timeout).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The service answered with a non-success status.
    #[error("service error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// A response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The response stream was interrupted or cancelled.
    #[error("stream error: {0}")]
    Stream(String),

    /// Invalid backend settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error while reading a response body.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
