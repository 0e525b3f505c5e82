//! Error types for the invx-core library.

use std::time::Duration;

use invx_genai::DocumentState;
use thiserror::Error;

/// Main error type for the invx library.
#[derive(Error, Debug)]
pub enum InvxError {
    /// Missing credential, model identifier or otherwise unusable settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// An operation was invoked out of order.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// A registered document reached a terminal state other than ACTIVE.
    #[error("file {name} failed to process (state: {state})")]
    RemoteProcessing { name: String, state: DocumentState },

    /// A registered document did not become ready in time.
    #[error("file {name} was not ready after {waited:?}")]
    ReadyTimeout { name: String, waited: Duration },

    /// Model output is not the JSON object that was asked for.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Error from the remote service layer.
    #[error("remote service error: {0}")]
    Remote(#[from] invx_genai::GenAiError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the invx library.
pub type Result<T> = std::result::Result<T, InvxError>;
