//! Prompt content, document handles and conversation turns.

use serde::{Deserialize, Serialize};

/// One element of a prompt: free text, inline binary data, or a reference
/// to a document previously registered with the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    /// Plain text.
    Text(String),
    /// Raw bytes tagged with a MIME type, sent inline with the request.
    InlineData { mime_type: String, data: Vec<u8> },
    /// A registered document, referenced by URI.
    FileData { mime_type: String, uri: String },
}

impl Part {
    /// Create a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(text.into())
    }

    /// Create an inline data part.
    pub fn inline(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Part::InlineData {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Create a part referencing a registered document.
    pub fn file(handle: &DocumentHandle) -> Self {
        Part::FileData {
            mime_type: handle.mime_type.clone(),
            uri: handle.uri.clone(),
        }
    }

    /// Text content, if this is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// A single turn: an ordered sequence of parts from one author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    /// A user turn.
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }

    /// A model turn holding a single text reply.
    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::text(text)],
        }
    }
}

/// Lifecycle state of a registered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentState {
    /// Registered, processing not started yet.
    Pending,
    /// The service is still processing the document.
    Processing,
    /// Ready to be used in prompts.
    Active,
    /// Processing failed; the document cannot be used.
    Failed,
}

impl DocumentState {
    /// Whether the document will not change state anymore.
    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentState::Active | DocumentState::Failed)
    }
}

impl std::fmt::Display for DocumentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentState::Pending => write!(f, "PENDING"),
            DocumentState::Processing => write!(f, "PROCESSING"),
            DocumentState::Active => write!(f, "ACTIVE"),
            DocumentState::Failed => write!(f, "FAILED"),
        }
    }
}

/// A document registered with the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHandle {
    /// Service-side resource name (e.g. `files/abc123`).
    pub name: String,
    /// URI used to reference the document in prompts.
    pub uri: String,
    /// Human-readable name, usually the original file name.
    pub display_name: String,
    /// MIME type the document was registered with.
    pub mime_type: String,
}

/// Stateful conversation seeded with registered documents.
///
/// The service itself is stateless; the conversation is the turn history
/// that gets replayed with every prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    seed: Vec<DocumentHandle>,
    history: Vec<Content>,
}

impl Conversation {
    /// Open a conversation whose first user turn carries all `seed` documents.
    pub fn seeded(seed: &[DocumentHandle]) -> Self {
        let parts = seed.iter().map(Part::file).collect();
        Self {
            seed: seed.to_vec(),
            history: vec![Content::user(parts)],
        }
    }

    /// Documents the conversation was seeded with.
    pub fn seed(&self) -> &[DocumentHandle] {
        &self.seed
    }

    /// All turns so far, oldest first.
    pub fn history(&self) -> &[Content] {
        &self.history
    }

    /// History extended with a pending user prompt, ready to send.
    pub fn with_prompt(&self, prompt: &str) -> Vec<Content> {
        let mut contents = self.history.clone();
        contents.push(Content::user(vec![Part::text(prompt)]));
        contents
    }

    /// Record a completed exchange.
    pub fn record_exchange(&mut self, prompt: &str, reply: &str) {
        self.history.push(Content::user(vec![Part::text(prompt)]));
        self.history.push(Content::model_text(reply));
    }
}
