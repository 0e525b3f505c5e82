//! One multi-document batch: upload, wait for readiness, converse.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use invx_genai::{Conversation, DocumentHandle, DocumentState, GenerativeBackend};
use tracing::{debug, error, info};

use super::poll::PollPolicy;
use super::{DEFAULT_ANALYSIS_PROMPT, STRUCTURE_DIRECTIVE};
use crate::error::{InvxError, Result};
use crate::limiter::RateLimiter;

/// Where a batch session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// No documents registered.
    Empty,
    /// Documents are being registered.
    Uploading,
    /// Waiting for the service to finish processing documents.
    Waiting,
    /// Conversation open, ready for prompts.
    Ready,
}

#[derive(Debug, Clone)]
struct TrackedDocument {
    handle: DocumentHandle,
    state: DocumentState,
}

/// Documents and conversation belonging to exactly one batch.
///
/// A session is created per batch and owned by the caller, so documents
/// from different batches can never end up in the same conversation.
pub struct BatchSession<B: GenerativeBackend> {
    backend: Arc<B>,
    poll: PollPolicy,
    limiter: Option<Arc<RateLimiter>>,
    default_prompt: String,
    documents: Vec<TrackedDocument>,
    context: Option<Conversation>,
    state: BatchState,
}

impl<B: GenerativeBackend> BatchSession<B> {
    /// Create an empty session.
    pub fn new(backend: Arc<B>, poll: PollPolicy) -> Self {
        Self {
            backend,
            poll,
            limiter: None,
            default_prompt: DEFAULT_ANALYSIS_PROMPT.to_string(),
            documents: Vec::new(),
            context: None,
            state: BatchState::Empty,
        }
    }

    /// Rate-limit prompts with a shared limiter.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Prompt used when `analyze` gets none.
    pub fn with_default_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.default_prompt = prompt.into();
        self
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Registered documents, in registration order.
    pub fn handles(&self) -> impl Iterator<Item = &DocumentHandle> {
        self.documents.iter().map(|d| &d.handle)
    }

    /// The open conversation, if any.
    pub fn context(&self) -> Option<&Conversation> {
        self.context.as_ref()
    }

    /// Forget all documents and close the conversation.
    pub fn reset(&mut self) {
        self.documents.clear();
        self.context = None;
        self.state = BatchState::Empty;
    }

    /// Register a document read from disk.
    pub fn upload(&mut self, path: &Path, mime_type: &str) -> Result<&DocumentHandle> {
        let bytes = std::fs::read(path)?;
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        self.upload_bytes(&display_name, &bytes, mime_type)
    }

    /// Register a document held in memory.
    pub fn upload_bytes(
        &mut self,
        display_name: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<&DocumentHandle> {
        // A conversation only knows the documents it was seeded with.
        self.context = None;
        self.state = BatchState::Uploading;

        let handle = self
            .backend
            .register_document(bytes, mime_type, display_name)?;
        debug!("Registered {} as {}", display_name, handle.name);

        self.documents.push(TrackedDocument {
            handle,
            state: DocumentState::Pending,
        });

        let index = self.documents.len() - 1;
        Ok(&self.documents[index].handle)
    }

    /// Poll every document until all are ACTIVE.
    ///
    /// Each round queries the documents that are not ready yet, in
    /// registration order. The first FAILED document aborts the batch.
    /// With a timeout, the last poll is taken at the deadline and only a
    /// document still pending then raises [`InvxError::ReadyTimeout`].
    pub fn wait_until_ready(&mut self) -> Result<()> {
        if self.documents.is_empty() {
            return Ok(());
        }

        info!("Waiting for file processing...");
        self.state = BatchState::Waiting;

        let started = Instant::now();
        let mut delay = self.poll.interval;

        loop {
            let mut first_pending: Option<String> = None;
            let mut pending_count = 0;

            for document in self
                .documents
                .iter_mut()
                .filter(|d| d.state != DocumentState::Active)
            {
                let state = self.backend.document_state(&document.handle)?;
                document.state = state;

                if !state.is_terminal() {
                    pending_count += 1;
                    first_pending.get_or_insert_with(|| document.handle.name.clone());
                } else if state == DocumentState::Failed {
                    error!("File {} failed to process", document.handle.name);
                    return Err(InvxError::RemoteProcessing {
                        name: document.handle.name.clone(),
                        state,
                    });
                }
            }

            let Some(first_pending) = first_pending else {
                break;
            };

            let waited = started.elapsed();
            let sleep = match self.poll.timeout {
                Some(timeout) if waited >= timeout => {
                    return Err(InvxError::ReadyTimeout {
                        name: first_pending,
                        waited,
                    });
                }
                Some(timeout) => delay.min(timeout - waited),
                None => delay,
            };

            debug!(
                "{} files still processing, polling again in {:?}",
                pending_count, sleep
            );
            thread::sleep(sleep);
            delay = self.poll.next_delay(delay);
        }

        info!("...all files ready");
        Ok(())
    }

    /// Open the conversation seeded with every registered document.
    pub fn open_context(&mut self) -> Result<&Conversation> {
        if self.documents.is_empty() {
            return Err(InvxError::Precondition(
                "no files have been uploaded yet".to_string(),
            ));
        }

        if let Some(document) = self
            .documents
            .iter()
            .find(|d| d.state != DocumentState::Active)
        {
            return Err(InvxError::Precondition(format!(
                "file {} is not ready ({}); call wait_until_ready first",
                document.handle.name, document.state
            )));
        }

        let handles: Vec<DocumentHandle> = self.handles().cloned().collect();
        let context = self.backend.open_context(&handles);
        self.state = BatchState::Ready;

        Ok(&*self.context.insert(context))
    }

    /// Send an analysis prompt into the open conversation.
    ///
    /// The reply is returned verbatim; `output_structure` is only a request
    /// to the model, not validated.
    pub fn analyze(
        &mut self,
        prompt: Option<&str>,
        output_structure: Option<&str>,
    ) -> Result<String> {
        let Some(context) = self.context.as_mut() else {
            return Err(InvxError::Precondition(
                "conversation not opened; call open_context first".to_string(),
            ));
        };

        let mut prompt = prompt.unwrap_or(&self.default_prompt).to_string();
        if let Some(structure) = output_structure {
            prompt.push_str(STRUCTURE_DIRECTIVE);
            prompt.push_str(structure);
        }

        let contents = context.with_prompt(&prompt);

        if let Some(limiter) = &self.limiter {
            limiter.wait();
        }
        let reply = self
            .backend
            .stream_generate(&contents)
            .and_then(|stream| stream.collect_text())?;
        context.record_exchange(&prompt, &reply);
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBackend;
    use invx_genai::Part;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn fast_poll() -> PollPolicy {
        PollPolicy::fixed(Duration::from_millis(5)).with_timeout(Some(Duration::from_secs(5)))
    }

    fn session(backend: &Arc<ScriptedBackend>) -> BatchSession<ScriptedBackend> {
        BatchSession::new(Arc::clone(backend), fast_poll())
    }

    #[test]
    fn test_full_lifecycle() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_states(
                    "a.pdf",
                    &[DocumentState::Processing, DocumentState::Active],
                )
                .with_reply("{\"summary\": true}"),
        );
        let mut session = session(&backend);
        assert_eq!(session.state(), BatchState::Empty);

        session.upload_bytes("a.pdf", b"%PDF-", "application/pdf").unwrap();
        session.upload_bytes("b.pdf", b"%PDF-", "application/pdf").unwrap();
        assert_eq!(session.state(), BatchState::Uploading);

        session.wait_until_ready().unwrap();
        assert_eq!(session.state(), BatchState::Waiting);
        assert_eq!(
            *backend.state_queries.lock(),
            vec!["a.pdf".to_string(), "b.pdf".to_string(), "a.pdf".to_string()]
        );

        let seed = session.open_context().unwrap().seed().len();
        assert_eq!(seed, 2);
        assert_eq!(session.state(), BatchState::Ready);

        let reply = session.analyze(Some("summarize"), None).unwrap();
        assert_eq!(reply, "{\"summary\": true}");
        assert_eq!(session.state(), BatchState::Ready);
        assert_eq!(session.context().unwrap().history().len(), 3);
    }

    #[test]
    fn test_failed_document_aborts_immediately() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_states(
                    "a.pdf",
                    &[
                        DocumentState::Processing,
                        DocumentState::Processing,
                        DocumentState::Processing,
                        DocumentState::Active,
                    ],
                )
                .with_states("b.pdf", &[DocumentState::Failed]),
        );
        let mut session = session(&backend);
        session.upload_bytes("a.pdf", b"", "application/pdf").unwrap();
        session.upload_bytes("b.pdf", b"", "application/pdf").unwrap();

        let result = session.wait_until_ready();

        assert!(matches!(
            result,
            Err(InvxError::RemoteProcessing {
                state: DocumentState::Failed,
                ..
            })
        ));
        // One round only: a.pdf was still processing when b.pdf failed.
        assert_eq!(backend.state_queries.lock().len(), 2);
    }

    #[test]
    fn test_wait_times_out() {
        let backend = Arc::new(
            ScriptedBackend::new().with_states("stuck.pdf", &[DocumentState::Processing]),
        );
        let mut session = BatchSession::new(
            Arc::clone(&backend),
            PollPolicy::fixed(Duration::from_millis(10)).with_timeout(Some(Duration::from_millis(35))),
        );
        session.upload_bytes("stuck.pdf", b"", "application/pdf").unwrap();

        match session.wait_until_ready() {
            Err(InvxError::ReadyTimeout { name, waited }) => {
                assert_eq!(name, "files/0");
                assert!(waited >= Duration::from_millis(35));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_wait_polls_once_more_at_the_deadline() {
        let backend = Arc::new(ScriptedBackend::new().with_states(
            "late.pdf",
            &[
                DocumentState::Processing,
                DocumentState::Processing,
                DocumentState::Processing,
                DocumentState::Active,
            ],
        ));
        let mut session = BatchSession::new(
            Arc::clone(&backend),
            PollPolicy::fixed(Duration::from_millis(40))
                .with_timeout(Some(Duration::from_millis(100))),
        );
        session.upload_bytes("late.pdf", b"", "application/pdf").unwrap();

        let started = Instant::now();
        session.wait_until_ready().unwrap();

        // Polls at 0, 40 and 80ms, then a shortened sleep to the 100ms deadline.
        assert_eq!(backend.state_queries.lock().len(), 4);
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_pending_is_not_terminal() {
        let backend = Arc::new(ScriptedBackend::new().with_states(
            "a.pdf",
            &[DocumentState::Pending, DocumentState::Processing, DocumentState::Active],
        ));
        let mut session = session(&backend);
        session.upload_bytes("a.pdf", b"", "application/pdf").unwrap();

        session.wait_until_ready().unwrap();
        assert_eq!(backend.state_queries.lock().len(), 3);
    }

    #[test]
    fn test_open_context_requires_documents() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut session = session(&backend);

        assert!(matches!(
            session.open_context(),
            Err(InvxError::Precondition(_))
        ));
    }

    #[test]
    fn test_open_context_requires_ready_documents() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut session = session(&backend);
        session.upload_bytes("a.pdf", b"", "application/pdf").unwrap();

        assert!(matches!(
            session.open_context(),
            Err(InvxError::Precondition(_))
        ));
    }

    #[test]
    fn test_analyze_requires_context() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut session = session(&backend);

        assert!(matches!(
            session.analyze(None, None),
            Err(InvxError::Precondition(_))
        ));
        assert_eq!(backend.request_count(), 0);
    }

    #[test]
    fn test_analyze_prompt_composition() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut session = session(&backend).with_default_prompt("default instructions");
        session.upload_bytes("a.pdf", b"", "application/pdf").unwrap();
        session.wait_until_ready().unwrap();
        session.open_context().unwrap();

        session.analyze(None, None).unwrap();
        assert_eq!(backend.last_prompt_text(), "default instructions");

        session
            .analyze(Some("custom"), Some("{\"請求金額\": \"string\"}"))
            .unwrap();
        assert_eq!(
            backend.last_prompt_text(),
            format!("custom{}{{\"請求金額\": \"string\"}}", STRUCTURE_DIRECTIVE)
        );

        // Second prompt replays the seed turn and the first exchange.
        let requests = backend.requests.lock();
        let last = requests.last().unwrap();
        assert_eq!(last.len(), 4);
        assert!(matches!(last[0].parts[0], Part::FileData { .. }));
    }

    #[test]
    fn test_reset_clears_documents_and_context() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut session = session(&backend);
        session.upload_bytes("a.pdf", b"", "application/pdf").unwrap();
        session.wait_until_ready().unwrap();
        session.open_context().unwrap();

        session.reset();

        assert_eq!(session.state(), BatchState::Empty);
        assert_eq!(session.handles().count(), 0);
        assert!(session.context().is_none());
    }

    #[test]
    fn test_upload_after_context_closes_it() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut session = session(&backend);
        session.upload_bytes("a.pdf", b"", "application/pdf").unwrap();
        session.wait_until_ready().unwrap();
        session.open_context().unwrap();

        session.upload_bytes("b.pdf", b"", "application/pdf").unwrap();

        assert!(session.context().is_none());
        assert!(matches!(
            session.analyze(None, None),
            Err(InvxError::Precondition(_))
        ));
    }

    #[test]
    fn test_service_error_propagates() {
        let backend = Arc::new(ScriptedBackend::new().failing());
        let mut session = session(&backend);
        session.upload_bytes("a.pdf", b"", "application/pdf").unwrap();
        session.wait_until_ready().unwrap();
        session.open_context().unwrap();

        assert!(matches!(
            session.analyze(None, None),
            Err(InvxError::Remote(_))
        ));
        // A failed exchange is not recorded.
        assert_eq!(session.context().unwrap().history().len(), 1);
    }
}
