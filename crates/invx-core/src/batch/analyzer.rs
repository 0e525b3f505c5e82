//! One-shot batch analysis: upload, wait, open, analyze.

use std::path::Path;
use std::sync::Arc;

use invx_genai::GenerativeBackend;
use serde::Deserialize;
use tracing::info;

use super::poll::PollPolicy;
use super::session::BatchSession;
use super::DEFAULT_ANALYSIS_PROMPT;
use crate::error::Result;
use crate::limiter::RateLimiter;
use crate::pdf::PDF_MIME_TYPE;

/// Per-call analysis settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisOptions {
    /// Replaces the default analysis prompt.
    pub prompt: Option<String>,
    /// Output structure the model is asked to follow.
    pub output_structure: Option<String>,
}

/// A document received in memory, e.g. from an HTTP upload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Creates a fresh [`BatchSession`] for every batch it runs.
pub struct BatchAnalyzer<B: GenerativeBackend> {
    backend: Arc<B>,
    poll: PollPolicy,
    limiter: Option<Arc<RateLimiter>>,
    mime_type: String,
    default_prompt: String,
}

impl<B: GenerativeBackend> BatchAnalyzer<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            poll: PollPolicy::default(),
            limiter: None,
            mime_type: PDF_MIME_TYPE.to_string(),
            default_prompt: DEFAULT_ANALYSIS_PROMPT.to_string(),
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn with_default_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.default_prompt = prompt.into();
        self
    }

    /// A new, empty session with this analyzer's settings.
    pub fn session(&self) -> BatchSession<B> {
        let session = BatchSession::new(Arc::clone(&self.backend), self.poll.clone())
            .with_default_prompt(self.default_prompt.clone());

        match &self.limiter {
            Some(limiter) => session.with_rate_limiter(Arc::clone(limiter)),
            None => session,
        }
    }

    /// Analyze documents on disk as one batch.
    pub fn process_documents<P: AsRef<Path>>(
        &self,
        paths: &[P],
        options: &AnalysisOptions,
    ) -> Result<String> {
        info!("Analyzing batch of {} documents", paths.len());

        let mut session = self.session();
        for path in paths {
            session.upload(path.as_ref(), &self.mime_type)?;
        }

        Self::finish(session, options)
    }

    /// Analyze in-memory documents as one batch.
    pub fn process_uploads(
        &self,
        uploads: &[UploadedFile],
        options: &AnalysisOptions,
    ) -> Result<String> {
        info!("Analyzing batch of {} uploads", uploads.len());

        let mut session = self.session();
        for upload in uploads {
            session.upload_bytes(&upload.name, &upload.bytes, &self.mime_type)?;
        }

        Self::finish(session, options)
    }

    fn finish(mut session: BatchSession<B>, options: &AnalysisOptions) -> Result<String> {
        session.wait_until_ready()?;
        session.open_context()?;
        session.analyze(options.prompt.as_deref(), options.output_structure.as_deref())
    }
}
