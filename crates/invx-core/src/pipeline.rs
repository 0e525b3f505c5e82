//! Caller-facing pipeline wiring every component to one backend and limiter.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use invx_genai::GenerativeBackend;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::batch::{AnalysisOptions, BatchAnalyzer, UploadedFile};
use crate::error::{InvxError, Result};
use crate::extract::{DocumentExtractor, ExtractedDocument};
use crate::limiter::RateLimiter;
use crate::matching::SchemaMatcher;
use crate::models::config::InvxConfig;
use crate::models::record::{CanonicalRecord, RawExtraction};
use crate::models::schema::CanonicalSchema;

/// How per-page extraction output becomes a canonical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// A second remote call re-projects the pages onto the schema.
    #[default]
    Remote,
    /// Pages are folded locally; only works when they already use schema names or keys.
    LocalFold,
}

/// One document's extraction and its canonical record.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedDocument {
    pub extracted: ExtractedDocument,
    pub record: CanonicalRecord,
}

/// Result for one input of [`InvoicePipeline::extract_records`].
#[derive(Debug)]
pub struct DocumentOutcome {
    pub path: PathBuf,
    pub result: Result<ProcessedDocument>,
}

impl DocumentOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Liveness report; building it touches nothing remote.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthStatus {
    pub status: &'static str,
    pub model: String,
}

/// Extraction and analysis pipeline over one backend.
///
/// Every component created by the pipeline shares the same [`RateLimiter`].
pub struct InvoicePipeline<B: GenerativeBackend> {
    backend: Arc<B>,
    limiter: Arc<RateLimiter>,
    schema: Arc<CanonicalSchema>,
    config: InvxConfig,
}

#[cfg(feature = "gemini")]
impl InvoicePipeline<invx_genai::GeminiBackend> {
    /// Build a Gemini-backed pipeline.
    ///
    /// Credentials and the model id are resolved here, so a missing key
    /// fails before any document is touched.
    pub fn from_config(config: InvxConfig) -> Result<Self> {
        use invx_genai::{GeminiBackend, GeminiSettings, GenerationConfig};

        let service = &config.service;
        let api_key = service.resolve_api_key()?;
        let model = service.resolve_model()?;

        let mut settings = GeminiSettings::new(api_key, model);
        settings.base_url = service.base_url.clone();
        settings.request_timeout = std::time::Duration::from_secs(service.request_timeout_secs);
        settings.generation = GenerationConfig {
            temperature: service.temperature,
            top_p: service.top_p,
            top_k: service.top_k,
            max_output_tokens: service.max_output_tokens,
            response_mime_type: Some(service.response_mime_type.clone())
                .filter(|mime| !mime.is_empty()),
        };

        let backend =
            GeminiBackend::new(settings).map_err(|e| InvxError::Config(e.to_string()))?;
        Self::new(Arc::new(backend), config)
    }
}

impl<B: GenerativeBackend> InvoicePipeline<B> {
    /// Build a pipeline over an existing backend.
    pub fn new(backend: Arc<B>, config: InvxConfig) -> Result<Self> {
        let schema = config.matching.load_schema()?;
        let limiter = RateLimiter::new(config.rate_limit.min_interval());

        info!(
            "Pipeline ready: model {}, {} columns, {:?} between calls",
            backend.model_name(),
            schema.len(),
            limiter.min_interval()
        );

        Ok(Self {
            backend,
            limiter: Arc::new(limiter),
            schema: Arc::new(schema),
            config,
        })
    }

    pub fn config(&self) -> &InvxConfig {
        &self.config
    }

    pub fn schema(&self) -> &CanonicalSchema {
        &self.schema
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn extractor(&self) -> DocumentExtractor<B> {
        DocumentExtractor::new(Arc::clone(&self.backend), Arc::clone(&self.limiter))
            .with_mime_type(self.config.batch.mime_type.clone())
    }

    pub fn matcher(&self) -> SchemaMatcher<B> {
        SchemaMatcher::new(Arc::clone(&self.backend), Arc::clone(&self.schema))
            .with_max_raw_length(self.config.matching.max_raw_length)
            .with_truncation_marker(self.config.matching.truncation_marker.clone())
            .with_rate_limiter(Arc::clone(&self.limiter))
    }

    pub fn analyzer(&self) -> BatchAnalyzer<B> {
        BatchAnalyzer::new(Arc::clone(&self.backend))
            .with_poll_policy(self.config.polling.to_policy())
            .with_rate_limiter(Arc::clone(&self.limiter))
            .with_mime_type(self.config.batch.mime_type.clone())
            .with_default_prompt(self.config.batch.default_prompt.clone())
    }

    /// Analyze documents on disk as one batch with the default prompt.
    pub fn process_documents<P: AsRef<Path>>(&self, paths: &[P]) -> Result<String> {
        self.analyzer()
            .process_documents(paths, &AnalysisOptions::default())
    }

    /// Analyze in-memory documents as one batch.
    pub fn process_uploads(
        &self,
        uploads: &[UploadedFile],
        options: &AnalysisOptions,
    ) -> Result<String> {
        self.analyzer().process_uploads(uploads, options)
    }

    /// Extract one document and turn it into a canonical record.
    pub fn extract_record(&self, path: &Path, mode: MatchMode) -> Result<ProcessedDocument> {
        let extracted = self.extractor().extract(path)?;
        let record = self.to_record(&extracted, mode)?;
        Ok(ProcessedDocument { extracted, record })
    }

    /// Extract documents independently on `workers` threads.
    ///
    /// All workers share the pipeline's rate limiter. Outcomes are returned
    /// in input order and one failing document does not affect the others.
    ///
    /// With `fail_fast`, documents not yet started when a failure is seen
    /// are skipped without any remote call and left out of the outcomes.
    pub fn extract_records<P>(
        &self,
        paths: &[P],
        workers: usize,
        mode: MatchMode,
        fail_fast: bool,
    ) -> Result<Vec<DocumentOutcome>>
    where
        P: AsRef<Path> + Sync,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .build()
            .map_err(|e| InvxError::Config(format!("cannot start worker pool: {}", e)))?;

        let failed = AtomicBool::new(false);
        let outcomes = pool.install(|| {
            paths
                .par_iter()
                .filter_map(|path| {
                    let path = path.as_ref();
                    if fail_fast && failed.load(Ordering::Acquire) {
                        debug!("Skipping {} after an earlier failure", path.display());
                        return None;
                    }

                    let result = self.extract_record(path, mode);
                    if let Err(e) = &result {
                        warn!("Failed to process {}: {}", path.display(), e);
                        failed.store(true, Ordering::Release);
                    }
                    Some(DocumentOutcome {
                        path: path.to_path_buf(),
                        result,
                    })
                })
                .collect()
        });

        Ok(outcomes)
    }

    /// Liveness check.
    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy",
            model: self.backend.model_name().to_string(),
        }
    }

    fn to_record(&self, extracted: &ExtractedDocument, mode: MatchMode) -> Result<CanonicalRecord> {
        match mode {
            MatchMode::Remote => self.matcher().match_record(&extracted.raw_text),
            MatchMode::LocalFold => {
                if extracted.raw_text.trim().is_empty() {
                    return Ok(CanonicalRecord::empty(&self.schema));
                }
                let pages = RawExtraction::parse(&extracted.raw_text)?;
                Ok(CanonicalRecord::fold_pages(&self.schema, pages.pages()))
            }
        }
    }
}
