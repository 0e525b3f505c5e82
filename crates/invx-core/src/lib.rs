//! Core library for invoice extraction and schema normalization.
//!
//! This crate provides:
//! - Rate-limited per-document extraction into per-page JSON
//! - Schema matching onto a fixed canonical column table
//! - Multi-document batch analysis over a seeded conversation
//! - Canonical schema, record and configuration models
//!
//! The remote service itself sits behind [`invx_genai::GenerativeBackend`].

pub mod batch;
pub mod error;
pub mod extract;
pub mod limiter;
pub mod matching;
pub mod models;
pub mod pdf;
pub mod pipeline;

#[cfg(test)]
mod testing;

pub use batch::{
    AnalysisOptions, Backoff, BatchAnalyzer, BatchSession, BatchState, PollPolicy, UploadedFile,
};
pub use error::{InvxError, Result};
pub use extract::{DocumentExtractor, ExtractedDocument};
pub use limiter::RateLimiter;
pub use matching::{strip_code_fence, SchemaMatcher};
pub use models::{CanonicalRecord, CanonicalSchema, Column, FieldValue, InvxConfig, RawExtraction};
pub use pdf::PdfInfo;
pub use pipeline::{DocumentOutcome, HealthStatus, InvoicePipeline, MatchMode, ProcessedDocument};

/// Re-export of the remote service layer.
pub use invx_genai;
