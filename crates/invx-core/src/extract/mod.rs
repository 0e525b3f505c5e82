//! Per-document extraction into unstructured per-page JSON.

mod document;

pub use document::{DocumentExtractor, ExtractedDocument};

/// Instruction sent with every document.
pub const EXTRACTION_PROMPT: &str = "Extract all structured invoice data from each page.
Output the results as a JSON array, where each element represents one page.
Do not include any explanations; output only valid JSON.
The output must be in Japanese and monetary values should include their units.";
