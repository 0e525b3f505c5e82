//! Schema matching: consolidating per-page output into canonical records.

mod matcher;
mod repair;

pub use matcher::{SchemaMatcher, MAX_RAW_LENGTH, TRUNCATION_MARKER};
pub use repair::strip_code_fence;
