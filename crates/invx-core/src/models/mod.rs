//! Data models: configuration, canonical schema and records.

pub mod config;
pub mod record;
pub mod schema;

pub use config::InvxConfig;
pub use record::{CanonicalRecord, FieldValue, RawExtraction};
pub use schema::{CanonicalSchema, Column};
