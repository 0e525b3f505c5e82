//! Re-projection of per-page extraction output onto the canonical schema.

use std::borrow::Cow;
use std::sync::Arc;

use invx_genai::{Content, GenerativeBackend, Part};
use tracing::{debug, info, warn};

use super::repair::strip_code_fence;
use crate::error::Result;
use crate::extract::ExtractedDocument;
use crate::limiter::RateLimiter;
use crate::models::record::CanonicalRecord;
use crate::models::schema::CanonicalSchema;

/// Default ceiling on raw input length, in characters.
pub const MAX_RAW_LENGTH: usize = 1_000_000;

/// Appended to raw input cut at the ceiling.
pub const TRUNCATION_MARKER: &str = "\n...[truncated]";

/// Asks the service to consolidate per-page values into one record.
pub struct SchemaMatcher<B: GenerativeBackend> {
    backend: Arc<B>,
    schema: Arc<CanonicalSchema>,
    max_raw_length: usize,
    truncation_marker: String,
    limiter: Option<Arc<RateLimiter>>,
}

impl<B: GenerativeBackend> SchemaMatcher<B> {
    /// Create a matcher for `schema` with the default size ceiling.
    pub fn new(backend: Arc<B>, schema: Arc<CanonicalSchema>) -> Self {
        Self {
            backend,
            schema,
            max_raw_length: MAX_RAW_LENGTH,
            truncation_marker: TRUNCATION_MARKER.to_string(),
            limiter: None,
        }
    }

    /// Set the raw input ceiling, in characters.
    pub fn with_max_raw_length(mut self, max_raw_length: usize) -> Self {
        self.max_raw_length = max_raw_length;
        self
    }

    /// Set the marker appended to truncated input.
    pub fn with_truncation_marker(mut self, marker: impl Into<String>) -> Self {
        self.truncation_marker = marker.into();
        self
    }

    /// Share a rate limiter with other callers of the service.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Schema records are matched against.
    pub fn schema(&self) -> &CanonicalSchema {
        &self.schema
    }

    /// Match raw per-page JSON and return the cleaned model output.
    ///
    /// Empty input yields the all-null record without a remote call. The
    /// output is fence-free and non-empty but not validated as JSON; use
    /// [`SchemaMatcher::match_record`] for a parsed, checked record.
    pub fn match_columns(&self, raw_json: &str) -> Result<String> {
        if raw_json.trim().is_empty() {
            debug!("Empty extraction input, returning null record");
            return Ok(self.null_record_text());
        }

        let raw = self.truncate(raw_json);
        let prompt = self.build_prompt(&raw);
        let contents = [Content::user(vec![Part::text(prompt)])];

        if let Some(limiter) = &self.limiter {
            limiter.wait();
        }
        let response = self.backend.stream_generate(&contents)?.collect_text()?;

        let cleaned = strip_code_fence(&response);
        if cleaned.is_empty() {
            warn!("Schema matching returned no content, using null record");
            return Ok(self.null_record_text());
        }

        Ok(cleaned.to_string())
    }

    /// Match raw per-page JSON into a parsed record.
    ///
    /// Fails with `MalformedResponse` when the model output is not a JSON object.
    pub fn match_record(&self, raw_json: &str) -> Result<CanonicalRecord> {
        let text = self.match_columns(raw_json)?;
        CanonicalRecord::from_json_text(&self.schema, &text)
    }

    /// Match several extracted documents as one aggregated input.
    pub fn match_documents(&self, documents: &[ExtractedDocument]) -> Result<String> {
        self.match_columns(&aggregate_raw(documents))
    }

    fn null_record_text(&self) -> String {
        CanonicalRecord::empty(&self.schema).to_json().to_string()
    }

    fn truncate<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        match raw.char_indices().nth(self.max_raw_length) {
            Some((cut, _)) => {
                info!(
                    "Raw input exceeds {} characters, truncating",
                    self.max_raw_length
                );
                Cow::Owned(format!("{}{}", &raw[..cut], self.truncation_marker))
            }
            None => Cow::Borrowed(raw),
        }
    }

    fn build_prompt(&self, raw: &str) -> String {
        let instructions = self
            .schema
            .names()
            .map(|name| format!("- \"{}\": {}", name, self.schema.instruction_for(name)))
            .collect::<Vec<_>>()
            .join("\n");

        let keys = self
            .schema
            .names()
            .map(|name| format!("\"{}\"", name))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "The following is structured JSON data extracted from a PDF file. It is a JSON array where each element represents the data extracted from one page of the document.

Please extract data for the desired columns according to the following instructions.
Important: Make sure to include data from every page (for example, one full year of data from December to November) without omitting any values.

For each desired column, follow these instructions:
{instructions}

For each desired column:
- If the value is identical across all pages, output that single value.
- If the value differs among pages, output an array of all unique values in the order they first appear.
- If a column is not found in any page, output null for that column.

Output only a pure JSON object with exactly the following keys:
{keys}.

Structured JSON Data (may be truncated):
{raw}"
        )
    }
}

/// Combine several documents' raw output into one JSON array of per-document arrays.
fn aggregate_raw(documents: &[ExtractedDocument]) -> String {
    let parts: Vec<&str> = documents
        .iter()
        .map(|doc| strip_code_fence(&doc.raw_text))
        .filter(|raw| !raw.is_empty())
        .collect();

    match parts.as_slice() {
        [] => String::new(),
        [single] => (*single).to_string(),
        many => format!("[{}]", many.join(",\n")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvxError;
    use crate::models::record::FieldValue;
    use crate::models::schema::Column;
    use crate::testing::ScriptedBackend;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn matcher(backend: &Arc<ScriptedBackend>) -> SchemaMatcher<ScriptedBackend> {
        SchemaMatcher::new(
            Arc::clone(backend),
            Arc::new(CanonicalSchema::electricity_invoice()),
        )
    }

    fn document(raw: &str) -> ExtractedDocument {
        ExtractedDocument {
            filename: "doc".to_string(),
            raw_text: raw.to_string(),
            page_count: None,
            extracted_at: Utc::now(),
        }
    }

    fn assert_null_record(text: &str) {
        let schema = CanonicalSchema::electricity_invoice();
        let value: Value = serde_json::from_str(text).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(
            object.keys().map(String::as_str).collect::<Vec<_>>(),
            schema.names().collect::<Vec<_>>()
        );
        assert!(object.values().all(Value::is_null));
    }

    #[test]
    fn test_empty_input_skips_remote_call() {
        let backend = Arc::new(ScriptedBackend::new());
        let matcher = matcher(&backend);

        assert_null_record(&matcher.match_columns("").unwrap());
        assert_null_record(&matcher.match_columns("  \n\t ").unwrap());
        assert_eq!(backend.request_count(), 0);
    }

    #[test]
    fn test_fence_stripping_is_idempotent() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_reply("```json {\"a\":1} ```")
                .with_reply("```json {\"a\":1} ```")
                .with_reply("```json {\"a\":1} ```"),
        );
        let matcher = matcher(&backend);

        for _ in 0..3 {
            assert_eq!(matcher.match_columns("[{\"x\": 1}]").unwrap(), "{\"a\":1}");
        }
        assert_eq!(backend.request_count(), 3);
    }

    #[test]
    fn test_empty_response_falls_back_to_null_record() {
        let backend = Arc::new(ScriptedBackend::new().with_chunks(&["```json", "\n```"]));
        let matcher = matcher(&backend);

        assert_null_record(&matcher.match_columns("[{}]").unwrap());
    }

    #[test]
    fn test_oversized_input_is_truncated() {
        let backend = Arc::new(ScriptedBackend::new());
        let matcher = matcher(&backend);

        let raw = "あ".repeat(MAX_RAW_LENGTH + 5);
        matcher.match_columns(&raw).unwrap();

        let prompt = backend.last_prompt_text();
        let expected_tail = format!("{}{}", "あ".repeat(MAX_RAW_LENGTH), TRUNCATION_MARKER);
        assert!(prompt.ends_with(&expected_tail));

        let before = &prompt[..prompt.len() - expected_tail.len()];
        assert!(before.ends_with("(may be truncated):\n"));
    }

    #[test]
    fn test_input_at_ceiling_is_not_truncated() {
        let backend = Arc::new(ScriptedBackend::new());
        let matcher = matcher(&backend).with_max_raw_length(10);

        matcher.match_columns("0123456789").unwrap();
        let prompt = backend.last_prompt_text();
        assert!(prompt.ends_with("0123456789"));
        assert!(!prompt.contains(TRUNCATION_MARKER));
    }

    #[test]
    fn test_prompt_lists_every_column_in_order() {
        let backend = Arc::new(ScriptedBackend::new());
        let schema = CanonicalSchema::new(vec![
            Column {
                name: "請求金額".to_string(),
                key: "billing_amount".to_string(),
                instruction: Some("Include the currency unit.".to_string()),
            },
            Column {
                name: "備考".to_string(),
                key: "remarks".to_string(),
                instruction: None,
            },
        ])
        .unwrap();
        let matcher = SchemaMatcher::new(Arc::clone(&backend), Arc::new(schema));

        matcher.match_columns("[{\"合計\": \"100円\"}]").unwrap();
        let prompt = backend.last_prompt_text();

        assert!(prompt.contains("- \"請求金額\": Include the currency unit."));
        assert!(prompt.contains("- \"備考\": No instruction provided."));
        assert!(prompt.contains("exactly the following keys:\n\"請求金額\", \"備考\"."));
        assert!(prompt.contains(
            "- If the value is identical across all pages, output that single value."
        ));
        assert!(prompt.contains(
            "- If the value differs among pages, output an array of all unique values in the order they first appear."
        ));
        assert!(prompt.contains(
            "- If a column is not found in any page, output null for that column."
        ));
        assert!(prompt.ends_with("[{\"合計\": \"100円\"}]"));
    }

    #[test]
    fn test_match_record_parses_output() {
        let backend = Arc::new(
            ScriptedBackend::new().with_reply("```json\n{\"請求金額\": [\"100円\", \"150円\"]}\n```"),
        );
        let matcher = matcher(&backend);

        let record = matcher.match_record("[{}, {}]").unwrap();
        assert_eq!(record.len(), 28);
        assert_eq!(
            record.get("請求金額"),
            Some(&FieldValue::Many(vec![json!("100円"), json!("150円")]))
        );
        assert_eq!(record.get("備考"), Some(&FieldValue::Null));
    }

    #[test]
    fn test_match_record_surfaces_malformed_output() {
        let backend = Arc::new(ScriptedBackend::new().with_reply("{\"請求金額\": \"100円\""));
        let matcher = matcher(&backend);

        assert!(matches!(
            matcher.match_record("[{}]"),
            Err(InvxError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_match_columns_passes_malformed_output_through() {
        let backend = Arc::new(ScriptedBackend::new().with_reply("{\"請求金額\": \"100円\""));
        let matcher = matcher(&backend);

        assert_eq!(matcher.match_columns("[{}]").unwrap(), "{\"請求金額\": \"100円\"");
    }

    #[test]
    fn test_service_failure_propagates() {
        let backend = Arc::new(ScriptedBackend::new().failing());
        let matcher = matcher(&backend);

        assert!(matches!(
            matcher.match_columns("[{}]"),
            Err(InvxError::Remote(_))
        ));
    }

    #[test]
    fn test_aggregate_raw() {
        assert_eq!(aggregate_raw(&[]), "");
        assert_eq!(aggregate_raw(&[document("[{\"a\":1}]")]), "[{\"a\":1}]");
        assert_eq!(
            aggregate_raw(&[document("```json\n[{\"a\":1}]\n```"), document(""), document("[{\"b\":2}]")]),
            "[[{\"a\":1}],\n[{\"b\":2}]]"
        );
    }
}
