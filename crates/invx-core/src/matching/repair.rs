//! Cleanup of free-text model output that should be JSON.

/// Strip surrounding whitespace and a Markdown code fence, if present.
///
/// Handles ```` ```json ```` and bare ```` ``` ```` openers, and a missing
/// closing fence (truncated responses).
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```json") {
        text = rest.trim();
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest.trim();
    }

    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim();
    }

    text
}
