//! Structured-output parsing and repair feedback.
//!
//! Models wrap JSON in prose or markdown fences more often than not. The
//! extractor accepts, in order: the whole text as JSON, the body of the first
//! fenced block, and the span from the first `{`/`[` to the last matching
//! closer.

use serde_json::Value;

use crate::types::OutputSchema;
use crate::{KilnError, Result};

/// Strip a surrounding markdown code fence, if present.
///
/// Returns the body of the first fenced block, or the trimmed input when
/// there is no fence.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after_open = &trimmed[start + 3..];
    let close = after_open.find("```");
    match after_open.find('\n') {
        // Skip the info string (e.g. `json`, `dockerfile`).
        Some(newline) if close.is_none_or(|end| newline < end) => {
            let body = &after_open[newline + 1..];
            match body.find("```") {
                Some(end) => body[..end].trim(),
                None => body.trim(),
            }
        }
        // Single-line fence: no info string to skip.
        _ => match close {
            Some(end) => after_open[..end].trim(),
            None => after_open.trim(),
        },
    }
}

/// Parse a JSON payload out of sampler text.
pub fn extract_json(text: &str) -> Result<Value> {
    let first_err = match serde_json::from_str::<Value>(text.trim()) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let fenced = strip_code_fence(text);
    if let Ok(value) = serde_json::from_str::<Value>(fenced) {
        return Ok(value);
    }

    if let Some(span) = bracket_span(fenced)
        && let Ok(value) = serde_json::from_str::<Value>(span)
    {
        return Ok(value);
    }

    Err(KilnError::ParseFailed(first_err.to_string()))
}

/// Slice from the first opening bracket to the last matching closer.
fn bracket_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let closer = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(closer)?;
    (end > start).then(|| &text[start..=end])
}

/// Build the instruction folded into the next sampler call after a
/// structured failure.
pub fn repair_feedback(error: &KilnError, schema: &OutputSchema) -> String {
    let reason = match error {
        KilnError::SchemaValidationFailed(errors) => errors.join("; "),
        other => other.to_string(),
    };
    format!(
        "The previous output was invalid because: {reason}. \
         Return only valid JSON matching the schema '{}' with no surrounding text:\n{}",
        schema.id, schema.definition
    )
}
