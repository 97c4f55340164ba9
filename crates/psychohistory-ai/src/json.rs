//! Strict-JSON extraction from model output.
//!
//! Models asked for raw JSON still wrap it in markdown fences or prose often
//! enough that every caller goes through this helper.

use anyhow::{anyhow, Result};
use serde_json::Value;

/// Parse `text` as JSON, tolerating a fenced ```json block or surrounding
/// prose. Fails if nothing inside parses.
pub fn extract_json(text: &str) -> Result<Value> {
    let trimmed = text.trim();

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    if let Some(inner) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str(inner.trim()) {
            return Ok(value);
        }
    }

    for (open, close) in [('[', ']'), ('{', '}')] {
        if let Some(slice) = delimited_slice(trimmed, open, close) {
            if let Ok(value) = serde_json::from_str(slice) {
                return Ok(value);
            }
        }
    }

    Err(anyhow!("no parseable JSON in model output: {trimmed:.120}"))
}

/// Contents of the first ``` fence, with an optional language tag.
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

/// Widest `open`..`close` slice of the text.
fn delimited_slice(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}
