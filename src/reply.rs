//! Strict validation of the model's edit reply.
//!
//! The model is asked for `{"edits": [...]}`; a bare array, a legacy
//! `suggestions` key and a surrounding Markdown code fence are also accepted.
//! Anything that does not fit the schema is a [`ParseError`], which the
//! generator answers with exactly one stricter re-ask.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// One edit as proposed by the model, before it is checked against the chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEdit {
    pub paragraph_index: usize,
    pub original: Option<String>,
    pub suggested: String,
    pub reason: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ParseError {
    pub reason: String,
}

impl ParseError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Deserialize)]
struct RawEdit {
    #[serde(alias = "paragraph_number")]
    paragraph_index: usize,
    #[serde(default)]
    original: Option<String>,
    #[serde(default, alias = "suggested_text")]
    suggested: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    has_suggestion: Option<bool>,
}

pub fn parse_reply(raw: &str) -> Result<Vec<ModelEdit>, ParseError> {
    let body = strip_code_fence(raw.trim());
    if body.is_empty() {
        return Err(ParseError::new("empty reply"));
    }

    let value: Value =
        serde_json::from_str(body).map_err(|e| ParseError::new(format!("not JSON: {}", e)))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("edits").or_else(|| map.remove("suggestions")) {
            Some(Value::Array(items)) => items,
            Some(_) => return Err(ParseError::new("`edits` is not an array")),
            None => return Err(ParseError::new("object has no `edits` array")),
        },
        _ => return Err(ParseError::new("reply is neither an array nor an object")),
    };

    let mut edits = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let raw: RawEdit = serde_json::from_value(item)
            .map_err(|e| ParseError::new(format!("edit {}: {}", i, e)))?;
        if raw.has_suggestion == Some(false) {
            continue;
        }
        let suggested = match raw.suggested {
            Some(s) if !s.trim().is_empty() => s,
            _ => return Err(ParseError::new(format!("edit {}: missing `suggested`", i))),
        };
        edits.push(ModelEdit {
            paragraph_index: raw.paragraph_index,
            original: raw.original,
            suggested,
            reason: raw.reason.filter(|r| !r.trim().is_empty()),
            category: raw.category,
        });
    }
    Ok(edits)
}

/// Removes a ```` ```json ... ``` ```` wrapper if the whole reply is fenced.
fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
