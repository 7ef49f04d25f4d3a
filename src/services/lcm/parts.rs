//! Stored message parts
//!
//! Messages persist their parts as a JSON array of
//! `{"type": "...", "data": {...}}` objects. Only text parts are read here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One stored message part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl StoredPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            data: serde_json::json!({ "text": text.into() }),
        }
    }
}

/// Encode text parts into the stored JSON form.
pub fn encode_text_parts(texts: &[&str]) -> String {
    let parts: Vec<StoredPart> = texts.iter().map(|t| StoredPart::text(*t)).collect();
    serde_json::to_string(&parts).unwrap_or_else(|_| "[]".to_string())
}

/// Text of all text parts, joined with a single space.
///
/// Malformed JSON yields an empty string.
pub fn extract_text_from_parts(parts_json: &str) -> String {
    let parts: Vec<Value> = match serde_json::from_str(parts_json) {
        Ok(parts) => parts,
        Err(_) => return String::new(),
    };

    parts
        .iter()
        .filter(|p| p.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|p| {
            p.get("data")
                .and_then(|d| d.get("text"))
                .or_else(|| p.get("text"))
                .and_then(Value::as_str)
        })
        .collect::<Vec<_>>()
        .join(" ")
}
