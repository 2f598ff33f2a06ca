//! Items and the dataset loader
//!
//! Datasets are CSV with a header row, one event per record. Files named
//! `.jsonl` or `.ndjson` are read as JSON Lines instead, one object per
//! line. Each row becomes an [`Item`] whose key is the configured id field
//! when present, or the BLAKE3 digest of the row's canonical JSON otherwise.

use crate::common::{blake3_hash, Error, Payload, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk dataset encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    Csv,
    JsonLines,
}

impl DatasetFormat {
    /// Pick by extension; anything not JSON Lines is read as CSV
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("jsonl") || ext.eq_ignore_ascii_case("ndjson") => {
                DatasetFormat::JsonLines
            }
            _ => DatasetFormat::Csv,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub key: String,
    pub payload: Payload,
}

impl Item {
    /// Build an item from a row, keyed by `key_field` or by content digest
    pub fn from_row(payload: Payload, key_field: &str) -> Self {
        let key = match payload.get(key_field) {
            Some(id) => id.clone(),
            None => content_key(&payload),
        };
        Self { key, payload }
    }
}

/// Deterministic key for a row without an id: identical content, identical key
pub fn content_key(payload: &Payload) -> String {
    // BTreeMap serializes in key order, so the encoding is canonical.
    let canonical = serde_json::to_vec(payload).unwrap_or_default();
    blake3_hash(&canonical)
}

/// Parse CSV (header row first) into items
pub fn parse_items(text: &str, key_field: &str) -> Result<Vec<Item>> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let mut items = Vec::new();
    for row in reader.deserialize::<Payload>() {
        let row = row.map_err(|e| Error::Dataset {
            line: e.position().map(|pos| pos.line() as usize).unwrap_or(1),
            reason: e.to_string(),
        })?;
        items.push(Item::from_row(row, key_field));
    }
    Ok(items)
}

/// Parse JSON Lines into items
pub fn parse_json_lines(text: &str, key_field: &str) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let row = parse_row(line).map_err(|reason| Error::Dataset {
            line: idx + 1,
            reason,
        })?;
        items.push(Item::from_row(row, key_field));
    }
    Ok(items)
}

/// Read a dataset from disk, choosing the format by file extension
pub async fn load_items(path: impl AsRef<Path>, key_field: &str) -> Result<Vec<Item>> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path).await?;
    let items = match DatasetFormat::from_path(path) {
        DatasetFormat::Csv => parse_items(&text, key_field)?,
        DatasetFormat::JsonLines => parse_json_lines(&text, key_field)?,
    };
    tracing::info!("Loaded {} items from {}", items.len(), path.display());
    Ok(items)
}

fn parse_row(line: &str) -> std::result::Result<Payload, String> {
    let value: serde_json::Value = serde_json::from_str(line).map_err(|e| e.to_string())?;
    let object = match value {
        serde_json::Value::Object(object) => object,
        other => return Err(format!("expected an object, got {}", other)),
    };

    Ok(object
        .into_iter()
        .map(|(field, value)| {
            let text = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (field, text)
        })
        .collect())
}
