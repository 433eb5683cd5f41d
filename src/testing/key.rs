use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

use crate::types::{GenerateInput, ImageGenerateInput, MeshGenerateInput};
use crate::Result;

const DIGEST_LEN: usize = 12;

/// Requests that can be looked up in a fixture table.
pub trait FixtureInput: Serialize {
    fn provider(&self) -> &str;
    fn model(&self) -> &str;
}

impl FixtureInput for GenerateInput {
    fn provider(&self) -> &str {
        &self.provider
    }
    fn model(&self) -> &str {
        &self.model
    }
}

impl FixtureInput for ImageGenerateInput {
    fn provider(&self) -> &str {
        &self.provider
    }
    fn model(&self) -> &str {
        &self.model
    }
}

impl FixtureInput for MeshGenerateInput {
    fn provider(&self) -> &str {
        &self.provider
    }
    fn model(&self) -> &str {
        &self.model
    }
}

/// Operation type plus the serialized request, as seen by key functions.
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureKeyInput {
    /// `generate`, `stream`, `image` or `mesh`.
    pub kind: String,
    pub provider: String,
    pub model: String,
    pub input: Value,
}

impl FixtureKeyInput {
    pub fn new<I: FixtureInput>(kind: &str, input: &I) -> Result<Self> {
        Ok(Self {
            kind: kind.to_string(),
            provider: input.provider().to_string(),
            model: input.model().to_string(),
            input: serde_json::to_value(input)?,
        })
    }
}

/// Rebuilds every object with its keys in sorted order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for k in keys {
                sorted.insert(k.clone(), canonicalize(&map[k]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Compact JSON with non-ASCII characters escaped as `\uXXXX`.
fn ascii_json(value: &Value) -> String {
    let raw = value.to_string();
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                let _ = write!(out, "\\u{:04x}", unit);
            }
        }
    }
    out
}

/// Default fixture key: `"{type}:{provider}:{model}:{digest}"`, where the
/// digest is the first 12 hex chars of SHA-256 over the sorted-key compact
/// JSON of `{type, provider, model, input}`.
pub fn fixture_key(key: &FixtureKeyInput) -> String {
    let payload = canonicalize(&serde_json::json!({
        "type": key.kind,
        "provider": key.provider,
        "model": key.model,
        "input": key.input,
    }));
    let hash = format!("{:x}", Sha256::digest(ascii_json(&payload).as_bytes()));
    format!(
        "{}:{}:{}:{}",
        key.kind,
        key.provider,
        key.model,
        &hash[..DIGEST_LEN]
    )
}
