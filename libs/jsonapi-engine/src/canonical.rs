//! Canonical JSON used for entity-tag hashing.
//!
//! Canonical form: every object's keys sorted lexicographically at every
//! depth, compact separators, numbers and strings exactly as serde_json
//! prints them. Parsing the canonical bytes and re-canonicalizing
//! reproduces them byte for byte, which is what makes the derived ETags
//! stable across processes.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Serializes `value` in canonical form.
pub fn canonical_json(value: &Value) -> String {
    serde_json::to_string(&canonicalize(value)).unwrap_or_default()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// SHA-256 over the canonical bytes, truncated to 16 bytes of hex.
pub fn content_hash(value: &Value) -> String {
    let canonical = canonical_json(value);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}
