//! Property access into opaque entity values.
//!
//! Entities cross the collaborator boundary as JSON objects; metadata
//! property paths are dot-separated keys into them. Ids may be stored as
//! strings or numbers and are normalized to strings.

use serde_json::Value;

use crate::registry::ResourceMetadata;

/// Resolves a dot-separated property path.
pub fn get_path<'a>(entity: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = entity;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Reads a property as a string, accepting string and number storage.
pub fn string_at(entity: &Value, path: &str) -> Option<String> {
    match get_path(entity, path)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// The entity's id, through the type's id property path.
pub fn id_of(entity: &Value, meta: &ResourceMetadata) -> Option<String> {
    string_at(entity, &meta.id_property_path)
}
