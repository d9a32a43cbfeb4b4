//! Surrogate-key computation for CDN/reverse-proxy invalidation.
//!
//! A response's key list is the primary type-level key followed by one
//! `TYPE:ID` key per resource the document carries (primary + included),
//! de-duplicated in document order. Write paths purge the type-level key
//! and the touched resource's key.

use std::collections::HashSet;

use jsonapi_core::Document;

/// Keys for a response document.
pub fn document_keys(primary_type: &str, document: &Document) -> Vec<String> {
    let mut keys = vec![primary_type.to_string()];
    let mut seen = HashSet::new();
    for ident in document.resource_identifiers() {
        let key = format!("{}:{}", ident.type_name, ident.id);
        if seen.insert(key.clone()) {
            keys.push(key);
        }
    }
    keys
}

/// Keys invalidated by a write to one resource.
pub fn write_keys(type_name: &str, id: &str) -> Vec<String> {
    vec![type_name.to_string(), format!("{type_name}:{id}")]
}

/// The space-separated `Surrogate-Key` header value.
pub fn header_value(keys: &[String]) -> String {
    keys.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonapi_core::{PrimaryData, ResourceObject};

    #[test]
    fn keys_cover_primary_and_included_without_duplicates() {
        let mut doc = Document::versioned();
        doc.data = Some(PrimaryData::Many(vec![
            ResourceObject::new("articles", "1"),
            ResourceObject::new("articles", "2"),
        ]));
        doc.included.push(ResourceObject::new("authors", "a1"));

        let keys = document_keys("articles", &doc);
        assert_eq!(keys, ["articles", "articles:1", "articles:2", "authors:a1"]);
        assert_eq!(
            header_value(&keys),
            "articles articles:1 articles:2 authors:a1"
        );
    }

    #[test]
    fn write_keys_pair_type_and_resource() {
        assert_eq!(write_keys("articles", "7"), ["articles", "articles:7"]);
    }
}
