//! Inbound document reading: JSON:API documents to change sets.
//!
//! Every failure carries the precise JSON Pointer of the offending member.
//! The reader aggregates everything it can detect in one pass instead of
//! stopping at the first problem. Attributes excluded from the current
//! operation's serialization groups are dropped silently, never written.

use jsonapi_core::{ChangeSet, RelationshipPatch, ResourceRef};
use serde_json::Value;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{Error, Rejection};
use crate::registry::{RelationshipMetadata, ResourceMetadata, WriteAccess};

/// A parsed single-resource write payload.
#[derive(Debug)]
pub struct ParsedResource {
    pub type_name: String,
    pub change_set: ChangeSet,
    /// Client-generated id, present only when the type allows it.
    pub client_id: Option<String>,
    /// Local id declared by the resource object (atomic requests only).
    pub lid: Option<String>,
}

pub struct DocumentReader<'a> {
    config: &'a EngineConfig,
}

impl<'a> DocumentReader<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Parses the request body as JSON.
    pub fn parse_json(body: &[u8]) -> Result<Value, Rejection> {
        serde_json::from_slice(body).map_err(|e| {
            Rejection::from(Error::InvalidDocument {
                detail: format!("request body is not valid JSON: {e}"),
                pointer: String::new(),
            })
        })
    }

    /// Reads a `{data: {...}}` document for a create/update of `meta`.
    pub fn read_resource(
        &self,
        meta: &ResourceMetadata,
        document: &Value,
        access: WriteAccess,
        url_id: Option<&str>,
        allow_lid: bool,
    ) -> Result<ParsedResource, Rejection> {
        let Some(data) = document.get("data") else {
            return Err(Rejection::from(Error::InvalidDocument {
                detail: "document must carry a top-level `data` member".to_string(),
                pointer: "/data".to_string(),
            }));
        };
        self.read_resource_object(meta, data, "/data", access, url_id, allow_lid)
    }

    /// Reads one resource object rooted at `base` (either `/data` or an
    /// atomic operation's `data`).
    pub fn read_resource_object(
        &self,
        meta: &ResourceMetadata,
        data: &Value,
        base: &str,
        access: WriteAccess,
        url_id: Option<&str>,
        allow_lid: bool,
    ) -> Result<ParsedResource, Rejection> {
        let Some(object) = data.as_object() else {
            return Err(Rejection::from(Error::InvalidDocument {
                detail: "primary data must be a resource object".to_string(),
                pointer: base.to_string(),
            }));
        };

        let mut errors: Vec<Error> = Vec::new();
        let mut parsed = ParsedResource {
            type_name: meta.type_name.clone(),
            change_set: ChangeSet::default(),
            client_id: None,
            lid: None,
        };

        match object.get("type").and_then(Value::as_str) {
            Some(type_name) if type_name == meta.type_name => {}
            Some(type_name) => errors.push(Error::Conflict {
                detail: format!(
                    "resource type '{type_name}' does not match endpoint type '{}'",
                    meta.type_name
                ),
                pointer: Some(format!("{base}/type")),
            }),
            None => errors.push(Error::InvalidDocument {
                detail: "resource object must carry a string `type`".to_string(),
                pointer: format!("{base}/type"),
            }),
        }

        if let Some(id_value) = object.get("id") {
            match (id_value.as_str(), access) {
                (None, _) => errors.push(Error::InvalidDocument {
                    detail: "resource `id` must be a string".to_string(),
                    pointer: format!("{base}/id"),
                }),
                (Some(id), WriteAccess::Update) => {
                    if url_id.is_some_and(|expected| expected != id) {
                        errors.push(Error::Conflict {
                            detail: format!(
                                "resource id '{id}' does not match the request target"
                            ),
                            pointer: Some(format!("{base}/id")),
                        });
                    }
                }
                (Some(id), WriteAccess::Create) => {
                    let allowed = self
                        .config
                        .write
                        .client_generated_ids
                        .get(&meta.type_name)
                        .copied()
                        .unwrap_or(false);
                    if allowed {
                        parsed.client_id = Some(id.to_string());
                    } else {
                        errors.push(Error::ForbiddenClientId {
                            pointer: format!("{base}/id"),
                        });
                    }
                }
            }
        }

        if let Some(lid_value) = object.get("lid") {
            match lid_value.as_str() {
                Some(lid) if allow_lid => parsed.lid = Some(lid.to_string()),
                Some(_) => errors.push(Error::InvalidDocument {
                    detail: "`lid` is only valid inside an atomic request".to_string(),
                    pointer: format!("{base}/lid"),
                }),
                None => errors.push(Error::InvalidDocument {
                    detail: "`lid` must be a string".to_string(),
                    pointer: format!("{base}/lid"),
                }),
            }
        }

        if let Some(attributes) = object.get("attributes") {
            match attributes.as_object() {
                Some(attributes) => {
                    for (name, value) in attributes {
                        let Some(attr) = meta.attribute(name) else {
                            errors.push(Error::UnknownAttribute {
                                name: name.clone(),
                                pointer: format!("{base}/attributes/{name}"),
                            });
                            continue;
                        };
                        if !attr.groups.writable_for(access) {
                            debug!(
                                type_name = %meta.type_name,
                                attribute = %name,
                                "dropping non-writable attribute"
                            );
                            continue;
                        }
                        parsed
                            .change_set
                            .attributes
                            .insert(name.clone(), value.clone());
                    }
                }
                None => errors.push(Error::InvalidDocument {
                    detail: "`attributes` must be an object".to_string(),
                    pointer: format!("{base}/attributes"),
                }),
            }
        }

        if let Some(relationships) = object.get("relationships") {
            match relationships.as_object() {
                Some(relationships) => {
                    for (name, rel_object) in relationships {
                        self.read_changeset_relationship(
                            meta,
                            name,
                            rel_object,
                            base,
                            allow_lid,
                            &mut parsed.change_set,
                            &mut errors,
                        );
                    }
                }
                None => errors.push(Error::InvalidDocument {
                    detail: "`relationships` must be an object".to_string(),
                    pointer: format!("{base}/relationships"),
                }),
            }
        }

        if errors.is_empty() {
            Ok(parsed)
        } else {
            Err(Rejection::new(errors))
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn read_changeset_relationship(
        &self,
        meta: &ResourceMetadata,
        name: &str,
        rel_object: &Value,
        base: &str,
        allow_lid: bool,
        change_set: &mut ChangeSet,
        errors: &mut Vec<Error>,
    ) {
        let pointer = format!("{base}/relationships/{name}");
        let Some(rel) = meta.relationship(name) else {
            errors.push(Error::UnknownRelationship {
                name: name.to_string(),
                pointer,
            });
            return;
        };
        let Some(data) = rel_object.get("data") else {
            errors.push(Error::InvalidRelationshipData {
                detail: "relationship object must carry `data` linkage".to_string(),
                pointer,
            });
            return;
        };
        let data_pointer = format!("{pointer}/data");

        if rel.to_many {
            let Some(items) = data.as_array() else {
                let detail = if data.is_null() {
                    "to-many linkage cannot be null; use [] to clear".to_string()
                } else {
                    "to-many linkage must be an array".to_string()
                };
                errors.push(Error::InvalidRelationshipData {
                    detail,
                    pointer: data_pointer,
                });
                return;
            };
            let mut refs = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                if let Some(r) = parse_ref(
                    item,
                    &format!("{data_pointer}/{i}"),
                    rel.target(),
                    allow_lid,
                    errors,
                ) {
                    refs.push(r);
                }
            }
            change_set.to_many.insert(name.to_string(), refs);
        } else if data.is_null() {
            change_set.to_one.insert(name.to_string(), None);
        } else if let Some(r) = parse_ref(data, &data_pointer, rel.target(), allow_lid, errors) {
            change_set.to_one.insert(name.to_string(), Some(r));
        }
    }

    /// Reads the `{data: ...}` payload of a relationship endpoint write.
    pub fn read_relationship(
        &self,
        rel: &RelationshipMetadata,
        document: &Value,
        allow_lid: bool,
    ) -> Result<RelationshipPatch, Rejection> {
        let Some(data) = document.get("data") else {
            return Err(Rejection::from(Error::InvalidDocument {
                detail: "relationship document must carry a top-level `data` member".to_string(),
                pointer: "/data".to_string(),
            }));
        };

        let mut errors = Vec::new();
        let patch = if rel.to_many {
            match data.as_array() {
                Some(items) => {
                    let mut refs = Vec::with_capacity(items.len());
                    for (i, item) in items.iter().enumerate() {
                        if let Some(r) = parse_ref(
                            item,
                            &format!("/data/{i}"),
                            rel.target(),
                            allow_lid,
                            &mut errors,
                        ) {
                            refs.push(r);
                        }
                    }
                    RelationshipPatch::ToMany(refs)
                }
                None => {
                    let detail = if data.is_null() {
                        "to-many linkage cannot be null; use [] to clear".to_string()
                    } else {
                        "to-many linkage must be an array".to_string()
                    };
                    errors.push(Error::InvalidRelationshipData {
                        detail,
                        pointer: "/data".to_string(),
                    });
                    RelationshipPatch::ToMany(Vec::new())
                }
            }
        } else if data.is_null() {
            RelationshipPatch::ToOne(None)
        } else {
            let r = parse_ref(data, "/data", rel.target(), allow_lid, &mut errors);
            RelationshipPatch::ToOne(r)
        };

        if errors.is_empty() {
            Ok(patch)
        } else {
            Err(Rejection::new(errors))
        }
    }

    /// Visible so the atomic engine can parse `ref`-addressed linkage with
    /// the same rules.
    pub fn parse_ref_at(
        value: &Value,
        pointer: &str,
        expected_type: &str,
        allow_lid: bool,
    ) -> Result<ResourceRef, Rejection> {
        let mut errors = Vec::new();
        match parse_ref(value, pointer, expected_type, allow_lid, &mut errors) {
            Some(r) => Ok(r),
            None => Err(Rejection::new(errors)),
        }
    }
}

/// Parses one resource reference, enforcing the declared target type and
/// the exactly-one-of-`id`/`lid` rule.
fn parse_ref(
    value: &Value,
    pointer: &str,
    expected_type: &str,
    allow_lid: bool,
    errors: &mut Vec<Error>,
) -> Option<ResourceRef> {
    let Some(object) = value.as_object() else {
        errors.push(Error::InvalidRelationshipData {
            detail: "linkage must be a resource identifier object".to_string(),
            pointer: pointer.to_string(),
        });
        return None;
    };

    let type_name = match object.get("type").and_then(Value::as_str) {
        Some(t) => t,
        None => {
            errors.push(Error::InvalidRelationshipData {
                detail: "resource identifier must carry a string `type`".to_string(),
                pointer: pointer.to_string(),
            });
            return None;
        }
    };
    if type_name != expected_type {
        errors.push(Error::InvalidRelationshipData {
            detail: format!("'{type_name}' is not the expected type '{expected_type}'"),
            pointer: pointer.to_string(),
        });
        return None;
    }

    let id = object.get("id").and_then(Value::as_str);
    let lid = object.get("lid").and_then(Value::as_str);
    match (id, lid) {
        (Some(id), None) => Some(ResourceRef::by_id(type_name, id)),
        (None, Some(lid)) => {
            if allow_lid {
                Some(ResourceRef::by_lid(type_name, lid))
            } else {
                errors.push(Error::UnknownLid {
                    lid: lid.to_string(),
                    pointer: pointer.to_string(),
                });
                None
            }
        }
        _ => {
            errors.push(Error::InvalidRelationshipData {
                detail: "resource identifier must carry exactly one of `id` and `lid`"
                    .to_string(),
                pointer: pointer.to_string(),
            });
            None
        }
    }
}

#[cfg(test)]
#[path = "reader_tests.rs"]
mod reader_tests;
