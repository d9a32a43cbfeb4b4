//! The atomic-operations engine (`ext="https://jsonapi.org/ext/atomic"`).
//!
//! Operations execute strictly in document order inside one transaction,
//! with a flush after each so later operations observe earlier results.
//! Local ids declared by `add` operations resolve forward references; any
//! failure rolls the whole batch back and surfaces one error pointed at
//! `/atomic:operations/{index}` (plus the inner pointer when applicable).

use std::collections::{HashMap, HashSet};

use http::StatusCode;
use jsonapi_core::{ChangeSet, RelationshipPatch, ResourceRef};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{map_persist_error, Error, MappedViolation, Rejection};
use crate::hooks::{DeletePhase, WritePhase};
use crate::negotiation::{Negotiation, ATOMIC_EXT};
use crate::pipeline::JsonApiEngine;
use crate::reader::DocumentReader;
use crate::registry::WriteAccess;
use crate::request::{RequestContext, Response};
use crate::surrogate;

/// Map from declared local ids to the real ids they resolved to.
/// Scope: one atomic request.
#[derive(Debug, Default)]
pub struct LidRegistry {
    map: HashMap<String, String>,
}

impl LidRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a lid after its `add` operation succeeded.
    pub fn declare(&mut self, lid: &str, id: String, pointer: &str) -> Result<(), Error> {
        if self.map.insert(lid.to_string(), id).is_some() {
            return Err(Error::DuplicateLid {
                lid: lid.to_string(),
                pointer: pointer.to_string(),
            });
        }
        Ok(())
    }

    pub fn resolve(&self, lid: &str) -> Option<&str> {
        self.map.get(lid).map(String::as_str)
    }

    /// Rewrites a lid reference to its real id; a lid used before its
    /// declaration is an error.
    pub fn substitute(&self, r: &mut ResourceRef, pointer: &str) -> Result<(), Error> {
        let Some(lid) = r.lid() else {
            return Ok(());
        };
        match self.resolve(lid) {
            Some(id) => {
                *r = ResourceRef::by_id(r.type_name.clone(), id);
                Ok(())
            }
            None => Err(Error::UnknownLid {
                lid: lid.to_string(),
                pointer: pointer.to_string(),
            }),
        }
    }

    fn substitute_changeset(&self, change_set: &mut ChangeSet) -> Result<(), Error> {
        for (name, target) in change_set.to_one.iter_mut() {
            if let Some(target) = target {
                self.substitute(target, &format!("/data/relationships/{name}/data"))?;
            }
        }
        for (name, targets) in change_set.to_many.iter_mut() {
            for (i, target) in targets.iter_mut().enumerate() {
                self.substitute(target, &format!("/data/relationships/{name}/data/{i}"))?;
            }
        }
        Ok(())
    }

    fn substitute_patch(&self, patch: &mut RelationshipPatch) -> Result<(), Error> {
        for target in patch.refs_mut() {
            self.substitute(target, "/data")?;
        }
        Ok(())
    }
}

/// One parsed `ref` member.
struct OpRef {
    type_name: String,
    id: Option<String>,
    lid: Option<String>,
    relationship: Option<String>,
}

enum Verb {
    Add,
    Update,
    Remove,
}

impl JsonApiEngine {
    pub(crate) async fn atomic_operations(
        &self,
        ctx: &RequestContext,
        negotiation: &Negotiation,
    ) -> Result<Response, Rejection> {
        let body = DocumentReader::parse_json(ctx.body())?;
        let Some(operations) = body.get("atomic:operations").and_then(Value::as_array) else {
            return Err(Rejection::from(Error::InvalidDocument {
                detail: "document must carry an `atomic:operations` array".to_string(),
                pointer: "/atomic:operations".to_string(),
            }));
        };
        if operations.is_empty() {
            return Err(Rejection::from(Error::InvalidDocument {
                detail: "`atomic:operations` must contain at least one operation".to_string(),
                pointer: "/atomic:operations".to_string(),
            }));
        }
        if operations.len() > self.config.limits.max_operations {
            return Err(Rejection::from(Error::TooManyOperations {
                max: self.config.limits.max_operations,
            }));
        }

        // Duplicate declarations are detectable before any side effect.
        let mut declared = HashSet::new();
        for (index, operation) in operations.iter().enumerate() {
            if operation.get("op").and_then(Value::as_str) != Some("add") {
                continue;
            }
            if let Some(lid) = operation
                .get("data")
                .and_then(|d| d.get("lid"))
                .and_then(Value::as_str)
            {
                if !declared.insert(lid.to_string()) {
                    return Err(Rejection::from(Error::DuplicateLid {
                        lid: lid.to_string(),
                        pointer: format!("/atomic:operations/{index}/data/lid"),
                    }));
                }
            }
        }

        let mut lids = LidRegistry::new();
        let mut results: Vec<Option<Value>> = Vec::with_capacity(operations.len());
        let mut purge: Vec<String> = Vec::new();

        self.transactions.begin().await.map_err(Error::internal)?;
        for (index, operation) in operations.iter().enumerate() {
            debug!(index, "executing atomic operation");
            let outcome = self
                .execute_operation(operation, negotiation, &mut lids, &mut purge)
                .await;
            match outcome {
                Ok(result) => {
                    if let Err(err) = self.transactions.flush().await {
                        self.rollback_quietly().await;
                        return Err(prefix_rejection(
                            Rejection::from(Error::internal(err)),
                            index,
                        ));
                    }
                    results.push(result);
                }
                Err(rejection) => {
                    self.rollback_quietly().await;
                    return Err(prefix_rejection(rejection, index));
                }
            }
        }
        self.transactions.commit().await.map_err(Error::internal)?;
        info!(operations = operations.len(), "atomic batch committed");

        let mut seen = HashSet::new();
        purge.retain(|key| seen.insert(key.clone()));
        self.purge_surrogates(&purge).await;

        if results.iter().all(Option::is_none) {
            return Ok(Response::no_content());
        }
        let entries: Vec<Value> = results
            .into_iter()
            .map(|r| match r {
                Some(data) => json!({ "data": data }),
                None => json!({}),
            })
            .collect();
        let document = json!({
            "jsonapi": { "version": "1.1", "ext": [ATOMIC_EXT] },
            "atomic:results": entries,
        });
        Ok(Response::json(
            StatusCode::OK,
            &document,
            &negotiation.content_type,
        ))
    }

    /// Executes one operation. All pointers in the returned rejection are
    /// local to the operation object; the caller prefixes them with
    /// `/atomic:operations/{index}`.
    async fn execute_operation(
        &self,
        operation: &Value,
        negotiation: &Negotiation,
        lids: &mut LidRegistry,
        purge: &mut Vec<String>,
    ) -> Result<Option<Value>, Rejection> {
        let Some(object) = operation.as_object() else {
            return Err(Rejection::from(Error::InvalidDocument {
                detail: "operation must be an object".to_string(),
                pointer: String::new(),
            }));
        };

        let verb = match object.get("op").and_then(Value::as_str) {
            Some("add") => Verb::Add,
            Some("update") => Verb::Update,
            Some("remove") => Verb::Remove,
            Some(other) => {
                return Err(Rejection::from(Error::UnknownOperation {
                    detail: format!("'{other}' is not a known operation"),
                    pointer: "/op".to_string(),
                }))
            }
            None => {
                return Err(Rejection::from(Error::UnknownOperation {
                    detail: "operation must carry a string `op`".to_string(),
                    pointer: "/op".to_string(),
                }))
            }
        };
        if object.contains_key("href") {
            return Err(Rejection::from(Error::UnknownOperation {
                detail: "href targeting is not supported; use `ref`".to_string(),
                pointer: "/href".to_string(),
            }));
        }

        let op_ref = parse_ref_member(object.get("ref"))?;
        let data = object.get("data");

        if let Some(op_ref) = &op_ref {
            if op_ref.relationship.is_some() {
                return self
                    .execute_relationship_operation(verb, op_ref, operation, lids, purge)
                    .await;
            }
        }

        match verb {
            Verb::Add => {
                self.execute_add(op_ref.as_ref(), data, negotiation, lids, purge)
                    .await
            }
            Verb::Update => {
                self.execute_update(op_ref.as_ref(), data, negotiation, lids, purge)
                    .await
            }
            Verb::Remove => {
                self.execute_remove(op_ref.as_ref(), negotiation, lids, purge)
                    .await
            }
        }
    }

    async fn execute_add(
        &self,
        op_ref: Option<&OpRef>,
        data: Option<&Value>,
        negotiation: &Negotiation,
        lids: &mut LidRegistry,
        purge: &mut Vec<String>,
    ) -> Result<Option<Value>, Rejection> {
        let Some(data) = data else {
            return Err(Rejection::from(Error::InvalidDocument {
                detail: "add operation requires `data`".to_string(),
                pointer: "/data".to_string(),
            }));
        };
        let type_name = op_ref
            .map(|r| r.type_name.clone())
            .or_else(|| {
                data.get("type")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .ok_or_else(|| Error::InvalidDocument {
                detail: "add operation names no resource type".to_string(),
                pointer: "/data/type".to_string(),
            })?;
        let meta = self.registry.get_by_type(&type_name)?;

        let reader = DocumentReader::new(&self.config);
        let mut parsed =
            reader.read_resource_object(meta, data, "/data", WriteAccess::Create, None, true)?;
        lids.substitute_changeset(&mut parsed.change_set)?;

        if let Some(client_id) = &parsed.client_id {
            let taken = self
                .existence
                .exists(&type_name, client_id)
                .await
                .map_err(Error::from)?;
            if taken {
                return Err(Rejection::from(Error::Conflict {
                    detail: format!("id '{client_id}' is already taken"),
                    pointer: Some("/data/id".to_string()),
                }));
            }
        }

        let active = self.active_profiles(&type_name, negotiation);
        active.each(|p| {
            p.on_before_create(&mut WritePhase {
                type_name: &type_name,
                id: None,
                change_set: &mut parsed.change_set,
            })
        })?;
        self.check_linkage_targets(&parsed.change_set).await?;

        let entity = self
            .persister
            .create(&type_name, &parsed.change_set, parsed.client_id.as_deref())
            .await
            .map_err(|e| map_persist_error(meta, None, e))?;
        let id = crate::property::id_of(&entity, meta).ok_or_else(|| {
            Error::internal(anyhow::anyhow!(
                "persister returned a '{type_name}' entity without an id"
            ))
        })?;

        if let Some(lid) = &parsed.lid {
            lids.declare(lid, id.clone(), "/data/lid")?;
        }
        purge.extend(surrogate::write_keys(&type_name, &id));

        let resource = self.document_builder().resource_object_with_linkage(
            meta,
            &entity,
            &self.neutral_criteria(),
        )?;
        let value = serde_json::to_value(resource).map_err(Error::internal)?;
        Ok(Some(value))
    }

    async fn execute_update(
        &self,
        op_ref: Option<&OpRef>,
        data: Option<&Value>,
        negotiation: &Negotiation,
        lids: &mut LidRegistry,
        purge: &mut Vec<String>,
    ) -> Result<Option<Value>, Rejection> {
        let Some(data) = data else {
            return Err(Rejection::from(Error::InvalidDocument {
                detail: "update operation requires `data`".to_string(),
                pointer: "/data".to_string(),
            }));
        };
        let (type_name, id) = self.resolve_write_target(op_ref, Some(data), lids)?;
        let meta = self.registry.get_by_type(&type_name)?;

        let reader = DocumentReader::new(&self.config);
        let mut parsed = reader.read_resource_object(
            meta,
            data,
            "/data",
            WriteAccess::Update,
            Some(&id),
            true,
        )?;
        lids.substitute_changeset(&mut parsed.change_set)?;

        let active = self.active_profiles(&type_name, negotiation);
        active.each(|p| {
            p.on_before_update(&mut WritePhase {
                type_name: &type_name,
                id: Some(&id),
                change_set: &mut parsed.change_set,
            })
        })?;
        self.check_linkage_targets(&parsed.change_set).await?;

        let entity = self
            .persister
            .update(&type_name, &id, &parsed.change_set)
            .await
            .map_err(|e| map_persist_error(meta, Some(&id), e))?;
        purge.extend(surrogate::write_keys(&type_name, &id));

        let resource = self.document_builder().resource_object_with_linkage(
            meta,
            &entity,
            &self.neutral_criteria(),
        )?;
        let value = serde_json::to_value(resource).map_err(Error::internal)?;
        Ok(Some(value))
    }

    async fn execute_remove(
        &self,
        op_ref: Option<&OpRef>,
        negotiation: &Negotiation,
        lids: &mut LidRegistry,
        purge: &mut Vec<String>,
    ) -> Result<Option<Value>, Rejection> {
        let Some(op_ref) = op_ref else {
            return Err(Rejection::from(Error::InvalidDocument {
                detail: "remove operation requires `ref`".to_string(),
                pointer: "/ref".to_string(),
            }));
        };
        let (type_name, id) = self.resolve_write_target(Some(op_ref), None, lids)?;
        let meta = self.registry.get_by_type(&type_name)?;

        let active = self.active_profiles(&type_name, negotiation);
        active.each(|p| {
            p.on_before_delete(&mut DeletePhase {
                type_name: &type_name,
                id: &id,
            })
        })?;

        self.persister
            .delete(&type_name, &id)
            .await
            .map_err(|e| map_persist_error(meta, Some(&id), e))?;
        purge.extend(surrogate::write_keys(&type_name, &id));
        Ok(None)
    }

    /// Relationship variant of add/update/remove (`ref.relationship` set).
    async fn execute_relationship_operation(
        &self,
        verb: Verb,
        op_ref: &OpRef,
        operation: &Value,
        lids: &mut LidRegistry,
        purge: &mut Vec<String>,
    ) -> Result<Option<Value>, Rejection> {
        let relationship = op_ref.relationship.as_deref().unwrap_or_default();
        let meta = self.registry.get_by_type(&op_ref.type_name)?;
        let rel = meta
            .relationship(relationship)
            .ok_or_else(|| Error::UnknownRelationship {
                name: relationship.to_string(),
                pointer: "/ref/relationship".to_string(),
            })?;
        let (type_name, id) = self.resolve_write_target(Some(op_ref), None, lids)?;

        if !rel.to_many && !matches!(verb, Verb::Update) {
            return Err(Rejection::from(Error::InvalidRelationshipData {
                detail: "add/remove require a to-many relationship".to_string(),
                pointer: "/ref/relationship".to_string(),
            }));
        }

        let reader = DocumentReader::new(&self.config);
        let mut patch = reader.read_relationship(rel, operation, true)?;
        lids.substitute_patch(&mut patch)?;

        self.check_parent_exists(&type_name, &id).await?;
        for (i, target) in patch.refs().iter().enumerate() {
            let pointer = if rel.to_many {
                format!("/data/{i}")
            } else {
                "/data".to_string()
            };
            self.check_target_exists(target, &pointer).await?;
        }

        let targets: Vec<_> = patch
            .refs()
            .iter()
            .filter_map(|r| r.to_identifier())
            .collect();
        let outcome = match verb {
            Verb::Update => {
                self.relationship_updater
                    .replace(&type_name, &id, relationship, &patch)
                    .await
            }
            Verb::Add => {
                self.relationship_updater
                    .add(&type_name, &id, relationship, &targets)
                    .await
            }
            Verb::Remove => {
                self.relationship_updater
                    .remove(&type_name, &id, relationship, &targets)
                    .await
            }
        };
        outcome.map_err(|e| map_persist_error(meta, Some(&id), e))?;

        purge.extend(surrogate::write_keys(&type_name, &id));
        Ok(None)
    }

    /// The `(type, id)` a write targets, from `ref` or `data`, resolving
    /// lids through the registry.
    fn resolve_write_target(
        &self,
        op_ref: Option<&OpRef>,
        data: Option<&Value>,
        lids: &LidRegistry,
    ) -> Result<(String, String), Rejection> {
        if let Some(op_ref) = op_ref {
            if let Some(id) = &op_ref.id {
                return Ok((op_ref.type_name.clone(), id.clone()));
            }
            if let Some(lid) = &op_ref.lid {
                let id = lids.resolve(lid).ok_or_else(|| Error::UnknownLid {
                    lid: lid.clone(),
                    pointer: "/ref/lid".to_string(),
                })?;
                return Ok((op_ref.type_name.clone(), id.to_string()));
            }
            return Err(Rejection::from(Error::InvalidDocument {
                detail: "`ref` must carry `id` or `lid`".to_string(),
                pointer: "/ref".to_string(),
            }));
        }

        let Some(data) = data.and_then(Value::as_object) else {
            return Err(Rejection::from(Error::InvalidDocument {
                detail: "operation names no target".to_string(),
                pointer: "/ref".to_string(),
            }));
        };
        let type_name = data
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidDocument {
                detail: "resource object must carry a string `type`".to_string(),
                pointer: "/data/type".to_string(),
            })?;
        if let Some(id) = data.get("id").and_then(Value::as_str) {
            return Ok((type_name.to_string(), id.to_string()));
        }
        if let Some(lid) = data.get("lid").and_then(Value::as_str) {
            let id = lids.resolve(lid).ok_or_else(|| Error::UnknownLid {
                lid: lid.to_string(),
                pointer: "/data/lid".to_string(),
            })?;
            return Ok((type_name.to_string(), id.to_string()));
        }
        Err(Rejection::from(Error::InvalidDocument {
            detail: "operation target carries neither `id` nor `lid`".to_string(),
            pointer: "/data".to_string(),
        }))
    }
}

fn parse_ref_member(value: Option<&Value>) -> Result<Option<OpRef>, Rejection> {
    let Some(value) = value else {
        return Ok(None);
    };
    let Some(object) = value.as_object() else {
        return Err(Rejection::from(Error::InvalidDocument {
            detail: "`ref` must be an object".to_string(),
            pointer: "/ref".to_string(),
        }));
    };
    let type_name = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidDocument {
            detail: "`ref` must carry a string `type`".to_string(),
            pointer: "/ref/type".to_string(),
        })?;
    Ok(Some(OpRef {
        type_name: type_name.to_string(),
        id: object.get("id").and_then(Value::as_str).map(str::to_string),
        lid: object
            .get("lid")
            .and_then(Value::as_str)
            .map(str::to_string),
        relationship: object
            .get("relationship")
            .and_then(Value::as_str)
            .map(str::to_string),
    }))
}

/// Prefixes every pointer in a rejection with the operation's position.
fn prefix_rejection(rejection: Rejection, index: usize) -> Rejection {
    let prefix = format!("/atomic:operations/{index}");
    Rejection::new(
        rejection
            .errors
            .into_iter()
            .map(|e| prefix_error(e, &prefix))
            .collect(),
    )
}

fn join_pointer(prefix: &str, pointer: &str) -> String {
    if pointer.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}{pointer}")
    }
}

fn prefix_error(error: Error, prefix: &str) -> Error {
    use Error::*;
    match error {
        UnknownLid { lid, pointer } => UnknownLid {
            lid,
            pointer: join_pointer(prefix, &pointer),
        },
        DuplicateLid { lid, pointer } => DuplicateLid {
            lid,
            pointer: join_pointer(prefix, &pointer),
        },
        UnknownOperation { detail, pointer } => UnknownOperation {
            detail,
            pointer: join_pointer(prefix, &pointer),
        },
        UnknownAttribute { name, pointer } => UnknownAttribute {
            name,
            pointer: join_pointer(prefix, &pointer),
        },
        UnknownRelationship { name, pointer } => UnknownRelationship {
            name,
            pointer: join_pointer(prefix, &pointer),
        },
        InvalidRelationshipData { detail, pointer } => InvalidRelationshipData {
            detail,
            pointer: join_pointer(prefix, &pointer),
        },
        InvalidDocument { detail, pointer } => InvalidDocument {
            detail,
            pointer: join_pointer(prefix, &pointer),
        },
        ForbiddenClientId { pointer } => ForbiddenClientId {
            pointer: join_pointer(prefix, &pointer),
        },
        NotFound { detail, pointer } => NotFound {
            detail,
            pointer: Some(join_pointer(prefix, pointer.as_deref().unwrap_or(""))),
        },
        Conflict { detail, pointer } => Conflict {
            detail,
            pointer: Some(join_pointer(prefix, pointer.as_deref().unwrap_or(""))),
        },
        Validation { violations } => Validation {
            violations: violations
                .into_iter()
                .map(|v| MappedViolation {
                    pointer: join_pointer(prefix, &v.pointer),
                    message: v.message,
                })
                .collect(),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lid_registry_declares_resolves_and_rejects_duplicates() {
        let mut lids = LidRegistry::new();
        lids.declare("a1", "real-1".to_string(), "/data/lid").unwrap();
        assert_eq!(lids.resolve("a1"), Some("real-1"));

        let err = lids
            .declare("a1", "real-2".to_string(), "/data/lid")
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateLid { .. }));
    }

    #[test]
    fn substitute_rewrites_known_lids_only() {
        let mut lids = LidRegistry::new();
        lids.declare("a1", "real-1".to_string(), "/data/lid").unwrap();

        let mut known = ResourceRef::by_lid("authors", "a1");
        lids.substitute(&mut known, "/data").unwrap();
        assert_eq!(known.id(), Some("real-1"));

        let mut unknown = ResourceRef::by_lid("authors", "nope");
        let err = lids.substitute(&mut unknown, "/data").unwrap_err();
        assert!(matches!(err, Error::UnknownLid { .. }));

        let mut by_id = ResourceRef::by_id("authors", "a9");
        lids.substitute(&mut by_id, "/data").unwrap();
        assert_eq!(by_id.id(), Some("a9"));
    }

    #[test]
    fn pointer_prefixing_keeps_inner_pointers() {
        let err = prefix_error(
            Error::UnknownLid {
                lid: "x".into(),
                pointer: "/data/relationships/author/data".into(),
            },
            "/atomic:operations/2",
        );
        match err {
            Error::UnknownLid { pointer, .. } => {
                assert_eq!(pointer, "/atomic:operations/2/data/relationships/author/data");
            }
            other => panic!("unexpected error {other:?}"),
        }

        let err = prefix_error(
            Error::NotFound {
                detail: "gone".into(),
                pointer: None,
            },
            "/atomic:operations/2",
        );
        match err {
            Error::NotFound { pointer, .. } => {
                assert_eq!(pointer.as_deref(), Some("/atomic:operations/2"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
