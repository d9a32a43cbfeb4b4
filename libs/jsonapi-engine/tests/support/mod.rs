//! Shared test fixture: an in-memory data layer implementing every
//! collaborator contract, plus the article/author/tag registry the suites
//! run against.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use jsonapi_core::{
    ChangeSet, Condition, Criteria, Expr, FilterOp, FilterValue, PageSpec, RelationshipPatch,
    ResourceIdentifier, Slice, SliceIds, SortDir,
};
use jsonapi_engine::{
    AttrKind, AttributeMetadata, EngineConfig, ExistenceChecker, JsonApiEngine, PersistError,
    RelationshipMetadata, RelationshipReader, RelationshipUpdater, RepositoryError,
    ResourceMetadata, ResourcePersister, ResourceRegistry, ResourceRepository, SerializationGroups,
    SurrogatePurger, TransactionManager, Violation,
};

type Table = BTreeMap<String, Value>;

#[derive(Clone, Default)]
struct State {
    tables: BTreeMap<String, Table>,
}

/// One store implements every collaborator trait. Transactions snapshot
/// the whole state so rollback genuinely undoes earlier operations.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    snapshot: Mutex<Option<State>>,
    purged: Mutex<Vec<Vec<String>>>,
}

impl InMemoryStore {
    pub fn fixture() -> Self {
        let store = Self::default();
        {
            let mut state = store.state.lock().unwrap();
            let articles = state.tables.entry("articles".to_string()).or_default();
            articles.insert(
                "1".to_string(),
                json!({
                    "id": "1", "title": "First", "createdAt": "2026-01-01T09:00:00Z",
                    "updatedAt": "2026-01-10T09:00:00Z",
                    "author": "a1", "tags": ["t1", "t2"]
                }),
            );
            articles.insert(
                "2".to_string(),
                json!({
                    "id": "2", "title": "Second", "createdAt": "2026-01-02T09:00:00Z",
                    "updatedAt": "2026-01-11T09:00:00Z",
                    "author": "a1", "tags": ["t2"]
                }),
            );
            articles.insert(
                "3".to_string(),
                json!({
                    "id": "3", "title": "Third", "createdAt": "2026-01-03T09:00:00Z",
                    "updatedAt": "2026-01-12T09:00:00Z",
                    "author": "a2", "tags": []
                }),
            );

            let authors = state.tables.entry("authors".to_string()).or_default();
            authors.insert(
                "a1".to_string(),
                json!({"id": "a1", "name": "Ada", "articles": ["1", "2"]}),
            );
            authors.insert(
                "a2".to_string(),
                json!({"id": "a2", "name": "Grace", "articles": ["3"]}),
            );

            let tags = state.tables.entry("tags".to_string()).or_default();
            tags.insert("t1".to_string(), json!({"id": "t1", "label": "rust"}));
            tags.insert("t2".to_string(), json!({"id": "t2", "label": "web"}));
        }
        store
    }

    pub fn get(&self, type_name: &str, id: &str) -> Option<Value> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(type_name)
            .and_then(|t| t.get(id))
            .cloned()
    }

    pub fn count(&self, type_name: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(type_name)
            .map(|t| t.len())
            .unwrap_or(0)
    }

    pub fn purged(&self) -> Vec<Vec<String>> {
        self.purged.lock().unwrap().clone()
    }

    fn all(&self, type_name: &str) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(type_name)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    fn apply_changeset(entity: &mut Value, change_set: &ChangeSet) {
        let object = entity.as_object_mut().unwrap();
        for (name, value) in &change_set.attributes {
            object.insert(name.clone(), value.clone());
        }
        for (name, target) in &change_set.to_one {
            let value = match target {
                Some(r) => json!(r.id().unwrap()),
                None => Value::Null,
            };
            object.insert(name.clone(), value);
        }
        for (name, targets) in &change_set.to_many {
            let ids: Vec<&str> = targets.iter().filter_map(|r| r.id()).collect();
            object.insert(name.clone(), json!(ids));
        }
    }

    fn validate(type_name: &str, change_set: &ChangeSet) -> Result<(), PersistError> {
        if type_name == "articles" {
            if let Some(title) = change_set.attributes.get("title") {
                if title.as_str().map(str::is_empty).unwrap_or(true) {
                    return Err(PersistError::Validation(vec![Violation::new(
                        "title",
                        "title must not be empty",
                    )]));
                }
            }
        }
        Ok(())
    }

    fn matches_filter(entity: &Value, filter: Option<&Expr>) -> bool {
        fn matches_condition(entity: &Value, condition: &Condition) -> bool {
            let Some(actual) = entity.get(&condition.field).and_then(Value::as_str) else {
                return false;
            };
            match (&condition.op, &condition.value) {
                (FilterOp::Eq, FilterValue::String(expected)) => actual == expected,
                (FilterOp::Like, FilterValue::String(expected)) => actual.contains(expected.as_str()),
                _ => true,
            }
        }
        match filter {
            None => true,
            Some(Expr::Condition(c)) => matches_condition(entity, c),
            Some(Expr::And(parts)) => parts
                .iter()
                .all(|p| Self::matches_filter(entity, Some(p))),
        }
    }
}

#[async_trait]
impl ResourceRepository for InMemoryStore {
    async fn find_collection(
        &self,
        type_name: &str,
        criteria: &Criteria,
    ) -> Result<Slice<Value>, RepositoryError> {
        let mut items: Vec<Value> = self
            .all(type_name)
            .into_iter()
            .filter(|e| Self::matches_filter(e, criteria.filter.as_ref()))
            .collect();

        for key in criteria.sort.iter().rev() {
            items.sort_by(|a, b| {
                let left = a.get(&key.field).and_then(Value::as_str).unwrap_or("");
                let right = b.get(&key.field).and_then(Value::as_str).unwrap_or("");
                let ordering = left.cmp(right);
                match key.dir {
                    SortDir::Asc => ordering,
                    SortDir::Desc => ordering.reverse(),
                }
            });
        }

        let total = items.len() as u64;
        let paged: Vec<Value> = items
            .into_iter()
            .skip(criteria.page.offset() as usize)
            .take(criteria.page.size as usize)
            .collect();
        Ok(Slice::new(
            paged,
            criteria.page.number,
            criteria.page.size,
            total,
        ))
    }

    async fn find_one(
        &self,
        type_name: &str,
        id: &str,
        _criteria: &Criteria,
    ) -> Result<Option<Value>, RepositoryError> {
        Ok(self.get(type_name, id))
    }

    async fn find_related(
        &self,
        type_name: &str,
        relationship: &str,
        parent_ids: &[String],
    ) -> Result<Vec<Value>, RepositoryError> {
        let state = self.state.lock().unwrap();
        let parents = state.tables.get(type_name).cloned().unwrap_or_default();

        let mut target_ids: Vec<String> = Vec::new();
        for parent_id in parent_ids {
            let Some(parent) = parents.get(parent_id) else {
                continue;
            };
            match parent.get(relationship) {
                Some(Value::String(id)) => target_ids.push(id.clone()),
                Some(Value::Array(ids)) => {
                    target_ids.extend(ids.iter().filter_map(Value::as_str).map(str::to_string));
                }
                _ => {}
            }
        }
        let mut seen = std::collections::HashSet::new();
        target_ids.retain(|id| seen.insert(id.clone()));

        // The fixture names relationships after their target type except
        // for to-one `author`.
        let target_type = match relationship {
            "author" => "authors",
            other => other,
        };
        let table = state.tables.get(target_type).cloned().unwrap_or_default();
        Ok(target_ids
            .iter()
            .filter_map(|id| table.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl ResourcePersister for InMemoryStore {
    async fn create(
        &self,
        type_name: &str,
        change_set: &ChangeSet,
        client_id: Option<&str>,
    ) -> Result<Value, PersistError> {
        Self::validate(type_name, change_set)?;
        let id = client_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut state = self.state.lock().unwrap();
        let table = state.tables.entry(type_name.to_string()).or_default();
        if table.contains_key(&id) {
            return Err(PersistError::Conflict(format!("id '{id}' already exists")));
        }
        let mut entity = json!({"id": id});
        Self::apply_changeset(&mut entity, change_set);
        table.insert(id, entity.clone());
        Ok(entity)
    }

    async fn update(
        &self,
        type_name: &str,
        id: &str,
        change_set: &ChangeSet,
    ) -> Result<Value, PersistError> {
        Self::validate(type_name, change_set)?;
        let mut state = self.state.lock().unwrap();
        let entity = state
            .tables
            .get_mut(type_name)
            .and_then(|t| t.get_mut(id))
            .ok_or(PersistError::NotFound)?;
        Self::apply_changeset(entity, change_set);
        Ok(entity.clone())
    }

    async fn delete(&self, type_name: &str, id: &str) -> Result<(), PersistError> {
        let mut state = self.state.lock().unwrap();
        state
            .tables
            .get_mut(type_name)
            .and_then(|t| t.remove(id))
            .map(|_| ())
            .ok_or(PersistError::NotFound)
    }
}

#[async_trait]
impl RelationshipReader for InMemoryStore {
    async fn to_one_id(
        &self,
        type_name: &str,
        id: &str,
        relationship: &str,
    ) -> Result<Option<String>, RepositoryError> {
        Ok(self
            .get(type_name, id)
            .and_then(|e| e.get(relationship).and_then(Value::as_str).map(str::to_string)))
    }

    async fn to_many_ids(
        &self,
        type_name: &str,
        id: &str,
        relationship: &str,
        page: &PageSpec,
    ) -> Result<SliceIds, RepositoryError> {
        let ids: Vec<String> = self
            .get(type_name, id)
            .and_then(|e| e.get(relationship).and_then(Value::as_array).cloned())
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
        let total = ids.len() as u64;
        let paged = ids
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.size as usize)
            .collect();
        Ok(SliceIds::new(paged, total))
    }
}

#[async_trait]
impl RelationshipUpdater for InMemoryStore {
    async fn replace(
        &self,
        type_name: &str,
        id: &str,
        relationship: &str,
        target: &RelationshipPatch,
    ) -> Result<(), PersistError> {
        let mut state = self.state.lock().unwrap();
        let entity = state
            .tables
            .get_mut(type_name)
            .and_then(|t| t.get_mut(id))
            .ok_or(PersistError::NotFound)?;
        let value = match target {
            RelationshipPatch::ToOne(None) => Value::Null,
            RelationshipPatch::ToOne(Some(r)) => json!(r.id().unwrap()),
            RelationshipPatch::ToMany(refs) => {
                json!(refs.iter().filter_map(|r| r.id()).collect::<Vec<_>>())
            }
        };
        entity.as_object_mut().unwrap().insert(relationship.to_string(), value);
        Ok(())
    }

    async fn add(
        &self,
        type_name: &str,
        id: &str,
        relationship: &str,
        targets: &[ResourceIdentifier],
    ) -> Result<(), PersistError> {
        let mut state = self.state.lock().unwrap();
        let entity = state
            .tables
            .get_mut(type_name)
            .and_then(|t| t.get_mut(id))
            .ok_or(PersistError::NotFound)?;
        let object = entity.as_object_mut().unwrap();
        let mut ids: Vec<String> = object
            .get(relationship)
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        for target in targets {
            if !ids.contains(&target.id) {
                ids.push(target.id.clone());
            }
        }
        object.insert(relationship.to_string(), json!(ids));
        Ok(())
    }

    async fn remove(
        &self,
        type_name: &str,
        id: &str,
        relationship: &str,
        targets: &[ResourceIdentifier],
    ) -> Result<(), PersistError> {
        let mut state = self.state.lock().unwrap();
        let entity = state
            .tables
            .get_mut(type_name)
            .and_then(|t| t.get_mut(id))
            .ok_or(PersistError::NotFound)?;
        let object = entity.as_object_mut().unwrap();
        let ids: Vec<String> = object
            .get(relationship)
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let remaining: Vec<String> = ids
            .into_iter()
            .filter(|id| !targets.iter().any(|t| &t.id == id))
            .collect();
        object.insert(relationship.to_string(), json!(remaining));
        Ok(())
    }
}

#[async_trait]
impl ExistenceChecker for InMemoryStore {
    async fn exists(&self, type_name: &str, id: &str) -> Result<bool, RepositoryError> {
        Ok(self.get(type_name, id).is_some())
    }
}

#[async_trait]
impl TransactionManager for InMemoryStore {
    async fn begin(&self) -> Result<(), anyhow::Error> {
        let state = self.state.lock().unwrap().clone();
        *self.snapshot.lock().unwrap() = Some(state);
        Ok(())
    }

    async fn flush(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }

    async fn commit(&self) -> Result<(), anyhow::Error> {
        *self.snapshot.lock().unwrap() = None;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), anyhow::Error> {
        if let Some(snapshot) = self.snapshot.lock().unwrap().take() {
            *self.state.lock().unwrap() = snapshot;
        }
        Ok(())
    }
}

#[async_trait]
impl SurrogatePurger for InMemoryStore {
    async fn purge(&self, keys: &[String]) -> Result<(), anyhow::Error> {
        self.purged.lock().unwrap().push(keys.to_vec());
        Ok(())
    }
}

pub fn registry() -> ResourceRegistry {
    ResourceRegistry::builder()
        .register(
            ResourceMetadata::new("articles", "App\\Entity\\Article")
                .with_attribute(AttributeMetadata::new("title"))
                .with_attribute(
                    AttributeMetadata::new("createdAt")
                        .with_kind(AttrKind::DateTime)
                        .with_groups(SerializationGroups::read_only()),
                )
                .with_relationship(RelationshipMetadata::to_one("author", "authors").nullable())
                .with_relationship(RelationshipMetadata::to_many("tags", "tags"))
                .sortable(["title", "createdAt"])
                .filterable("title", [FilterOp::Eq, FilterOp::Like])
                .with_updated_at("updatedAt"),
        )
        .register(
            ResourceMetadata::new("authors", "App\\Entity\\Author")
                .with_attribute(AttributeMetadata::new("name"))
                .with_relationship(RelationshipMetadata::to_many("articles", "articles")),
        )
        .register(
            ResourceMetadata::new("tags", "App\\Entity\\Tag")
                .with_attribute(AttributeMetadata::new("label")),
        )
        .build()
        .expect("fixture registry is valid")
}

pub fn default_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config
        .write
        .client_generated_ids
        .insert("tags".to_string(), true);
    config
}

pub fn engine_with(config: EngineConfig) -> (JsonApiEngine, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::fixture());
    let engine = JsonApiEngine::builder()
        .registry(registry())
        .config(config)
        .repository(store.clone())
        .persister(store.clone())
        .relationship_reader(store.clone())
        .relationship_updater(store.clone())
        .existence_checker(store.clone())
        .transaction_manager(store.clone())
        .surrogate_purger(store.clone())
        .build()
        .expect("fixture engine builds");
    (engine, store)
}

pub fn engine() -> (JsonApiEngine, Arc<InMemoryStore>) {
    engine_with(default_config())
}

pub fn body_json(response: &jsonapi_engine::Response) -> Value {
    serde_json::from_slice(response.body.as_deref().unwrap_or(b"{}")).expect("JSON body")
}
