//! Collaborator contracts the engine requires from its host.
//!
//! Entities cross these boundaries as `serde_json::Value` objects; the
//! engine reads them through property paths and never mutates them. Only
//! these calls may block on I/O.

use async_trait::async_trait;
use jsonapi_core::{
    ChangeSet, Criteria, PageSpec, RelationshipPatch, ResourceIdentifier, Slice, SliceIds,
};
use serde_json::Value;
use thiserror::Error;

/// Read-side failures.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// One validation failure from the host validator, addressed by the
/// entity-side property path (e.g. `title` or `author`).
#[derive(Debug, Clone)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Write-side failures.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("validation failed")]
    Validation(Vec<Violation>),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Loads entities for the read path.
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    async fn find_collection(
        &self,
        type_name: &str,
        criteria: &Criteria,
    ) -> Result<Slice<Value>, RepositoryError>;

    async fn find_one(
        &self,
        type_name: &str,
        id: &str,
        criteria: &Criteria,
    ) -> Result<Option<Value>, RepositoryError>;

    /// Batch-loads the entities related to `parent_ids` through
    /// `relationship`, for compound-document expansion.
    async fn find_related(
        &self,
        type_name: &str,
        relationship: &str,
        parent_ids: &[String],
    ) -> Result<Vec<Value>, RepositoryError>;
}

/// Applies change sets.
#[async_trait]
pub trait ResourcePersister: Send + Sync {
    async fn create(
        &self,
        type_name: &str,
        change_set: &ChangeSet,
        client_id: Option<&str>,
    ) -> Result<Value, PersistError>;

    async fn update(
        &self,
        type_name: &str,
        id: &str,
        change_set: &ChangeSet,
    ) -> Result<Value, PersistError>;

    async fn delete(&self, type_name: &str, id: &str) -> Result<(), PersistError>;
}

/// Reads relationship linkage for the relationship endpoints.
#[async_trait]
pub trait RelationshipReader: Send + Sync {
    async fn to_one_id(
        &self,
        type_name: &str,
        id: &str,
        relationship: &str,
    ) -> Result<Option<String>, RepositoryError>;

    async fn to_many_ids(
        &self,
        type_name: &str,
        id: &str,
        relationship: &str,
        page: &PageSpec,
    ) -> Result<SliceIds, RepositoryError>;
}

/// Writes relationship linkage for the relationship endpoints.
#[async_trait]
pub trait RelationshipUpdater: Send + Sync {
    /// Replaces the linkage (to-one target or full to-many set).
    async fn replace(
        &self,
        type_name: &str,
        id: &str,
        relationship: &str,
        target: &RelationshipPatch,
    ) -> Result<(), PersistError>;

    /// Adds members to a to-many relationship.
    async fn add(
        &self,
        type_name: &str,
        id: &str,
        relationship: &str,
        targets: &[ResourceIdentifier],
    ) -> Result<(), PersistError>;

    /// Removes members from a to-many relationship.
    async fn remove(
        &self,
        type_name: &str,
        id: &str,
        relationship: &str,
        targets: &[ResourceIdentifier],
    ) -> Result<(), PersistError>;
}

/// Cheap existence probe used for client-generated-id conflicts and
/// relationship-target checks.
#[async_trait]
pub trait ExistenceChecker: Send + Sync {
    async fn exists(&self, type_name: &str, id: &str) -> Result<bool, RepositoryError>;
}

/// Transaction boundary around the write path. The engine drives the
/// protocol explicitly: `begin` before the first write, `flush` between
/// atomic operations so later ones observe earlier results, then exactly
/// one of `commit`/`rollback`. Must provide read-your-writes between
/// `begin` and `commit`.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    async fn begin(&self) -> Result<(), anyhow::Error>;
    async fn flush(&self) -> Result<(), anyhow::Error>;
    async fn commit(&self) -> Result<(), anyhow::Error>;
    async fn rollback(&self) -> Result<(), anyhow::Error>;
}

/// Host-side cache invalidation, fed with surrogate keys on write success.
#[async_trait]
pub trait SurrogatePurger: Send + Sync {
    async fn purge(&self, keys: &[String]) -> Result<(), anyhow::Error>;
}
