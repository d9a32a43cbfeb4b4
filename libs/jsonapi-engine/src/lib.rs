//! JSON:API 1.1 server engine.
//!
//! The engine turns an HTTP request (`RequestContext`) into a conformant
//! JSON:API response (`Response`) against a pluggable data layer. Hosts
//! construct it once with [`JsonApiEngine::builder`] — supplying resource
//! metadata, configuration, collaborator implementations, and optional
//! profiles — and then call [`JsonApiEngine::handle`] per request from any
//! number of threads. All per-request state lives on the call stack.
//!
//! Scope boundaries: storage, route generation for host frameworks,
//! authentication, and documentation emission belong to the host. The
//! engine owns media-type negotiation, query parsing, document
//! reading/building, compound-document expansion, preconditions, the
//! atomic-operations extension, and error mapping.

pub mod atomic;
pub mod builder;
pub mod canonical;
pub mod config;
pub mod error;
pub mod hooks;
pub mod include;
pub mod interfaces;
pub mod links;
pub mod negotiation;
pub mod ops;
pub mod pipeline;
pub mod preconditions;
pub mod property;
pub mod query;
pub mod reader;
pub mod registry;
pub mod request;
pub mod routing;
pub mod surrogate;

pub use config::{
    ChannelConfig, EngineConfig, LinkageMode, PreconditionsConfig, ProfilesConfig,
    WriteResponseMode,
};
pub use error::{Error, Rejection};
pub use hooks::Profile;
pub use interfaces::{
    ExistenceChecker, PersistError, RelationshipReader, RelationshipUpdater, RepositoryError,
    ResourcePersister, ResourceRepository, SurrogatePurger, TransactionManager, Violation,
};
pub use negotiation::{Negotiation, ProfileContext, ATOMIC_EXT};
pub use pipeline::{EngineBuilder, JsonApiEngine};
pub use registry::{
    AttrKind, AttributeMetadata, RegistryError, RelationshipMetadata, ResourceMetadata,
    ResourceRegistry, SerializationGroups,
};
pub use request::{RequestContext, Response};
