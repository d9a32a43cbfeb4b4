//! The pipeline controller: one engine value, one `handle` call per
//! request.
//!
//! `handle` never fails: every error path is mapped to a JSON:API error
//! document. The engine holds only immutable state (registry, config,
//! profiles, collaborator handles) and is safe to share across threads;
//! per-request values flow through the call graph.

use std::collections::BTreeSet;
use std::sync::Arc;

use http::Method;
use jsonapi_core::MEDIA_TYPE;
use thiserror::Error as ThisError;
use tracing::{debug, error, warn};

use crate::config::EngineConfig;
use crate::error::{Error, Rejection};
use crate::hooks::{HookDispatcher, Profile};
use crate::interfaces::{
    ExistenceChecker, RelationshipReader, RelationshipUpdater, ResourcePersister,
    ResourceRepository, SurrogatePurger, TransactionManager,
};
use crate::negotiation::Negotiator;
use crate::registry::ResourceRegistry;
use crate::request::{RequestContext, Response};
use crate::routing::{recognize, Route};

/// Failures constructing an engine.
#[derive(Debug, ThisError)]
pub enum EngineBuildError {
    #[error("engine requires a resource registry")]
    MissingRegistry,
    #[error("engine requires a {0} implementation")]
    MissingCollaborator(&'static str),
}

pub struct JsonApiEngine {
    pub(crate) registry: Arc<ResourceRegistry>,
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) hooks: HookDispatcher,
    pub(crate) known_profiles: BTreeSet<String>,
    pub(crate) repository: Arc<dyn ResourceRepository>,
    pub(crate) persister: Arc<dyn ResourcePersister>,
    pub(crate) relationship_reader: Arc<dyn RelationshipReader>,
    pub(crate) relationship_updater: Arc<dyn RelationshipUpdater>,
    pub(crate) existence: Arc<dyn ExistenceChecker>,
    pub(crate) transactions: Arc<dyn TransactionManager>,
    pub(crate) purger: Option<Arc<dyn SurrogatePurger>>,
}

impl JsonApiEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handles one request. Always returns a response; protocol errors
    /// become JSON:API error documents.
    pub async fn handle(&self, ctx: RequestContext) -> Response {
        debug!(method = %ctx.method(), path = ctx.path(), "dispatching request");
        match self.dispatch(&ctx).await {
            Ok(response) => response,
            Err(rejection) => {
                let status = rejection.status();
                if status.is_server_error() {
                    error!(
                        method = %ctx.method(),
                        path = ctx.path(),
                        status = status.as_u16(),
                        "request failed"
                    );
                } else {
                    warn!(
                        method = %ctx.method(),
                        path = ctx.path(),
                        status = status.as_u16(),
                        "request rejected"
                    );
                }
                let allow = rejection.allow_header();
                let mut response =
                    Response::document(status, &rejection.into_document(), MEDIA_TYPE);
                if let Some(allow) = allow {
                    response = response.with_header("allow", &allow);
                }
                response
            }
        }
    }

    async fn dispatch(&self, ctx: &RequestContext) -> Result<Response, Rejection> {
        let route = recognize(ctx.path(), &self.config).ok_or_else(|| {
            Rejection::from(Error::NotFound {
                detail: format!("no JSON:API route matches '{}'", ctx.path()),
                pointer: None,
            })
        })?;

        let negotiator = Negotiator::new(&self.config, &self.known_profiles);
        let negotiation = negotiator.negotiate(ctx, route.is_atomic(), route.name())?;

        match (&route, ctx.method().as_str()) {
            (Route::Collection { type_name }, "GET") => {
                self.get_collection(ctx, type_name, &negotiation).await
            }
            (Route::Collection { type_name }, "POST") => {
                self.create_resource(ctx, type_name, &negotiation).await
            }
            (Route::Collection { .. }, _) => {
                Err(method_not_allowed(&[Method::GET, Method::POST]))
            }

            (Route::Resource { type_name, id }, "GET") => {
                self.get_resource(ctx, type_name, id, &negotiation).await
            }
            (Route::Resource { type_name, id }, "PATCH") => {
                self.update_resource(ctx, type_name, id, &negotiation).await
            }
            (Route::Resource { type_name, id }, "DELETE") => {
                self.delete_resource(ctx, type_name, id, &negotiation).await
            }
            (Route::Resource { .. }, _) => Err(method_not_allowed(&[
                Method::GET,
                Method::PATCH,
                Method::DELETE,
            ])),

            (
                Route::Relationship {
                    type_name,
                    id,
                    relationship,
                },
                "GET",
            ) => {
                self.get_relationship(ctx, type_name, id, relationship, &negotiation)
                    .await
            }
            (
                Route::Relationship {
                    type_name,
                    id,
                    relationship,
                },
                "PATCH" | "POST" | "DELETE",
            ) => {
                if !self.config.write.allow_relationship_writes {
                    return Err(method_not_allowed(&[Method::GET]));
                }
                self.write_relationship(
                    ctx,
                    type_name,
                    id,
                    relationship,
                    ctx.method(),
                    &negotiation,
                )
                .await
            }
            (Route::Relationship { .. }, _) => {
                let mut allow = vec![Method::GET];
                if self.config.write.allow_relationship_writes {
                    allow.extend([Method::PATCH, Method::POST, Method::DELETE]);
                }
                Err(method_not_allowed(&allow))
            }

            (
                Route::Related {
                    type_name,
                    id,
                    relationship,
                },
                "GET",
            ) => {
                self.get_related(ctx, type_name, id, relationship, &negotiation)
                    .await
            }
            (Route::Related { .. }, _) => Err(method_not_allowed(&[Method::GET])),

            (Route::Atomic, "POST") => self.atomic_operations(ctx, &negotiation).await,
            (Route::Atomic, _) => Err(method_not_allowed(&[Method::POST])),
        }
    }
}

fn method_not_allowed(allow: &[Method]) -> Rejection {
    Rejection::from(Error::MethodNotAllowed {
        allow: allow.to_vec(),
    })
}

#[derive(Default)]
pub struct EngineBuilder {
    registry: Option<ResourceRegistry>,
    config: EngineConfig,
    profiles: Vec<Arc<dyn Profile>>,
    repository: Option<Arc<dyn ResourceRepository>>,
    persister: Option<Arc<dyn ResourcePersister>>,
    relationship_reader: Option<Arc<dyn RelationshipReader>>,
    relationship_updater: Option<Arc<dyn RelationshipUpdater>>,
    existence: Option<Arc<dyn ExistenceChecker>>,
    transactions: Option<Arc<dyn TransactionManager>>,
    purger: Option<Arc<dyn SurrogatePurger>>,
}

impl EngineBuilder {
    pub fn registry(mut self, registry: ResourceRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a profile; registration order is hook invocation order.
    pub fn profile(mut self, profile: Arc<dyn Profile>) -> Self {
        self.profiles.push(profile);
        self
    }

    pub fn repository(mut self, repository: Arc<dyn ResourceRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn persister(mut self, persister: Arc<dyn ResourcePersister>) -> Self {
        self.persister = Some(persister);
        self
    }

    pub fn relationship_reader(mut self, reader: Arc<dyn RelationshipReader>) -> Self {
        self.relationship_reader = Some(reader);
        self
    }

    pub fn relationship_updater(mut self, updater: Arc<dyn RelationshipUpdater>) -> Self {
        self.relationship_updater = Some(updater);
        self
    }

    pub fn existence_checker(mut self, existence: Arc<dyn ExistenceChecker>) -> Self {
        self.existence = Some(existence);
        self
    }

    pub fn transaction_manager(mut self, transactions: Arc<dyn TransactionManager>) -> Self {
        self.transactions = Some(transactions);
        self
    }

    pub fn surrogate_purger(mut self, purger: Arc<dyn SurrogatePurger>) -> Self {
        self.purger = Some(purger);
        self
    }

    pub fn build(self) -> Result<JsonApiEngine, EngineBuildError> {
        let registry = self.registry.ok_or(EngineBuildError::MissingRegistry)?;
        let hooks = HookDispatcher::new(self.profiles);
        let known_profiles = hooks.known_uris();
        Ok(JsonApiEngine {
            registry: Arc::new(registry),
            config: Arc::new(self.config),
            hooks,
            known_profiles,
            repository: self
                .repository
                .ok_or(EngineBuildError::MissingCollaborator("ResourceRepository"))?,
            persister: self
                .persister
                .ok_or(EngineBuildError::MissingCollaborator("ResourcePersister"))?,
            relationship_reader: self.relationship_reader.ok_or(
                EngineBuildError::MissingCollaborator("RelationshipReader"),
            )?,
            relationship_updater: self.relationship_updater.ok_or(
                EngineBuildError::MissingCollaborator("RelationshipUpdater"),
            )?,
            existence: self
                .existence
                .ok_or(EngineBuildError::MissingCollaborator("ExistenceChecker"))?,
            transactions: self
                .transactions
                .ok_or(EngineBuildError::MissingCollaborator("TransactionManager"))?,
            purger: self.purger,
        })
    }
}
