//! Relationship write endpoints: replace, add, remove.
//!
//! `PATCH` replaces linkage for either arity; `POST` and `DELETE` are
//! to-many only. The response shape follows `relationships.write_response`.

use http::{Method, StatusCode};
use jsonapi_core::{RelationshipPatch, ResourceIdentifier};
use tracing::info;

use crate::error::{map_persist_error, Error, Rejection};
use crate::negotiation::Negotiation;
use crate::pipeline::JsonApiEngine;
use crate::reader::DocumentReader;
use crate::request::{RequestContext, Response};
use crate::surrogate;
use crate::config::WriteResponseMode;

impl JsonApiEngine {
    pub(crate) async fn write_relationship(
        &self,
        ctx: &RequestContext,
        type_name: &str,
        id: &str,
        relationship: &str,
        method: &Method,
        negotiation: &Negotiation,
    ) -> Result<Response, Rejection> {
        let meta = self.registry.get_by_type(type_name)?;
        let rel = meta.relationship(relationship).ok_or_else(|| Error::NotFound {
            detail: format!("'{type_name}' has no relationship '{relationship}'"),
            pointer: None,
        })?;

        // add/remove only make sense against a to-many relationship.
        if !rel.to_many && (method == Method::POST || method == Method::DELETE) {
            return Err(Rejection::from(Error::MethodNotAllowed {
                allow: vec![Method::GET, Method::PATCH],
            }));
        }

        self.check_parent_exists(type_name, id).await?;

        let body = DocumentReader::parse_json(ctx.body())?;
        let reader = DocumentReader::new(&self.config);
        let patch = reader.read_relationship(rel, &body, false)?;

        for (i, target) in patch.refs().iter().enumerate() {
            let pointer = if rel.to_many {
                format!("/data/{i}")
            } else {
                "/data".to_string()
            };
            self.check_target_exists(target, &pointer).await?;
        }

        self.transactions.begin().await.map_err(Error::internal)?;
        let outcome = match method.as_str() {
            "PATCH" => {
                self.relationship_updater
                    .replace(type_name, id, relationship, &patch)
                    .await
            }
            "POST" => {
                self.relationship_updater
                    .add(type_name, id, relationship, &identifiers(&patch))
                    .await
            }
            _ => {
                self.relationship_updater
                    .remove(type_name, id, relationship, &identifiers(&patch))
                    .await
            }
        };
        if let Err(err) = outcome {
            self.rollback_quietly().await;
            return Err(Rejection::from(map_persist_error(meta, Some(id), err)));
        }
        self.transactions.commit().await.map_err(Error::internal)?;
        info!(type_name, id, relationship, method = %method, "relationship written");

        self.purge_surrogates(&surrogate::write_keys(type_name, id))
            .await;

        match self.config.relationships.write_response {
            WriteResponseMode::NoContent => Ok(Response::no_content()),
            WriteResponseMode::Linkage => {
                // Re-read so the response reflects post-write linkage.
                let document = if rel.to_many {
                    let slice = self
                        .relationship_reader
                        .to_many_ids(type_name, id, relationship, &self.neutral_criteria().page)
                        .await
                        .map_err(Error::from)?;
                    self.document_builder()
                        .to_many_linkage_document(meta, id, rel, &slice)
                } else {
                    let target_id = self
                        .relationship_reader
                        .to_one_id(type_name, id, relationship)
                        .await
                        .map_err(Error::from)?;
                    self.document_builder()
                        .to_one_linkage_document(meta, id, rel, target_id)
                };
                Ok(Response::document(
                    StatusCode::OK,
                    &document,
                    &negotiation.content_type,
                ))
            }
        }
    }
}

/// Write targets as wire identifiers; the reader guarantees real ids here.
fn identifiers(patch: &RelationshipPatch) -> Vec<ResourceIdentifier> {
    patch
        .refs()
        .iter()
        .filter_map(|r| r.to_identifier())
        .collect()
}
