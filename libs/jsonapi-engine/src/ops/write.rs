//! Resource write endpoints: create, update, delete.
//!
//! Every write runs between `TransactionManager::begin` and
//! `commit`/`rollback`; preconditions are evaluated against the current
//! entity before the document is read.

use http::StatusCode;
use tracing::info;

use crate::error::{map_persist_error, Error, Rejection};
use crate::hooks::{DeletePhase, WritePhase};
use crate::links::LinkBuilder;
use crate::negotiation::Negotiation;
use crate::pipeline::JsonApiEngine;
use crate::preconditions;
use crate::property;
use crate::query::QueryParser;
use crate::reader::DocumentReader;
use crate::registry::WriteAccess;
use crate::request::{RequestContext, Response};
use crate::surrogate;

impl JsonApiEngine {
    pub(crate) async fn create_resource(
        &self,
        ctx: &RequestContext,
        type_name: &str,
        negotiation: &Negotiation,
    ) -> Result<Response, Rejection> {
        let meta = self.registry.get_by_type(type_name)?;
        let parser = QueryParser::new(&self.registry, &self.config);
        let criteria = parser.parse(meta, ctx.query())?;

        let body = DocumentReader::parse_json(ctx.body())?;
        let reader = DocumentReader::new(&self.config);
        let mut parsed = reader.read_resource(meta, &body, WriteAccess::Create, None, false)?;

        if let Some(client_id) = &parsed.client_id {
            let taken = self
                .existence
                .exists(type_name, client_id)
                .await
                .map_err(Error::from)?;
            if taken {
                return Err(Rejection::from(Error::Conflict {
                    detail: format!("id '{client_id}' is already taken"),
                    pointer: Some("/data/id".to_string()),
                }));
            }
        }

        let active = self.active_profiles(type_name, negotiation);
        active.each(|p| {
            p.on_before_create(&mut WritePhase {
                type_name,
                id: None,
                change_set: &mut parsed.change_set,
            })
        })?;

        self.check_linkage_targets(&parsed.change_set).await?;

        self.transactions.begin().await.map_err(Error::internal)?;
        let created = self
            .persister
            .create(type_name, &parsed.change_set, parsed.client_id.as_deref())
            .await;
        let entity = match created {
            Ok(entity) => entity,
            Err(err) => {
                self.rollback_quietly().await;
                return Err(Rejection::from(map_persist_error(meta, None, err)));
            }
        };
        self.transactions.commit().await.map_err(Error::internal)?;

        let id = property::id_of(&entity, meta).ok_or_else(|| {
            Error::internal(anyhow::anyhow!(
                "persister returned a '{type_name}' entity without an id"
            ))
        })?;
        info!(type_name, id = %id, "resource created");

        let mut document =
            self.document_builder()
                .single_document(meta, Some(&entity), &criteria, &[])?;
        self.run_document_phases(&active, &mut document)?;

        let keys = surrogate::write_keys(type_name, &id);
        self.purge_surrogates(&keys).await;

        let (etag, _) = self.entity_validators(meta, &entity)?;
        let location = LinkBuilder::new(&self.config).resource(meta, &id);
        Ok(
            Response::document(StatusCode::CREATED, &document, &negotiation.content_type)
                .with_header("location", &location)
                .with_header("etag", &etag)
                .with_header(
                    "surrogate-key",
                    &surrogate::header_value(&surrogate::document_keys(type_name, &document)),
                ),
        )
    }

    pub(crate) async fn update_resource(
        &self,
        ctx: &RequestContext,
        type_name: &str,
        id: &str,
        negotiation: &Negotiation,
    ) -> Result<Response, Rejection> {
        let meta = self.registry.get_by_type(type_name)?;
        let parser = QueryParser::new(&self.registry, &self.config);
        let criteria = parser.parse(meta, ctx.query())?;

        let current = self
            .repository
            .find_one(type_name, id, &self.neutral_criteria())
            .await
            .map_err(Error::from)?
            .ok_or_else(|| Error::resource_not_found(type_name, id))?;

        let (etag, last_modified) = self.entity_validators(meta, &current)?;
        preconditions::check_write(
            ctx,
            &etag,
            last_modified,
            self.config.preconditions.require_for_write,
        )?;

        let body = DocumentReader::parse_json(ctx.body())?;
        let reader = DocumentReader::new(&self.config);
        let mut parsed =
            reader.read_resource(meta, &body, WriteAccess::Update, Some(id), false)?;

        let active = self.active_profiles(type_name, negotiation);
        active.each(|p| {
            p.on_before_update(&mut WritePhase {
                type_name,
                id: Some(id),
                change_set: &mut parsed.change_set,
            })
        })?;

        self.check_linkage_targets(&parsed.change_set).await?;

        self.transactions.begin().await.map_err(Error::internal)?;
        let updated = self
            .persister
            .update(type_name, id, &parsed.change_set)
            .await;
        let entity = match updated {
            Ok(entity) => entity,
            Err(err) => {
                self.rollback_quietly().await;
                return Err(Rejection::from(map_persist_error(meta, Some(id), err)));
            }
        };
        self.transactions.commit().await.map_err(Error::internal)?;
        info!(type_name, id, "resource updated");

        let mut document =
            self.document_builder()
                .single_document(meta, Some(&entity), &criteria, &[])?;
        self.run_document_phases(&active, &mut document)?;

        let keys = surrogate::write_keys(type_name, id);
        self.purge_surrogates(&keys).await;

        let (etag, _) = self.entity_validators(meta, &entity)?;
        Ok(
            Response::document(StatusCode::OK, &document, &negotiation.content_type)
                .with_header("etag", &etag)
                .with_header(
                    "surrogate-key",
                    &surrogate::header_value(&surrogate::document_keys(type_name, &document)),
                ),
        )
    }

    pub(crate) async fn delete_resource(
        &self,
        ctx: &RequestContext,
        type_name: &str,
        id: &str,
        negotiation: &Negotiation,
    ) -> Result<Response, Rejection> {
        let meta = self.registry.get_by_type(type_name)?;

        let current = self
            .repository
            .find_one(type_name, id, &self.neutral_criteria())
            .await
            .map_err(Error::from)?
            .ok_or_else(|| Error::resource_not_found(type_name, id))?;

        let (etag, last_modified) = self.entity_validators(meta, &current)?;
        preconditions::check_write(
            ctx,
            &etag,
            last_modified,
            self.config.preconditions.require_for_write,
        )?;

        let active = self.active_profiles(type_name, negotiation);
        active.each(|p| p.on_before_delete(&mut DeletePhase { type_name, id }))?;

        self.transactions.begin().await.map_err(Error::internal)?;
        if let Err(err) = self.persister.delete(type_name, id).await {
            self.rollback_quietly().await;
            return Err(Rejection::from(map_persist_error(meta, Some(id), err)));
        }
        self.transactions.commit().await.map_err(Error::internal)?;
        info!(type_name, id, "resource deleted");

        self.purge_surrogates(&surrogate::write_keys(type_name, id))
            .await;
        Ok(Response::no_content())
    }

    pub(crate) async fn rollback_quietly(&self) {
        if let Err(err) = self.transactions.rollback().await {
            tracing::error!(error = %err, "transaction rollback failed");
        }
    }
}
