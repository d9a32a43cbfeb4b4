//! Read endpoints: collection, single resource, related, and relationship
//! linkage.

use http::StatusCode;
use jsonapi_core::{Link, Links, PrimaryData, ResourceObject, Slice};
use serde_json::Value;
use tracing::info;

use crate::error::{Error, Rejection};
use crate::hooks::{
    FindCollectionPhase, FindOnePhase, QueryPhase, RelationshipReadPhase,
};
use crate::include::IncludeEngine;
use crate::negotiation::Negotiation;
use crate::pipeline::JsonApiEngine;
use crate::preconditions;
use crate::query::QueryParser;
use crate::request::{RequestContext, Response};
use crate::surrogate;

impl JsonApiEngine {
    pub(crate) async fn get_collection(
        &self,
        ctx: &RequestContext,
        type_name: &str,
        negotiation: &Negotiation,
    ) -> Result<Response, Rejection> {
        let meta = self.registry.get_by_type(type_name)?;
        let parser = QueryParser::new(&self.registry, &self.config);
        let mut criteria = parser.parse(meta, ctx.query())?;

        let active = self.active_profiles(type_name, negotiation);
        active.each(|p| {
            p.on_parse_query(&mut QueryPhase {
                type_name,
                criteria: &mut criteria,
            })
        })?;
        active.each(|p| {
            p.on_before_find_collection(&mut FindCollectionPhase {
                type_name,
                criteria: &mut criteria,
            })
        })?;

        let slice = self
            .repository
            .find_collection(type_name, &criteria)
            .await
            .map_err(Error::from)?;
        info!(
            type_name,
            items = slice.items.len(),
            total = slice.total_items,
            "collection loaded"
        );

        let include_engine =
            IncludeEngine::new(&self.registry, self.repository.as_ref(), &self.config);
        let included = include_engine
            .expand(meta, &slice.items, &criteria.include)
            .await?;

        let mut document = self.document_builder().collection_document(
            meta,
            &slice,
            &criteria,
            ctx.query(),
            &included,
        )?;
        self.run_document_phases(&active, &mut document)?;

        let resources = collection_resources(&document);
        let etag = preconditions::collection_etag(
            resources,
            self.config.preconditions.weak_for_collections,
        );
        let last_modified = preconditions::max_last_modified(meta, &slice.items);
        if preconditions::not_modified(ctx, &etag, last_modified) {
            return Ok(Response::not_modified().with_header("etag", &etag));
        }

        let keys = surrogate::document_keys(type_name, &document);
        let mut response = Response::document(StatusCode::OK, &document, &negotiation.content_type)
            .with_header("etag", &etag)
            .with_header("surrogate-key", &surrogate::header_value(&keys));
        if let Some(lm) = last_modified {
            response = response.with_header("last-modified", &preconditions::http_date(lm));
        }
        Ok(response)
    }

    pub(crate) async fn get_resource(
        &self,
        ctx: &RequestContext,
        type_name: &str,
        id: &str,
        negotiation: &Negotiation,
    ) -> Result<Response, Rejection> {
        let meta = self.registry.get_by_type(type_name)?;
        let parser = QueryParser::new(&self.registry, &self.config);
        let mut criteria = parser.parse(meta, ctx.query())?;

        let active = self.active_profiles(type_name, negotiation);
        active.each(|p| {
            p.on_parse_query(&mut QueryPhase {
                type_name,
                criteria: &mut criteria,
            })
        })?;
        active.each(|p| {
            p.on_before_find_one(&mut FindOnePhase {
                type_name,
                id,
                criteria: &mut criteria,
            })
        })?;

        let entity = self
            .repository
            .find_one(type_name, id, &criteria)
            .await
            .map_err(Error::from)?
            .ok_or_else(|| Error::resource_not_found(type_name, id))?;

        let include_engine =
            IncludeEngine::new(&self.registry, self.repository.as_ref(), &self.config);
        let included = include_engine
            .expand(meta, std::slice::from_ref(&entity), &criteria.include)
            .await?;

        let mut document = self.document_builder().single_document(
            meta,
            Some(&entity),
            &criteria,
            &included,
        )?;
        self.run_document_phases(&active, &mut document)?;

        let (etag, last_modified) = self.entity_validators(meta, &entity)?;
        if preconditions::not_modified(ctx, &etag, last_modified) {
            return Ok(Response::not_modified().with_header("etag", &etag));
        }

        let keys = surrogate::document_keys(type_name, &document);
        let mut response = Response::document(StatusCode::OK, &document, &negotiation.content_type)
            .with_header("etag", &etag)
            .with_header("surrogate-key", &surrogate::header_value(&keys));
        if let Some(lm) = last_modified {
            response = response.with_header("last-modified", &preconditions::http_date(lm));
        }
        Ok(response)
    }

    /// The related endpoint: resolves the relationship and serializes the
    /// result as primary data of the target type, with the target type's
    /// pagination defaults.
    pub(crate) async fn get_related(
        &self,
        ctx: &RequestContext,
        type_name: &str,
        id: &str,
        relationship: &str,
        negotiation: &Negotiation,
    ) -> Result<Response, Rejection> {
        let meta = self.registry.get_by_type(type_name)?;
        let rel = meta
            .relationship(relationship)
            .ok_or_else(|| relationship_not_found(type_name, relationship))?;
        let target_meta = self.registry.get_by_type(rel.target())?;

        // The query is interpreted against the target type.
        let parser = QueryParser::new(&self.registry, &self.config);
        let criteria = parser.parse(target_meta, ctx.query())?;

        self.check_parent_exists(type_name, id).await?;

        let entities = self
            .repository
            .find_related(type_name, relationship, &[id.to_string()])
            .await
            .map_err(Error::from)?;

        let active = self.active_profiles(rel.target(), negotiation);
        let include_engine =
            IncludeEngine::new(&self.registry, self.repository.as_ref(), &self.config);
        let builder = self.document_builder();
        let related_url = crate::links::LinkBuilder::new(&self.config)
            .relationship_related(meta, id, relationship);

        let mut document = if rel.to_many {
            let total = entities.len() as u64;
            let offset = criteria.page.offset() as usize;
            let page: Vec<Value> = entities
                .iter()
                .skip(offset)
                .take(criteria.page.size as usize)
                .cloned()
                .collect();
            let included = include_engine
                .expand(target_meta, &page, &criteria.include)
                .await?;
            let slice = Slice::new(page, criteria.page.number, criteria.page.size, total);
            let mut doc = builder.collection_document(
                target_meta,
                &slice,
                &criteria,
                ctx.query(),
                &included,
            )?;
            // Pagination links would name the target collection; the
            // canonical address of this document is the related URL.
            let mut links = Links::new();
            links.insert("self".to_string(), Link::Href(related_url));
            doc.links = Some(links);
            doc
        } else {
            let entity = entities.first();
            let included = match entity {
                Some(entity) => {
                    include_engine
                        .expand(target_meta, std::slice::from_ref(entity), &criteria.include)
                        .await?
                }
                None => Vec::new(),
            };
            let mut doc = builder.single_document(target_meta, entity, &criteria, &included)?;
            let mut links = Links::new();
            links.insert("self".to_string(), Link::Href(related_url));
            doc.links = Some(links);
            doc
        };
        self.run_document_phases(&active, &mut document)?;

        let keys = surrogate::document_keys(rel.target(), &document);
        Ok(
            Response::document(StatusCode::OK, &document, &negotiation.content_type)
                .with_header("surrogate-key", &surrogate::header_value(&keys)),
        )
    }

    /// `GET /{type}/{id}/relationships/{rel}`: the linkage document.
    pub(crate) async fn get_relationship(
        &self,
        ctx: &RequestContext,
        type_name: &str,
        id: &str,
        relationship: &str,
        negotiation: &Negotiation,
    ) -> Result<Response, Rejection> {
        let meta = self.registry.get_by_type(type_name)?;
        let rel = meta
            .relationship(relationship)
            .ok_or_else(|| relationship_not_found(type_name, relationship))?;

        let parser = QueryParser::new(&self.registry, &self.config);
        let criteria = parser.parse(meta, ctx.query())?;
        let mut page = criteria.page;

        let active = self.active_profiles(type_name, negotiation);
        active.each(|p| {
            p.on_before_relationship_read(&mut RelationshipReadPhase {
                type_name,
                id,
                relationship,
                page: &mut page,
            })
        })?;

        self.check_parent_exists(type_name, id).await?;

        let document = if rel.to_many {
            let slice = self
                .relationship_reader
                .to_many_ids(type_name, id, relationship, &page)
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

        let keys = surrogate::document_keys(type_name, &document);
        Ok(
            Response::document(StatusCode::OK, &document, &negotiation.content_type)
                .with_header("surrogate-key", &surrogate::header_value(&keys)),
        )
    }

    pub(crate) async fn check_parent_exists(
        &self,
        type_name: &str,
        id: &str,
    ) -> Result<(), Error> {
        let exists = self
            .existence
            .exists(type_name, id)
            .await
            .map_err(Error::from)?;
        if exists {
            Ok(())
        } else {
            Err(Error::resource_not_found(type_name, id))
        }
    }
}

fn relationship_not_found(type_name: &str, relationship: &str) -> Error {
    Error::NotFound {
        detail: format!("'{type_name}' has no relationship '{relationship}'"),
        pointer: None,
    }
}

/// The resource objects of a collection document, for validator hashing.
fn collection_resources(document: &jsonapi_core::Document) -> &[ResourceObject] {
    match document.data.as_ref() {
        Some(PrimaryData::Many(resources)) => resources,
        _ => &[],
    }
}
