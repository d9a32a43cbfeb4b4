//! Per-endpoint operations (the CRUD dispatcher).
//!
//! Read endpoints live in [`read`], resource writes in [`write`],
//! relationship endpoints in [`relationship`]. Shared plumbing — hook
//! invocation over a built document, linkage-target existence checks, and
//! surrogate purging — lives here.

mod read;
mod relationship;
mod write;

use chrono::{DateTime, Utc};
use jsonapi_core::{ChangeSet, Criteria, Document, IncludeTree, PageSpec, PrimaryData};
use serde_json::Value;
use tracing::warn;

use crate::builder::DocumentBuilder;
use crate::error::Error;
use crate::hooks::{ActiveProfiles, LinksPhase, MetaPhase, RelationshipsPhase};
use crate::negotiation::Negotiation;
use crate::pipeline::JsonApiEngine;
use crate::preconditions;
use crate::registry::ResourceMetadata;

impl JsonApiEngine {
    pub(crate) fn active_profiles(
        &self,
        type_name: &str,
        negotiation: &Negotiation,
    ) -> ActiveProfiles {
        self.hooks
            .active(&self.config, type_name, &negotiation.profiles)
    }

    pub(crate) fn document_builder(&self) -> DocumentBuilder<'_> {
        DocumentBuilder::new(&self.registry, &self.config)
    }

    /// Criteria with only the configured pagination defaults, used when
    /// serializing outside a parsed request (validators, atomic results).
    pub(crate) fn neutral_criteria(&self) -> Criteria {
        Criteria::with_page(PageSpec::new(1, self.config.pagination.default_size))
    }

    /// Runs the document-level hook phases over a built document:
    /// `onResourceRelationships` for every carried resource, then
    /// `onTopLevelLinks` and `onTopLevelMeta`.
    pub(crate) fn run_document_phases(
        &self,
        active: &ActiveProfiles,
        document: &mut Document,
    ) -> Result<(), Error> {
        if active.is_empty() {
            return Ok(());
        }

        let run_resource = |resource: &mut jsonapi_core::ResourceObject| {
            let mut phase = RelationshipsPhase {
                type_name: &resource.type_name,
                id: &resource.id,
                relationships: &mut resource.relationships,
            };
            active.each(|p| p.on_resource_relationships(&mut phase))
        };
        match document.data.as_mut() {
            Some(PrimaryData::One(Some(resource))) => run_resource(resource)?,
            Some(PrimaryData::Many(resources)) => {
                for resource in resources {
                    run_resource(resource)?;
                }
            }
            _ => {}
        }
        for resource in &mut document.included {
            run_resource(resource)?;
        }

        if let Some(links) = document.links.as_mut() {
            let mut phase = LinksPhase { links };
            active.each(|p| p.on_top_level_links(&mut phase))?;
        }

        let mut meta = document.meta.take().unwrap_or_default();
        let mut phase = MetaPhase { meta: &mut meta };
        active.each(|p| p.on_top_level_meta(&mut phase))?;
        if !meta.is_empty() {
            document.meta = Some(meta);
        }
        Ok(())
    }

    /// Verifies that every relationship target named by the change set
    /// exists; a missing target is a 404 pointed at the linkage.
    pub(crate) async fn check_linkage_targets(
        &self,
        change_set: &ChangeSet,
    ) -> Result<(), Error> {
        for (name, target) in &change_set.to_one {
            if let Some(target) = target {
                self.check_target_exists(target, &format!("/data/relationships/{name}/data"))
                    .await?;
            }
        }
        for (name, targets) in &change_set.to_many {
            for (i, target) in targets.iter().enumerate() {
                self.check_target_exists(target, &format!("/data/relationships/{name}/data/{i}"))
                    .await?;
            }
        }
        Ok(())
    }

    pub(crate) async fn check_target_exists(
        &self,
        target: &jsonapi_core::ResourceRef,
        pointer: &str,
    ) -> Result<(), Error> {
        // Lids are resolved to real ids before this point on every path.
        let Some(id) = target.id() else {
            return Err(Error::UnknownLid {
                lid: target.lid().unwrap_or_default().to_string(),
                pointer: pointer.to_string(),
            });
        };
        let exists = self
            .existence
            .exists(&target.type_name, id)
            .await
            .map_err(Error::from)?;
        if exists {
            Ok(())
        } else {
            Err(Error::NotFound {
                detail: format!("resource '{}:{id}' does not exist", target.type_name),
                pointer: Some(pointer.to_string()),
            })
        }
    }

    /// Best-effort surrogate purge; failures are logged, not surfaced.
    pub(crate) async fn purge_surrogates(&self, keys: &[String]) {
        if let Some(purger) = &self.purger {
            if let Err(err) = purger.purge(keys).await {
                warn!(error = %err, "surrogate purge failed");
            }
        }
    }

    /// The validators of one entity: strong ETag over its full canonical
    /// serialization plus its last-modified timestamp.
    pub(crate) fn entity_validators(
        &self,
        meta: &ResourceMetadata,
        entity: &Value,
    ) -> Result<(String, Option<DateTime<Utc>>), Error> {
        let resource = self.document_builder().resource_object(
            meta,
            entity,
            &self.neutral_criteria(),
            &IncludeTree::default(),
        )?;
        Ok((
            preconditions::strong_etag(&resource),
            preconditions::last_modified(meta, entity),
        ))
    }
}
