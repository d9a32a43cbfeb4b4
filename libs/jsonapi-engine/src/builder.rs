//! Outbound document assembly.
//!
//! Serializes entities to resource objects (attribute order follows
//! metadata declaration order), attaches relationship links and linkage
//! per the configured mode, applies sparse fieldsets, and assembles
//! single/collection/linkage documents with their top-level links and
//! meta. Include expansion itself lives in [`crate::include`]; the builder
//! consumes its output.

use jsonapi_core::{
    Criteria, Document, IncludeTree, Link, Linkage, Links, PrimaryData, RelationshipObject,
    ResourceIdentifier, ResourceObject, Slice, SliceIds,
};
use serde_json::{Map, Value};

use crate::config::{EngineConfig, LinkageMode};
use crate::error::Error;
use crate::include::IncludedResource;
use crate::links::LinkBuilder;
use crate::preconditions::rfc3339;
use crate::property;
use crate::registry::{RelationshipMetadata, ResourceMetadata, ResourceRegistry};

pub struct DocumentBuilder<'a> {
    registry: &'a ResourceRegistry,
    config: &'a EngineConfig,
}

impl<'a> DocumentBuilder<'a> {
    pub fn new(registry: &'a ResourceRegistry, config: &'a EngineConfig) -> Self {
        Self { registry, config }
    }

    fn links(&self) -> LinkBuilder<'a> {
        LinkBuilder::new(self.config)
    }

    /// Serializes one entity as a resource object. `include` is the include
    /// sub-tree applicable at this resource's position in the document.
    pub fn resource_object(
        &self,
        meta: &ResourceMetadata,
        entity: &Value,
        criteria: &Criteria,
        include: &IncludeTree,
    ) -> Result<ResourceObject, Error> {
        self.build_resource(meta, entity, criteria, include, false)
    }

    /// Like [`Self::resource_object`], but always carries relationship
    /// linkage regardless of the configured mode. Atomic results use this
    /// so a batch's linkage is observable without a follow-up read.
    pub fn resource_object_with_linkage(
        &self,
        meta: &ResourceMetadata,
        entity: &Value,
        criteria: &Criteria,
    ) -> Result<ResourceObject, Error> {
        self.build_resource(meta, entity, criteria, &IncludeTree::default(), true)
    }

    fn build_resource(
        &self,
        meta: &ResourceMetadata,
        entity: &Value,
        criteria: &Criteria,
        include: &IncludeTree,
        force_linkage: bool,
    ) -> Result<ResourceObject, Error> {
        let id = property::id_of(entity, meta).ok_or_else(|| {
            Error::internal(anyhow::anyhow!(
                "entity of type '{}' has no id at '{}'",
                meta.type_name,
                meta.id_property_path
            ))
        })?;

        let fieldset = criteria.fieldset(&meta.type_name);
        let mut resource = ResourceObject::new(meta.type_name.clone(), id.clone());

        if meta.expose_id {
            resource
                .attributes
                .insert("id".to_string(), Value::String(id.clone()));
        }

        for attr in &meta.attributes {
            if !attr.groups.readable() {
                continue;
            }
            if fieldset.is_some_and(|set| !set.contains(&attr.name)) {
                continue;
            }
            let Some(value) = property::get_path(entity, &attr.property_path) else {
                continue;
            };
            resource
                .attributes
                .insert(attr.name.clone(), normalize_attribute(attr, value));
        }

        for rel in &meta.relationships {
            if fieldset.is_some_and(|set| !set.contains(&rel.name)) {
                continue;
            }
            let mut links = Links::new();
            links.insert(
                "self".to_string(),
                Link::Href(self.links().relationship_self(meta, &id, &rel.name)),
            );
            links.insert(
                "related".to_string(),
                Link::Href(self.links().relationship_related(meta, &id, &rel.name)),
            );

            let data = if force_linkage {
                linkage_from_entity(rel, entity)
            } else {
                match self.config.relationships.linkage_in_resource {
                    LinkageMode::Always => linkage_from_entity(rel, entity),
                    LinkageMode::WhenIncluded if include.contains(&rel.name) => {
                        linkage_from_entity(rel, entity)
                    }
                    _ => None,
                }
            };

            resource.relationships.insert(
                rel.name.clone(),
                RelationshipObject {
                    links: Some(links),
                    data,
                    meta: None,
                },
            );
        }

        let mut links = Links::new();
        links.insert(
            "self".to_string(),
            Link::Href(self.links().resource(meta, &id)),
        );
        resource.links = Some(links);

        Ok(resource)
    }

    fn included_objects(
        &self,
        criteria: &Criteria,
        included: &[IncludedResource],
    ) -> Result<Vec<ResourceObject>, Error> {
        included
            .iter()
            .map(|inc| {
                let meta = self.registry.get_by_type(&inc.type_name)?;
                self.resource_object(meta, &inc.entity, criteria, &inc.include)
            })
            .collect()
    }

    /// A collection document with pagination links and a `total` meta.
    pub fn collection_document(
        &self,
        meta: &ResourceMetadata,
        slice: &Slice<Value>,
        criteria: &Criteria,
        raw_query: &str,
        included: &[IncludedResource],
    ) -> Result<Document, Error> {
        let primary = slice
            .items
            .iter()
            .map(|entity| self.resource_object(meta, entity, criteria, &criteria.include))
            .collect::<Result<Vec<_>, _>>()?;

        let mut links = self.links().pagination(meta, raw_query, slice);
        links.insert(
            "self".to_string(),
            Link::Href(self.links().collection_with_query(meta, raw_query)),
        );

        let mut top_meta = Map::new();
        top_meta.insert("total".to_string(), Value::from(slice.total_items));

        let mut doc = Document::versioned();
        doc.data = Some(PrimaryData::Many(primary));
        doc.included = self.included_objects(criteria, included)?;
        doc.links = Some(links);
        doc.meta = Some(top_meta);
        Ok(doc)
    }

    /// A single-resource document (`data` may be null on related-to-one).
    pub fn single_document(
        &self,
        meta: &ResourceMetadata,
        entity: Option<&Value>,
        criteria: &Criteria,
        included: &[IncludedResource],
    ) -> Result<Document, Error> {
        let primary = entity
            .map(|e| self.resource_object(meta, e, criteria, &criteria.include))
            .transpose()?;

        let mut doc = Document::versioned();
        if let Some(res) = &primary {
            let mut links = Links::new();
            links.insert(
                "self".to_string(),
                Link::Href(self.links().resource(meta, &res.id)),
            );
            doc.links = Some(links);
        }
        doc.data = Some(PrimaryData::One(primary));
        doc.included = self.included_objects(criteria, included)?;
        Ok(doc)
    }

    /// A to-one linkage document for `GET .../relationships/{rel}`.
    pub fn to_one_linkage_document(
        &self,
        meta: &ResourceMetadata,
        id: &str,
        rel: &RelationshipMetadata,
        target_id: Option<String>,
    ) -> Document {
        let mut doc = Document::versioned();
        doc.links = Some(self.linkage_links(meta, id, &rel.name));
        // Linkage documents carry identifier objects, not full resources.
        let linkage = match target_id {
            Some(tid) => Linkage::ToOne(Some(ResourceIdentifier::new(rel.target(), tid))),
            None => Linkage::ToOne(None),
        };
        linkage_into_document(&mut doc, linkage);
        doc
    }

    /// A to-many linkage document for `GET .../relationships/{rel}`.
    pub fn to_many_linkage_document(
        &self,
        meta: &ResourceMetadata,
        id: &str,
        rel: &RelationshipMetadata,
        slice: &SliceIds,
    ) -> Document {
        let mut doc = Document::versioned();
        doc.links = Some(self.linkage_links(meta, id, &rel.name));
        let identifiers = slice
            .ids
            .iter()
            .map(|tid| ResourceIdentifier::new(rel.target(), tid.clone()))
            .collect();
        linkage_into_document(&mut doc, Linkage::ToMany(identifiers));
        let mut top_meta = Map::new();
        top_meta.insert("total".to_string(), Value::from(slice.total_items));
        doc.meta = Some(top_meta);
        doc
    }

    fn linkage_links(&self, meta: &ResourceMetadata, id: &str, rel: &str) -> Links {
        let mut links = Links::new();
        links.insert(
            "self".to_string(),
            Link::Href(self.links().relationship_self(meta, id, rel)),
        );
        links.insert(
            "related".to_string(),
            Link::Href(self.links().relationship_related(meta, id, rel)),
        );
        links
    }
}

/// Reads relationship linkage straight off the entity value: a to-one
/// relationship is a string-or-null property, a to-many one an array of
/// ids, both named by the relationship. A missing property omits `data`.
fn linkage_from_entity(rel: &RelationshipMetadata, entity: &Value) -> Option<Linkage> {
    let value = property::get_path(entity, &rel.name)?;
    if rel.to_many {
        let ids = value.as_array()?;
        Some(Linkage::ToMany(
            ids.iter()
                .filter_map(scalar_id)
                .map(|id| ResourceIdentifier::new(rel.target(), id))
                .collect(),
        ))
    } else {
        match value {
            Value::Null => Some(Linkage::ToOne(None)),
            other => scalar_id(other)
                .map(|id| Linkage::ToOne(Some(ResourceIdentifier::new(rel.target(), id)))),
        }
    }
}

fn scalar_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Re-emits date-like attribute values in RFC 3339.
fn normalize_attribute(attr: &crate::registry::AttributeMetadata, value: &Value) -> Value {
    if attr.is_date_like() {
        if let Value::String(raw) = value {
            if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
                return Value::String(rfc3339(dt.with_timezone(&chrono::Utc)));
            }
        }
    }
    value.clone()
}

/// Installs identifier-only linkage as the document's primary data.
fn linkage_into_document(doc: &mut Document, linkage: Linkage) {
    match linkage {
        Linkage::ToOne(Some(ident)) => {
            doc.data = Some(PrimaryData::One(Some(identifier_resource(ident))));
        }
        Linkage::ToOne(None) => {
            doc.data = Some(PrimaryData::One(None));
        }
        Linkage::ToMany(idents) => {
            doc.data = Some(PrimaryData::Many(
                idents.into_iter().map(identifier_resource).collect(),
            ));
        }
    }
}

fn identifier_resource(ident: ResourceIdentifier) -> ResourceObject {
    ResourceObject::new(ident.type_name, ident.id)
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod builder_tests;
