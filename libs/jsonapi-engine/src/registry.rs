//! Resource-type metadata and the registry that indexes it.
//!
//! The registry is the single source of truth for type mapping. It is built
//! once at engine init through [`ResourceRegistry::builder`], validated, and
//! treated as read-only afterwards. Lookups by type name or by data class
//! are O(1).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use jsonapi_core::FilterOp;

use crate::error::Error;

/// Which operations an attribute participates in.
///
/// `write` covers both create and update; `create`/`update` grant the
/// narrower permission on their own. Readability and writability are
/// resolved through [`SerializationGroups::readable`] and
/// [`SerializationGroups::writable_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializationGroups {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub update: bool,
}

impl Default for SerializationGroups {
    fn default() -> Self {
        Self {
            read: true,
            write: true,
            create: false,
            update: false,
        }
    }
}

impl SerializationGroups {
    pub fn read_only() -> Self {
        Self {
            read: true,
            write: false,
            create: false,
            update: false,
        }
    }

    pub fn create_only() -> Self {
        Self {
            read: true,
            write: false,
            create: true,
            update: false,
        }
    }

    pub fn readable(&self) -> bool {
        self.read
    }

    pub fn writable_for(&self, op: WriteAccess) -> bool {
        match op {
            WriteAccess::Create => self.write || self.create,
            WriteAccess::Update => self.write || self.update,
        }
    }
}

/// The write operation a document is being read for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAccess {
    Create,
    Update,
}

/// Scalar/enum/object tags describing an attribute's value space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    Object,
    Array,
    Enum,
}

#[derive(Debug, Clone)]
pub struct AttributeMetadata {
    pub name: String,
    pub property_path: String,
    pub kinds: Vec<AttrKind>,
    pub nullable: bool,
    pub groups: SerializationGroups,
}

impl AttributeMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            property_path: name.clone(),
            name,
            kinds: vec![AttrKind::String],
            nullable: false,
            groups: SerializationGroups::default(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.property_path = path.into();
        self
    }

    pub fn with_kind(mut self, kind: AttrKind) -> Self {
        self.kinds = vec![kind];
        self
    }

    pub fn with_kinds(mut self, kinds: Vec<AttrKind>) -> Self {
        self.kinds = kinds;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_groups(mut self, groups: SerializationGroups) -> Self {
        self.groups = groups;
        self
    }

    pub fn is_date_like(&self) -> bool {
        self.kinds
            .iter()
            .any(|k| matches!(k, AttrKind::Date | AttrKind::DateTime))
    }
}

#[derive(Debug, Clone)]
pub struct RelationshipMetadata {
    pub name: String,
    pub to_many: bool,
    /// Target resource type; resolved from `target_class` at build time
    /// when not given explicitly.
    pub target_type: Option<String>,
    pub target_class: Option<String>,
    pub nullable: bool,
    /// Inverse relationship name on the target type, for bidirectional
    /// synchronization by the data layer.
    pub inverse: Option<String>,
}

impl RelationshipMetadata {
    pub fn to_one(name: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            to_many: false,
            target_type: Some(target_type.into()),
            target_class: None,
            nullable: false,
            inverse: None,
        }
    }

    pub fn to_many(name: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            to_many: true,
            target_type: Some(target_type.into()),
            target_class: None,
            nullable: false,
            inverse: None,
        }
    }

    /// A relationship whose target type is resolved from the target's data
    /// class when the registry is built.
    pub fn to_one_class(name: impl Into<String>, target_class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            to_many: false,
            target_type: None,
            target_class: Some(target_class.into()),
            nullable: false,
            inverse: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_inverse(mut self, inverse: impl Into<String>) -> Self {
        self.inverse = Some(inverse.into());
        self
    }

    /// The resolved target type. Present on every relationship of a built
    /// registry.
    pub fn target(&self) -> &str {
        self.target_type.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct ResourceMetadata {
    /// Unique lowercase type name; doubles as the URL segment.
    pub type_name: String,
    /// Opaque host-side identifier of the backing data class.
    pub data_class: String,
    pub attributes: Vec<AttributeMetadata>,
    pub relationships: Vec<RelationshipMetadata>,
    /// Duplicate the id into `attributes` under the key `id`.
    pub expose_id: bool,
    /// Per-resource URL prefix override for link generation.
    pub route_prefix: Option<String>,
    pub description: Option<String>,
    pub id_property_path: String,
    /// Fields open to filtering, each with its allowed operators.
    /// `None` rejects filtering wholesale.
    pub filterable: Option<BTreeMap<String, BTreeSet<FilterOp>>>,
    /// Fields open to sorting. `None` rejects sorting wholesale.
    pub sortable: Option<BTreeSet<String>>,
    /// Property carrying the last-modified timestamp, for validators.
    pub updated_at_path: Option<String>,
}

impl ResourceMetadata {
    pub fn new(type_name: impl Into<String>, data_class: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            data_class: data_class.into(),
            attributes: Vec::new(),
            relationships: Vec::new(),
            expose_id: false,
            route_prefix: None,
            description: None,
            id_property_path: "id".to_string(),
            filterable: None,
            sortable: None,
            updated_at_path: None,
        }
    }

    pub fn with_attribute(mut self, attribute: AttributeMetadata) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_relationship(mut self, relationship: RelationshipMetadata) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn expose_id(mut self) -> Self {
        self.expose_id = true;
        self
    }

    pub fn with_route_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.route_prefix = Some(prefix.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_id_property(mut self, path: impl Into<String>) -> Self {
        self.id_property_path = path.into();
        self
    }

    /// Opens `field` to filtering with the given operators.
    pub fn filterable(mut self, field: impl Into<String>, ops: impl IntoIterator<Item = FilterOp>) -> Self {
        self.filterable
            .get_or_insert_with(BTreeMap::new)
            .insert(field.into(), ops.into_iter().collect());
        self
    }

    /// Opens the given fields to sorting.
    pub fn sortable(mut self, fields: impl IntoIterator<Item = &'static str>) -> Self {
        let set = self.sortable.get_or_insert_with(BTreeSet::new);
        set.extend(fields.into_iter().map(str::to_string));
        self
    }

    pub fn with_updated_at(mut self, path: impl Into<String>) -> Self {
        self.updated_at_path = Some(path.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeMetadata> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipMetadata> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Whether `name` names an attribute or a relationship of this type.
    pub fn has_field(&self, name: &str) -> bool {
        self.attribute(name).is_some() || self.relationship(name).is_some()
    }
}

/// Init-time registry validation failures.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("resource type '{0}' is registered twice")]
    DuplicateType(String),

    #[error("attribute '{name}' on '{type_name}' is declared twice")]
    DuplicateAttribute { type_name: String, name: String },

    #[error("relationship '{name}' on '{type_name}' is declared twice")]
    DuplicateRelationship { type_name: String, name: String },

    #[error("attribute '{name}' on '{type_name}' collides with a reserved or relationship name")]
    NameCollision { type_name: String, name: String },

    #[error("relationship '{relationship}' on '{type_name}' has no resolvable target type")]
    UnresolvedTarget {
        type_name: String,
        relationship: String,
    },

    #[error("relationship '{relationship}' on '{type_name}' targets unregistered type '{target}'")]
    UnknownTarget {
        type_name: String,
        relationship: String,
        target: String,
    },
}

/// Immutable index of all registered resource types.
#[derive(Debug)]
pub struct ResourceRegistry {
    resources: Vec<ResourceMetadata>,
    by_type: HashMap<String, usize>,
    by_class: HashMap<String, usize>,
}

impl ResourceRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            resources: Vec::new(),
        }
    }

    pub fn get_by_type(&self, type_name: &str) -> Result<&ResourceMetadata, Error> {
        self.by_type
            .get(type_name)
            .map(|&i| &self.resources[i])
            .ok_or_else(|| Error::unknown_type(type_name))
    }

    pub fn get_by_class(&self, data_class: &str) -> Option<&ResourceMetadata> {
        self.by_class.get(data_class).map(|&i| &self.resources[i])
    }

    pub fn all(&self) -> &[ResourceMetadata] {
        &self.resources
    }
}

pub struct RegistryBuilder {
    resources: Vec<ResourceMetadata>,
}

impl RegistryBuilder {
    pub fn register(mut self, metadata: ResourceMetadata) -> Self {
        self.resources.push(metadata);
        self
    }

    /// Validates the registered set and builds the indexes. Duplicate
    /// types, colliding field names, and unresolvable relationship targets
    /// fail init.
    pub fn build(self) -> Result<ResourceRegistry, RegistryError> {
        let mut resources = self.resources;
        let mut by_type = HashMap::new();
        let mut by_class = HashMap::new();

        for (i, meta) in resources.iter().enumerate() {
            if by_type.insert(meta.type_name.clone(), i).is_some() {
                return Err(RegistryError::DuplicateType(meta.type_name.clone()));
            }
            by_class.entry(meta.data_class.clone()).or_insert(i);
        }

        // Resolve class-declared relationship targets now that every type
        // is indexed.
        for i in 0..resources.len() {
            for r in 0..resources[i].relationships.len() {
                if resources[i].relationships[r].target_type.is_none() {
                    let target_class = resources[i].relationships[r].target_class.clone();
                    let resolved = target_class
                        .as_deref()
                        .and_then(|c| by_class.get(c))
                        .map(|&t| resources[t].type_name.clone());
                    match resolved {
                        Some(target) => resources[i].relationships[r].target_type = Some(target),
                        None => {
                            return Err(RegistryError::UnresolvedTarget {
                                type_name: resources[i].type_name.clone(),
                                relationship: resources[i].relationships[r].name.clone(),
                            })
                        }
                    }
                }
            }
        }

        for meta in &resources {
            let mut attr_names = BTreeSet::new();
            for attr in &meta.attributes {
                if !attr_names.insert(attr.name.as_str()) {
                    return Err(RegistryError::DuplicateAttribute {
                        type_name: meta.type_name.clone(),
                        name: attr.name.clone(),
                    });
                }
                if attr.name == "id"
                    || attr.name == "type"
                    || meta.relationship(&attr.name).is_some()
                {
                    return Err(RegistryError::NameCollision {
                        type_name: meta.type_name.clone(),
                        name: attr.name.clone(),
                    });
                }
            }
            let mut rel_names = BTreeSet::new();
            for rel in &meta.relationships {
                if !rel_names.insert(rel.name.as_str()) {
                    return Err(RegistryError::DuplicateRelationship {
                        type_name: meta.type_name.clone(),
                        name: rel.name.clone(),
                    });
                }
                let target = rel.target();
                if !by_type.contains_key(target) {
                    return Err(RegistryError::UnknownTarget {
                        type_name: meta.type_name.clone(),
                        relationship: rel.name.clone(),
                        target: target.to_string(),
                    });
                }
            }
        }

        Ok(ResourceRegistry {
            resources,
            by_type,
            by_class,
        })
    }
}
