//! The JSON:API 1.1 wire document model.
//!
//! These types serialize to exactly the shapes mandated by the format:
//! top-level `jsonapi`/`data`/`included`/`links`/`meta`/`errors`, resource
//! objects, relationship objects with optional linkage, and error objects
//! with a `source` discriminator. Absent members are omitted, never `null`,
//! except relationship linkage where `"data": null` is meaningful.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The JSON:API base media type.
pub const MEDIA_TYPE: &str = "application/vnd.api+json";

/// Protocol version advertised in the top-level `jsonapi` object.
pub const VERSION: &str = "1.1";

/// Top-level `jsonapi` object.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JsonApiObject {
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ext: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub profile: Vec<String>,
}

impl Default for JsonApiObject {
    fn default() -> Self {
        Self {
            version: VERSION.to_string(),
            ext: Vec::new(),
            profile: Vec::new(),
        }
    }
}

/// A single link: either a bare href or an object with `href` and `meta`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Link {
    Href(String),
    Object {
        href: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<Map<String, Value>>,
    },
}

impl Link {
    pub fn href(&self) -> &str {
        match self {
            Link::Href(h) => h,
            Link::Object { href, .. } => href,
        }
    }
}

impl From<String> for Link {
    fn from(href: String) -> Self {
        Link::Href(href)
    }
}

impl From<&str> for Link {
    fn from(href: &str) -> Self {
        Link::Href(href.to_string())
    }
}

/// A links object keyed by link name (`self`, `related`, `first`, ...).
pub type Links = BTreeMap<String, Link>;

/// A `{type, id}` pair uniquely naming a resource.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub type_name: String,
    pub id: String,
}

impl ResourceIdentifier {
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
        }
    }
}

/// Relationship linkage: to-one (nullable) or to-many (never null).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Linkage {
    ToOne(Option<ResourceIdentifier>),
    ToMany(Vec<ResourceIdentifier>),
}

impl Linkage {
    /// All identifiers referenced by this linkage.
    pub fn identifiers(&self) -> Vec<&ResourceIdentifier> {
        match self {
            Linkage::ToOne(None) => Vec::new(),
            Linkage::ToOne(Some(one)) => vec![one],
            Linkage::ToMany(many) => many.iter().collect(),
        }
    }
}

/// A relationship object inside a resource object.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct RelationshipObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Linkage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

/// A full resource object.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ResourceObject {
    #[serde(rename = "type")]
    pub type_name: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, RelationshipObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl ResourceObject {
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
            attributes: Map::new(),
            relationships: BTreeMap::new(),
            links: None,
            meta: None,
        }
    }

    pub fn identifier(&self) -> ResourceIdentifier {
        ResourceIdentifier::new(self.type_name.clone(), self.id.clone())
    }
}

/// Top-level primary data: a single (nullable) resource or a collection.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PrimaryData {
    One(Option<ResourceObject>),
    Many(Vec<ResourceObject>),
}

/// The `source` member of an error object. At most one field is set.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct ErrorSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
}

impl ErrorSource {
    pub fn pointer(pointer: impl Into<String>) -> Self {
        Self {
            pointer: Some(pointer.into()),
            ..Default::default()
        }
    }

    pub fn parameter(parameter: impl Into<String>) -> Self {
        Self {
            parameter: Some(parameter.into()),
            ..Default::default()
        }
    }

    pub fn header(header: impl Into<String>) -> Self {
        Self {
            header: Some(header.into()),
            ..Default::default()
        }
    }
}

/// A JSON:API error object.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct ErrorObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl ErrorObject {
    pub fn new(status: u16, code: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            status: Some(status.to_string()),
            code: Some(code.into()),
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_source(mut self, source: ErrorSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// A top-level JSON:API document.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonapi: Option<JsonApiObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PrimaryData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<ResourceObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorObject>,
}

impl Document {
    /// A document with versioned `jsonapi` object and no data yet.
    pub fn versioned() -> Self {
        Self {
            jsonapi: Some(JsonApiObject::default()),
            ..Default::default()
        }
    }

    /// An error document carrying the given error objects.
    pub fn from_errors(errors: Vec<ErrorObject>) -> Self {
        Self {
            jsonapi: Some(JsonApiObject::default()),
            errors,
            ..Default::default()
        }
    }

    /// Identifiers of every resource carried by this document
    /// (primary data first, then `included`).
    pub fn resource_identifiers(&self) -> Vec<ResourceIdentifier> {
        let mut out = Vec::new();
        match &self.data {
            Some(PrimaryData::One(Some(res))) => out.push(res.identifier()),
            Some(PrimaryData::Many(items)) => out.extend(items.iter().map(|r| r.identifier())),
            _ => {}
        }
        out.extend(self.included.iter().map(|r| r.identifier()));
        out
    }
}
