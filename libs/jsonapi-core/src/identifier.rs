//! Resource references as they appear in request documents.
//!
//! Unlike [`crate::document::ResourceIdentifier`], a request-side reference
//! may name a resource by `lid` (a local id scoped to one atomic request)
//! instead of `id`. Exactly one of the two is set.

use serde::de::Error as DeError;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::document::ResourceIdentifier;

/// Either a real id or an atomic-request-local id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RefKey {
    Id(String),
    Lid(String),
}

/// A resource reference from a request document: `{type, id}` or `{type, lid}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub type_name: String,
    pub key: RefKey,
}

impl ResourceRef {
    pub fn by_id(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            key: RefKey::Id(id.into()),
        }
    }

    pub fn by_lid(type_name: impl Into<String>, lid: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            key: RefKey::Lid(lid.into()),
        }
    }

    pub fn id(&self) -> Option<&str> {
        match &self.key {
            RefKey::Id(id) => Some(id),
            RefKey::Lid(_) => None,
        }
    }

    pub fn lid(&self) -> Option<&str> {
        match &self.key {
            RefKey::Id(_) => None,
            RefKey::Lid(lid) => Some(lid),
        }
    }

    /// Converts to a wire identifier; only valid once the key is a real id.
    pub fn to_identifier(&self) -> Option<ResourceIdentifier> {
        self.id()
            .map(|id| ResourceIdentifier::new(self.type_name.clone(), id))
    }
}

impl From<ResourceIdentifier> for ResourceRef {
    fn from(ident: ResourceIdentifier) -> Self {
        ResourceRef::by_id(ident.type_name, ident.id)
    }
}

impl Serialize for ResourceRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ResourceRef", 2)?;
        s.serialize_field("type", &self.type_name)?;
        match &self.key {
            RefKey::Id(id) => s.serialize_field("id", id)?,
            RefKey::Lid(lid) => s.serialize_field("lid", lid)?,
        }
        s.end()
    }
}

#[derive(Deserialize)]
struct RawRef {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    lid: Option<String>,
}

impl<'de> Deserialize<'de> for ResourceRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawRef::deserialize(deserializer)?;
        let key = match (raw.id, raw.lid) {
            (Some(id), None) => RefKey::Id(id),
            (None, Some(lid)) => RefKey::Lid(lid),
            (None, None) => {
                return Err(D::Error::custom(
                    "resource reference must carry `id` or `lid`",
                ))
            }
            (Some(_), Some(_)) => {
                return Err(D::Error::custom(
                    "resource reference must carry exactly one of `id` and `lid`",
                ))
            }
        };
        Ok(ResourceRef {
            type_name: raw.type_name,
            key,
        })
    }
}
