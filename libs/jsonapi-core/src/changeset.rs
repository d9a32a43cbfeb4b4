//! Change sets: the strictly-present subset of fields submitted for a write.
//!
//! A field missing from the request is missing from the change set; a field
//! submitted as `null` is present with a null value. The persister only
//! touches what is present.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::identifier::ResourceRef;

/// Parsed write payload for create/update.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeSet {
    /// Submitted attributes in document order. A `null` value is an explicit
    /// null, distinct from absence.
    pub attributes: Map<String, Value>,
    /// Submitted to-one relationships; `None` clears the relationship.
    pub to_one: BTreeMap<String, Option<ResourceRef>>,
    /// Submitted to-many relationships; an empty vec clears the relationship.
    pub to_many: BTreeMap<String, Vec<ResourceRef>>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.to_one.is_empty() && self.to_many.is_empty()
    }

    /// Every resource reference in the change set's relationships.
    pub fn refs(&self) -> Vec<&ResourceRef> {
        let mut out: Vec<&ResourceRef> = self.to_one.values().flatten().collect();
        out.extend(self.to_many.values().flatten());
        out
    }

    /// Every resource reference, mutably (used for LID substitution).
    pub fn refs_mut(&mut self) -> Vec<&mut ResourceRef> {
        let mut out: Vec<&mut ResourceRef> = self.to_one.values_mut().flatten().collect();
        out.extend(self.to_many.values_mut().flatten());
        out
    }
}

/// Parsed payload for a relationship endpoint write.
#[derive(Clone, Debug, PartialEq)]
pub enum RelationshipPatch {
    /// Replace to-one linkage; `None` clears it.
    ToOne(Option<ResourceRef>),
    /// Replace/add/remove to-many linkage.
    ToMany(Vec<ResourceRef>),
}

impl RelationshipPatch {
    pub fn refs(&self) -> Vec<&ResourceRef> {
        match self {
            RelationshipPatch::ToOne(None) => Vec::new(),
            RelationshipPatch::ToOne(Some(one)) => vec![one],
            RelationshipPatch::ToMany(many) => many.iter().collect(),
        }
    }

    pub fn refs_mut(&mut self) -> Vec<&mut ResourceRef> {
        match self {
            RelationshipPatch::ToOne(None) => Vec::new(),
            RelationshipPatch::ToOne(Some(one)) => vec![one],
            RelationshipPatch::ToMany(many) => many.iter_mut().collect(),
        }
    }
}
