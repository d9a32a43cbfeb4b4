//! The typed query value produced by the query parser.
//!
//! A `Criteria` is immutable once parsed: the engine threads a shared
//! reference through dispatch, include expansion, and document building.

use std::collections::{BTreeMap, BTreeSet};

use crate::filter::Expr;

/// Sort direction. A leading `-` in the `sort` parameter means descending.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

/// One sort key, in request order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub dir: SortDir,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            dir: SortDir::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            dir: SortDir::Desc,
        }
    }
}

/// Page-based pagination: 1-based page number and clamped page size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageSpec {
    pub number: u64,
    pub size: u64,
}

impl PageSpec {
    pub fn new(number: u64, size: u64) -> Self {
        Self { number, size }
    }

    /// Zero-based item offset of this page.
    pub fn offset(&self) -> u64 {
        self.number.saturating_sub(1).saturating_mul(self.size)
    }

    /// Number of pages needed for `total` items (at least 1).
    pub fn last_page(&self, total: u64) -> u64 {
        if self.size == 0 {
            return 1;
        }
        total.div_ceil(self.size).max(1)
    }
}

/// One node of the include tree: a relationship name and its sub-tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IncludeNode {
    pub name: String,
    pub children: IncludeTree,
}

/// The parsed `include` parameter as a tree of relationship paths.
///
/// Sibling order is declaration order from the request, which the include
/// engine preserves when walking.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IncludeTree {
    nodes: Vec<IncludeNode>,
}

impl IncludeTree {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[IncludeNode] {
        &self.nodes
    }

    /// Whether a relationship is requested at this level.
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.iter().any(|n| n.name == name)
    }

    /// Sub-tree below `name`, if that relationship is requested here.
    pub fn child(&self, name: &str) -> Option<&IncludeTree> {
        self.nodes
            .iter()
            .find(|n| n.name == name)
            .map(|n| &n.children)
    }

    /// Inserts a dotted path, merging with already-inserted prefixes and
    /// keeping first-seen sibling order.
    pub fn insert_path(&mut self, segments: &[&str]) {
        let Some((first, rest)) = segments.split_first() else {
            return;
        };
        let node = match self.nodes.iter_mut().find(|n| n.name == *first) {
            Some(node) => node,
            None => {
                self.nodes.push(IncludeNode {
                    name: (*first).to_string(),
                    children: IncludeTree::default(),
                });
                self.nodes.last_mut().unwrap()
            }
        };
        node.children.insert_path(rest);
    }

    /// Maximum path depth in this tree.
    pub fn depth(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| 1 + n.children.depth())
            .max()
            .unwrap_or(0)
    }
}

/// The full parsed query for one request.
#[derive(Clone, Debug, PartialEq)]
pub struct Criteria {
    pub include: IncludeTree,
    /// Sparse fieldsets: type name -> allowed attribute/relationship names.
    pub fields: BTreeMap<String, BTreeSet<String>>,
    pub sort: Vec<SortKey>,
    pub page: PageSpec,
    pub filter: Option<Expr>,
}

impl Criteria {
    /// Criteria with no include/fields/sort/filter and the given page defaults.
    pub fn with_page(page: PageSpec) -> Self {
        Self {
            include: IncludeTree::default(),
            fields: BTreeMap::new(),
            sort: Vec::new(),
            page,
            filter: None,
        }
    }

    /// The fieldset restriction for `type_name`, if the request named one.
    pub fn fieldset(&self, type_name: &str) -> Option<&BTreeSet<String>> {
        self.fields.get(type_name)
    }
}
