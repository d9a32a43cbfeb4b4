//! Transport-agnostic JSON:API 1.1 protocol types.
//!
//! This crate holds the value types shared by the engine and its hosts:
//! the wire document model, resource identifiers, the parsed query
//! (`Criteria`), the filter AST, change sets for the write path, and
//! pagination slices. It performs no I/O and knows nothing about HTTP.

pub mod changeset;
pub mod criteria;
pub mod document;
pub mod filter;
pub mod identifier;
pub mod slice;

pub use changeset::{ChangeSet, RelationshipPatch};
pub use criteria::{Criteria, IncludeNode, IncludeTree, PageSpec, SortDir, SortKey};
pub use document::{
    Document, ErrorObject, ErrorSource, JsonApiObject, Link, Linkage, Links, PrimaryData,
    RelationshipObject, ResourceIdentifier, ResourceObject, MEDIA_TYPE, VERSION,
};
pub use filter::{Condition, Expr, FilterOp, FilterValue};
pub use identifier::{RefKey, ResourceRef};
pub use slice::{Slice, SliceIds};
