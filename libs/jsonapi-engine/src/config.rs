//! Engine configuration.
//!
//! A plain serde tree with defaults for every section; hosts deserialize it
//! from whatever configuration source they own and pass it to the engine
//! builder. The engine treats it as immutable after construction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub url: UrlConfig,
    pub limits: Limits,
    pub pagination: PaginationConfig,
    pub filtering: FilteringConfig,
    pub relationships: RelationshipsConfig,
    pub write: WriteConfig,
    pub preconditions: PreconditionsConfig,
    pub profiles: ProfilesConfig,
    /// URL-scope negotiation overrides, matched first-wins.
    pub channels: Vec<ChannelConfig>,
}

/// Where the engine is mounted and how absolute links are formed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UrlConfig {
    /// Scheme+authority used for absolute link generation, no trailing slash.
    pub base: String,
    /// Route prefix shared by all JSON:API routes.
    pub prefix: String,
    /// Path segment of the atomic-operations endpoint under the prefix.
    pub atomic_segment: String,
}

impl Default for UrlConfig {
    fn default() -> Self {
        Self {
            base: "http://localhost".to_string(),
            prefix: "/api".to_string(),
            atomic_segment: "operations".to_string(),
        }
    }
}

/// Request-shaping budgets. Every limit rejects with a 400 before any
/// data-layer call is made.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Limits {
    pub max_include_depth: usize,
    pub max_fields_per_type: usize,
    pub max_sort_fields: usize,
    pub max_filter_depth: usize,
    /// Maximum operations in one atomic request.
    pub max_operations: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_include_depth: 8,
            max_fields_per_type: 50,
            max_sort_fields: 10,
            max_filter_depth: 4,
            max_operations: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PaginationConfig {
    /// Page size when the request names none.
    pub default_size: u64,
    /// Upper clamp for `page[size]`.
    pub max_size: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_size: 25,
            max_size: 100,
        }
    }
}

/// The operator vocabulary the deployment admits. Per-field whitelists in
/// resource metadata narrow this further; they never widen it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilteringConfig {
    pub operators: Vec<String>,
}

impl Default for FilteringConfig {
    fn default() -> Self {
        Self {
            operators: [
                "eq", "ne", "gt", "gte", "lt", "lte", "like", "in", "nin", "null", "nnull",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
        }
    }
}

/// When relationship objects carry `data` linkage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkageMode {
    Always,
    #[default]
    WhenIncluded,
    Never,
}

/// Response shape for relationship write endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WriteResponseMode {
    /// 200 with the refreshed linkage document.
    #[default]
    Linkage,
    /// 204 with no body.
    #[serde(alias = "204")]
    NoContent,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelationshipsConfig {
    pub linkage_in_resource: LinkageMode,
    pub write_response: WriteResponseMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WriteConfig {
    /// Whether the `/relationships/{rel}` write endpoints are mounted.
    pub allow_relationship_writes: bool,
    /// Per-type opt-in for client-generated ids on POST.
    pub client_generated_ids: BTreeMap<String, bool>,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            allow_relationship_writes: true,
            client_generated_ids: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreconditionsConfig {
    /// Emit weak validators for collection responses.
    pub weak_for_collections: bool,
    /// Reject PATCH/DELETE without `If-Match`/`If-Unmodified-Since` with 428.
    pub require_for_write: bool,
}

impl Default for PreconditionsConfig {
    fn default() -> Self {
        Self {
            weak_for_collections: true,
            require_for_write: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfilesConfig {
    /// Profiles active on every request.
    pub enabled_by_default: Vec<String>,
    /// Profiles active for specific resource types.
    pub per_type: BTreeMap<String, Vec<String>>,
    /// Reject unknown profile URIs in the media-type `profile` parameter.
    pub strict: bool,
}

/// A URL scope whose media-type rules replace the strict JSON:API ones
/// (documentation UIs, sandboxes). First match by `path_prefix` or
/// `route_name` wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    pub name: String,
    pub path_prefix: Option<String>,
    pub route_name: Option<String>,
    /// Media types the channel accepts; `*/*` allows anything.
    pub media_types: Vec<String>,
}
