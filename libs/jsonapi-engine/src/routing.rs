//! Route recognition for the JSON:API URL surface.
//!
//! `/{prefix}/{type}`, `/{prefix}/{type}/{id}`,
//! `/{prefix}/{type}/{id}/relationships/{rel}`, `/{prefix}/{type}/{id}/{rel}`,
//! and the atomic endpoint `/{prefix}/{operations}`. Path segments are
//! percent-decoded before matching.

use crate::config::EngineConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Collection {
        type_name: String,
    },
    Resource {
        type_name: String,
        id: String,
    },
    Relationship {
        type_name: String,
        id: String,
        relationship: String,
    },
    Related {
        type_name: String,
        id: String,
        relationship: String,
    },
    Atomic,
}

impl Route {
    /// Stable route name, used for channel matching and logging.
    pub fn name(&self) -> &'static str {
        match self {
            Route::Collection { .. } => "collection",
            Route::Resource { .. } => "resource",
            Route::Relationship { .. } => "relationship",
            Route::Related { .. } => "related",
            Route::Atomic => "operations",
        }
    }

    pub fn is_atomic(&self) -> bool {
        matches!(self, Route::Atomic)
    }
}

/// Recognizes `path` under the configured prefix. `None` means the path is
/// outside the engine's surface.
pub fn recognize(path: &str, config: &EngineConfig) -> Option<Route> {
    let prefix = config.url.prefix.trim_end_matches('/');
    let rest = path.strip_prefix(prefix)?;
    if !rest.is_empty() && !rest.starts_with('/') {
        return None;
    }

    let mut segments = Vec::new();
    for raw in rest.split('/').filter(|s| !s.is_empty()) {
        segments.push(urlencoding::decode(raw).ok()?.into_owned());
    }

    match segments.as_slice() {
        [single] if *single == config.url.atomic_segment => Some(Route::Atomic),
        [type_name] => Some(Route::Collection {
            type_name: type_name.clone(),
        }),
        [type_name, id] => Some(Route::Resource {
            type_name: type_name.clone(),
            id: id.clone(),
        }),
        [type_name, id, marker, relationship] if marker == "relationships" => {
            Some(Route::Relationship {
                type_name: type_name.clone(),
                id: id.clone(),
                relationship: relationship.clone(),
            })
        }
        [type_name, id, relationship] => Some(Route::Related {
            type_name: type_name.clone(),
            id: id.clone(),
            relationship: relationship.clone(),
        }),
        _ => None,
    }
}
