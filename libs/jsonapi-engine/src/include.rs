//! Compound-document expansion.
//!
//! Breadth-first walk over the primary resources: at each depth the engine
//! batches one `find_related` call per include-tree node, de-duplicates on
//! `(type, id)` against everything already carried by the document, and
//! queues the next level. Sibling order follows include-tree declaration
//! order, so the `included` array is stable for a given request.

use std::collections::HashSet;

use jsonapi_core::IncludeTree;
use serde_json::Value;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::Error;
use crate::interfaces::ResourceRepository;
use crate::property;
use crate::registry::{ResourceMetadata, ResourceRegistry};

/// One entity bound for `included`, with the include sub-tree that applies
/// beneath it (drives `when_included` linkage on included resources).
#[derive(Debug)]
pub struct IncludedResource {
    pub type_name: String,
    pub entity: Value,
    pub include: IncludeTree,
}

pub struct IncludeEngine<'a> {
    registry: &'a ResourceRegistry,
    repository: &'a dyn ResourceRepository,
    config: &'a EngineConfig,
}

struct Level {
    type_name: String,
    entities: Vec<Value>,
    tree: IncludeTree,
}

impl<'a> IncludeEngine<'a> {
    pub fn new(
        registry: &'a ResourceRegistry,
        repository: &'a dyn ResourceRepository,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            registry,
            repository,
            config,
        }
    }

    /// Expands `tree` over the primary entities into a flat, de-duplicated
    /// `included` list. Primary resources are never duplicated into it and
    /// cycles terminate at the visited set.
    pub async fn expand(
        &self,
        meta: &ResourceMetadata,
        primary: &[Value],
        tree: &IncludeTree,
    ) -> Result<Vec<IncludedResource>, Error> {
        if tree.is_empty() {
            return Ok(Vec::new());
        }
        if tree.depth() > self.config.limits.max_include_depth {
            // The parser enforces this; a second guard keeps host-built
            // criteria inside the same budget.
            return Err(Error::IncludeTooDeep {
                max: self.config.limits.max_include_depth,
                parameter: "include".to_string(),
            });
        }

        let mut visited: HashSet<(String, String)> = primary
            .iter()
            .filter_map(|e| property::id_of(e, meta))
            .map(|id| (meta.type_name.clone(), id))
            .collect();

        let mut included = Vec::new();
        let mut level = vec![Level {
            type_name: meta.type_name.clone(),
            entities: primary.to_vec(),
            tree: tree.clone(),
        }];

        while !level.is_empty() {
            let mut next = Vec::new();
            for entry in level {
                let parent_meta = self.registry.get_by_type(&entry.type_name)?;
                let parent_ids = unique_ids(&entry.entities, parent_meta);
                if parent_ids.is_empty() {
                    continue;
                }
                for node in entry.tree.nodes() {
                    let rel = parent_meta.relationship(&node.name).ok_or_else(|| {
                        Error::internal(anyhow::anyhow!(
                            "include node '{}' is not a relationship of '{}'",
                            node.name,
                            entry.type_name
                        ))
                    })?;
                    let target_meta = self.registry.get_by_type(rel.target())?;

                    let related = self
                        .repository
                        .find_related(&entry.type_name, &node.name, &parent_ids)
                        .await
                        .map_err(Error::from)?;
                    debug!(
                        parent = %entry.type_name,
                        relationship = %node.name,
                        loaded = related.len(),
                        "expanded include level"
                    );

                    let mut next_entities = Vec::new();
                    for entity in related {
                        let Some(id) = property::id_of(&entity, target_meta) else {
                            continue;
                        };
                        if !visited.insert((target_meta.type_name.clone(), id)) {
                            continue;
                        }
                        if !node.children.is_empty() {
                            next_entities.push(entity.clone());
                        }
                        included.push(IncludedResource {
                            type_name: target_meta.type_name.clone(),
                            entity,
                            include: node.children.clone(),
                        });
                    }
                    if !next_entities.is_empty() {
                        next.push(Level {
                            type_name: target_meta.type_name.clone(),
                            entities: next_entities,
                            tree: node.children.clone(),
                        });
                    }
                }
            }
            level = next;
        }

        Ok(included)
    }
}

fn unique_ids(entities: &[Value], meta: &ResourceMetadata) -> Vec<String> {
    let mut seen = HashSet::new();
    entities
        .iter()
        .filter_map(|e| property::id_of(e, meta))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}
