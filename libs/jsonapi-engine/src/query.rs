//! Query-string parsing into a typed [`Criteria`].
//!
//! Parses `include`, `fields[TYPE]`, `sort`, `page[number|size]`, and
//! `filter[FIELD][OP]` with the configured budgets enforced before any
//! data-layer call. Violations are collected, not short-circuited: one bad
//! request yields every detectable query error at once, each annotated
//! with the offending parameter.

use jsonapi_core::{
    Condition, Criteria, Expr, FilterOp, FilterValue, IncludeTree, PageSpec, SortKey,
};

use crate::config::EngineConfig;
use crate::error::{Error, Rejection};
use crate::registry::{ResourceMetadata, ResourceRegistry};

pub struct QueryParser<'a> {
    registry: &'a ResourceRegistry,
    config: &'a EngineConfig,
}

impl<'a> QueryParser<'a> {
    pub fn new(registry: &'a ResourceRegistry, config: &'a EngineConfig) -> Self {
        Self { registry, config }
    }

    /// Parses the raw query string for an endpoint of type `meta`.
    pub fn parse(&self, meta: &ResourceMetadata, raw_query: &str) -> Result<Criteria, Rejection> {
        let mut errors: Vec<Error> = Vec::new();

        let mut include = IncludeTree::default();
        let mut fields = std::collections::BTreeMap::new();
        let mut sort: Vec<SortKey> = Vec::new();
        let mut page_number: u64 = 1;
        let mut page_size: u64 = self.config.pagination.default_size;
        let mut conditions: Vec<Expr> = Vec::new();

        for (key, value) in url::form_urlencoded::parse(raw_query.as_bytes()) {
            match key.as_ref() {
                "include" => {
                    include = self.parse_include(meta, &value, &mut errors);
                }
                "sort" => {
                    sort = self.parse_sort(meta, &value, &mut errors);
                }
                "page[number]" => match value.parse::<u64>() {
                    Ok(n) => page_number = n.max(1),
                    Err(_) => errors.push(Error::InvalidPagination {
                        detail: format!("'{value}' is not a valid page number"),
                        parameter: "page[number]".to_string(),
                    }),
                },
                "page[size]" => match value.parse::<u64>() {
                    Ok(n) => page_size = n.clamp(1, self.config.pagination.max_size),
                    Err(_) => errors.push(Error::InvalidPagination {
                        detail: format!("'{value}' is not a valid page size"),
                        parameter: "page[size]".to_string(),
                    }),
                },
                key if key.starts_with("fields[") => {
                    if let Some((type_name, set)) =
                        self.parse_fieldset(key, &value, &mut errors)
                    {
                        fields.insert(type_name, set);
                    }
                }
                key if key.starts_with("filter[") => {
                    if let Some(condition) = self.parse_filter(meta, key, &value, &mut errors) {
                        conditions.push(Expr::Condition(condition));
                    }
                }
                // Only page[number] and page[size] are recognized; other
                // page members and foreign query keys pass through.
                _ => {}
            }
        }

        if !errors.is_empty() {
            return Err(Rejection::new(errors));
        }

        Ok(Criteria {
            include,
            fields,
            sort,
            page: PageSpec::new(page_number, page_size),
            filter: Expr::conjoin(conditions),
        })
    }

    fn parse_include(
        &self,
        meta: &ResourceMetadata,
        value: &str,
        errors: &mut Vec<Error>,
    ) -> IncludeTree {
        let mut tree = IncludeTree::default();
        for path in value.split(',') {
            let path = path.trim();
            if path.is_empty() {
                continue;
            }
            let segments: Vec<&str> = path.split('.').collect();
            if segments.len() > self.config.limits.max_include_depth {
                errors.push(Error::IncludeTooDeep {
                    max: self.config.limits.max_include_depth,
                    parameter: "include".to_string(),
                });
                continue;
            }
            if self.validate_include_path(meta, path, &segments, errors) {
                tree.insert_path(&segments);
            }
        }
        tree
    }

    /// Walks the path through relationship metadata; each segment must name
    /// a relationship of its parent's type.
    fn validate_include_path(
        &self,
        meta: &ResourceMetadata,
        path: &str,
        segments: &[&str],
        errors: &mut Vec<Error>,
    ) -> bool {
        let mut parent = meta;
        for segment in segments {
            let Some(rel) = parent.relationship(segment) else {
                errors.push(Error::InvalidIncludePath {
                    path: path.to_string(),
                    detail: format!(
                        "'{segment}' is not a relationship of '{}'",
                        parent.type_name
                    ),
                    parameter: "include".to_string(),
                });
                return false;
            };
            match self.registry.get_by_type(rel.target()) {
                Ok(target) => parent = target,
                Err(_) => {
                    errors.push(Error::InvalidIncludePath {
                        path: path.to_string(),
                        detail: format!("'{segment}' targets an unregistered type"),
                        parameter: "include".to_string(),
                    });
                    return false;
                }
            }
        }
        true
    }

    fn parse_sort(
        &self,
        meta: &ResourceMetadata,
        value: &str,
        errors: &mut Vec<Error>,
    ) -> Vec<SortKey> {
        let mut keys = Vec::new();
        for part in value.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (field, desc) = match part.strip_prefix('-') {
                Some(rest) => (rest, true),
                None => (part, false),
            };
            let allowed = meta
                .sortable
                .as_ref()
                .is_some_and(|set| set.contains(field));
            if !allowed {
                let detail = if meta.sortable.is_none() {
                    format!("sorting is not enabled for '{}'", meta.type_name)
                } else {
                    format!("'{field}' is not a sortable field of '{}'", meta.type_name)
                };
                errors.push(Error::InvalidSortField {
                    detail,
                    parameter: "sort".to_string(),
                });
                continue;
            }
            keys.push(if desc {
                SortKey::desc(field)
            } else {
                SortKey::asc(field)
            });
        }
        if keys.len() > self.config.limits.max_sort_fields {
            errors.push(Error::InvalidSortField {
                detail: format!(
                    "sort lists {} fields, more than the maximum of {}",
                    keys.len(),
                    self.config.limits.max_sort_fields
                ),
                parameter: "sort".to_string(),
            });
            keys.truncate(self.config.limits.max_sort_fields);
        }
        keys
    }

    fn parse_fieldset(
        &self,
        key: &str,
        value: &str,
        errors: &mut Vec<Error>,
    ) -> Option<(String, std::collections::BTreeSet<String>)> {
        let type_name = key.strip_prefix("fields[")?.strip_suffix(']')?;
        let target = match self.registry.get_by_type(type_name) {
            Ok(meta) => meta,
            Err(_) => {
                errors.push(Error::InvalidFieldset {
                    detail: format!("'{type_name}' is not a known resource type"),
                    parameter: key.to_string(),
                });
                return None;
            }
        };

        let mut set = std::collections::BTreeSet::new();
        for name in value.split(',') {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            if !target.has_field(name) {
                errors.push(Error::InvalidFieldset {
                    detail: format!("'{name}' is not a field of '{type_name}'"),
                    parameter: key.to_string(),
                });
                continue;
            }
            set.insert(name.to_string());
        }
        if set.len() > self.config.limits.max_fields_per_type {
            errors.push(Error::InvalidFieldset {
                detail: format!(
                    "fieldset lists {} fields, more than the maximum of {}",
                    set.len(),
                    self.config.limits.max_fields_per_type
                ),
                parameter: key.to_string(),
            });
            return None;
        }
        Some((type_name.to_string(), set))
    }

    /// Parses one `filter[FIELD][OP]=VALUE` pair. Filtering is rejected
    /// wholesale when the type declares no filterable fields.
    fn parse_filter(
        &self,
        meta: &ResourceMetadata,
        key: &str,
        value: &str,
        errors: &mut Vec<Error>,
    ) -> Option<Condition> {
        let Some((field, op_str)) = parse_filter_key(key) else {
            errors.push(Error::InvalidFilter {
                detail: format!("'{key}' is not of the form filter[FIELD][OP]"),
                parameter: key.to_string(),
            });
            return None;
        };

        if field.split('.').count() > self.config.limits.max_filter_depth {
            errors.push(Error::InvalidFilter {
                detail: format!(
                    "'{field}' exceeds the maximum filter depth of {}",
                    self.config.limits.max_filter_depth
                ),
                parameter: key.to_string(),
            });
            return None;
        }

        let op = match FilterOp::parse(op_str) {
            Some(op) if self.config.filtering.operators.iter().any(|o| o == op_str) => op,
            _ => {
                errors.push(Error::InvalidFilter {
                    detail: format!("'{op_str}' is not a recognized filter operator"),
                    parameter: key.to_string(),
                });
                return None;
            }
        };

        let Some(whitelist) = meta.filterable.as_ref() else {
            errors.push(Error::InvalidFilter {
                detail: format!("filtering is not enabled for '{}'", meta.type_name),
                parameter: key.to_string(),
            });
            return None;
        };
        let Some(allowed_ops) = whitelist.get(field) else {
            errors.push(Error::InvalidFilter {
                detail: format!("'{field}' is not a filterable field of '{}'", meta.type_name),
                parameter: key.to_string(),
            });
            return None;
        };
        if !allowed_ops.contains(&op) {
            errors.push(Error::InvalidFilter {
                detail: format!("operator '{op_str}' is not permitted on '{field}'"),
                parameter: key.to_string(),
            });
            return None;
        }

        let value = if op.is_nullary() {
            FilterValue::Null
        } else if op.takes_list() {
            FilterValue::List(
                value
                    .split(',')
                    .map(|v| FilterValue::string(v.trim()))
                    .collect(),
            )
        } else {
            FilterValue::string(value)
        };

        Some(Condition {
            field: field.to_string(),
            op,
            value,
        })
    }
}

/// Splits `filter[FIELD][OP]` into its two bracketed segments.
fn parse_filter_key(key: &str) -> Option<(&str, &str)> {
    let rest = key.strip_prefix("filter[")?;
    let (field, rest) = rest.split_once(']')?;
    let op = rest.strip_prefix('[')?.strip_suffix(']')?;
    if field.is_empty() || op.is_empty() {
        return None;
    }
    Some((field, op))
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod query_tests;
