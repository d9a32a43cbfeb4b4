use jsonapi_core::{FilterOp, FilterValue, SortDir};

use super::QueryParser;
use crate::config::EngineConfig;
use crate::error::Error;
use crate::registry::{
    AttributeMetadata, RelationshipMetadata, ResourceMetadata, ResourceRegistry,
};

fn registry() -> ResourceRegistry {
    ResourceRegistry::builder()
        .register(
            ResourceMetadata::new("articles", "Article")
                .with_attribute(AttributeMetadata::new("title"))
                .with_attribute(AttributeMetadata::new("createdAt"))
                .with_relationship(RelationshipMetadata::to_one("author", "authors"))
                .with_relationship(RelationshipMetadata::to_many("tags", "tags"))
                .sortable(["title", "createdAt"])
                .filterable("title", [FilterOp::Eq, FilterOp::Like])
                .filterable("author.name", [FilterOp::Eq]),
        )
        .register(
            ResourceMetadata::new("authors", "Author")
                .with_attribute(AttributeMetadata::new("name"))
                .with_relationship(RelationshipMetadata::to_many("articles", "articles")),
        )
        .register(
            ResourceMetadata::new("tags", "Tag").with_attribute(AttributeMetadata::new("label")),
        )
        .build()
        .unwrap()
}

fn parse(query: &str) -> Result<jsonapi_core::Criteria, crate::error::Rejection> {
    let registry = registry();
    let config = EngineConfig::default();
    let parser = QueryParser::new(&registry, &config);
    let meta = registry.get_by_type("articles").unwrap();
    parser.parse(meta, query)
}

#[test]
fn empty_query_uses_pagination_defaults() {
    let criteria = parse("").unwrap();
    assert!(criteria.include.is_empty());
    assert!(criteria.fields.is_empty());
    assert!(criteria.sort.is_empty());
    assert_eq!(criteria.page.number, 1);
    assert_eq!(criteria.page.size, 25);
    assert!(criteria.filter.is_none());
}

#[test]
fn include_builds_tree_in_declaration_order() {
    let criteria = parse("include=tags,author.articles").unwrap();
    let names: Vec<&str> = criteria
        .include
        .nodes()
        .iter()
        .map(|n| n.name.as_str())
        .collect();
    assert_eq!(names, ["tags", "author"]);
    assert!(criteria.include.child("author").unwrap().contains("articles"));
}

#[test]
fn include_rejects_non_relationship_segment() {
    let rejection = parse("include=author.title").unwrap_err();
    assert_eq!(rejection.errors.len(), 1);
    match &rejection.errors[0] {
        Error::InvalidIncludePath { path, parameter, .. } => {
            assert_eq!(path, "author.title");
            assert_eq!(parameter, "include");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn include_depth_budget() {
    let mut config = EngineConfig::default();
    config.limits.max_include_depth = 1;
    let registry = registry();
    let parser = QueryParser::new(&registry, &config);
    let meta = registry.get_by_type("articles").unwrap();
    let rejection = parser.parse(meta, "include=author.articles").unwrap_err();
    assert!(matches!(
        rejection.errors[0],
        Error::IncludeTooDeep { max: 1, .. }
    ));
}

#[test]
fn fieldset_accepts_attributes_and_relationships() {
    let criteria = parse("fields[articles]=title,author&fields[authors]=name").unwrap();
    let articles = criteria.fieldset("articles").unwrap();
    assert!(articles.contains("title"));
    assert!(articles.contains("author"));
    assert_eq!(criteria.fieldset("authors").unwrap().len(), 1);
}

#[test]
fn fieldset_rejects_unknown_names() {
    let rejection = parse("fields[articles]=colour").unwrap_err();
    match &rejection.errors[0] {
        Error::InvalidFieldset { parameter, .. } => assert_eq!(parameter, "fields[articles]"),
        other => panic!("unexpected error {other:?}"),
    }

    let rejection = parse("fields[comments]=body").unwrap_err();
    assert!(matches!(rejection.errors[0], Error::InvalidFieldset { .. }));
}

#[test]
fn sort_honors_whitelist_and_direction() {
    let criteria = parse("sort=-createdAt,title").unwrap();
    assert_eq!(criteria.sort.len(), 2);
    assert_eq!(criteria.sort[0].field, "createdAt");
    assert_eq!(criteria.sort[0].dir, SortDir::Desc);
    assert_eq!(criteria.sort[1].dir, SortDir::Asc);

    let rejection = parse("sort=views").unwrap_err();
    assert!(matches!(rejection.errors[0], Error::InvalidSortField { .. }));
}

#[test]
fn sort_rejected_wholesale_without_whitelist() {
    let registry = registry();
    let config = EngineConfig::default();
    let parser = QueryParser::new(&registry, &config);
    let meta = registry.get_by_type("authors").unwrap();
    let rejection = parser.parse(meta, "sort=name").unwrap_err();
    match &rejection.errors[0] {
        Error::InvalidSortField { detail, .. } => {
            assert!(detail.contains("not enabled"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn page_size_is_clamped() {
    let criteria = parse("page[number]=3&page[size]=4000").unwrap();
    assert_eq!(criteria.page.number, 3);
    assert_eq!(criteria.page.size, 100);

    let criteria = parse("page[number]=0").unwrap();
    assert_eq!(criteria.page.number, 1);

    // Unrecognized page members pass through.
    assert!(parse("page[cursor]=abc").is_ok());
}

#[test]
fn filter_requires_whitelisted_field_and_operator() {
    let criteria = parse("filter[title][like]=rust").unwrap();
    let expr = criteria.filter.unwrap();
    let conditions = expr.conditions();
    assert_eq!(conditions[0].op, FilterOp::Like);
    assert_eq!(conditions[0].value, FilterValue::string("rust"));

    let rejection = parse("filter[title][gt]=rust").unwrap_err();
    assert!(matches!(rejection.errors[0], Error::InvalidFilter { .. }));

    let rejection = parse("filter[views][eq]=3").unwrap_err();
    assert!(matches!(rejection.errors[0], Error::InvalidFilter { .. }));
}

#[test]
fn filter_rejected_wholesale_without_whitelist() {
    let registry = registry();
    let config = EngineConfig::default();
    let parser = QueryParser::new(&registry, &config);
    let meta = registry.get_by_type("authors").unwrap();
    let rejection = parser.parse(meta, "filter[name][eq]=x").unwrap_err();
    match &rejection.errors[0] {
        Error::InvalidFilter { detail, .. } => assert!(detail.contains("not enabled")),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn filter_without_operator_is_rejected() {
    let rejection = parse("filter[title]=x").unwrap_err();
    assert!(matches!(rejection.errors[0], Error::InvalidFilter { .. }));
}

#[test]
fn filter_list_and_dotted_path() {
    let criteria = parse("filter[author.name][eq]=Ada").unwrap();
    assert_eq!(criteria.filter.unwrap().conditions()[0].field, "author.name");

    let registry = registry();
    let mut config = EngineConfig::default();
    config.limits.max_filter_depth = 1;
    let parser = QueryParser::new(&registry, &config);
    let meta = registry.get_by_type("articles").unwrap();
    let rejection = parser.parse(meta, "filter[author.name][eq]=Ada").unwrap_err();
    assert!(matches!(rejection.errors[0], Error::InvalidFilter { .. }));
}

#[test]
fn all_violations_are_aggregated() {
    let rejection = parse("include=bogus&fields[articles]=colour&sort=views").unwrap_err();
    assert_eq!(rejection.errors.len(), 3);
    assert_eq!(rejection.status(), http::StatusCode::BAD_REQUEST);
}
