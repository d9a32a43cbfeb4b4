//! Atomic-operations integration: LID flow, ordering, rollback, limits.

mod support;

use http::Method;
use jsonapi_engine::{RequestContext, ATOMIC_EXT};
use serde_json::json;
use support::{body_json, engine, engine_with};

fn atomic_content_type() -> String {
    format!("application/vnd.api+json; ext=\"{ATOMIC_EXT}\"")
}

fn atomic(body: serde_json::Value) -> RequestContext {
    RequestContext::get("/api/operations")
        .with_method(Method::POST)
        .with_header("content-type", &atomic_content_type())
        .with_header("accept", &atomic_content_type())
        .with_body(serde_json::to_vec(&body).unwrap())
}

#[tokio::test]
async fn lid_declared_by_add_resolves_in_later_operations() {
    let (engine, store) = engine();
    let response = engine
        .handle(atomic(json!({"atomic:operations": [
            {"op": "add", "data": {
                "type": "authors", "lid": "a-new",
                "attributes": {"name": "Alan"}
            }},
            {"op": "add", "data": {
                "type": "articles",
                "attributes": {"title": "Atomic"},
                "relationships": {"author": {"data": {"type": "authors", "lid": "a-new"}}}
            }}
        ]})))
        .await;
    assert_eq!(response.status, 200);
    assert!(response
        .header("content-type")
        .unwrap()
        .contains("ext=\"https://jsonapi.org/ext/atomic\""));

    let body = body_json(&response);
    let results = body["atomic:results"].as_array().unwrap();
    assert_eq!(results.len(), 2);

    let author_id = results[0]["data"]["id"].as_str().unwrap();
    let article_id = results[1]["data"]["id"].as_str().unwrap();
    // The created article's linkage resolved the lid to the real id, and
    // the result document shows it.
    assert_eq!(
        results[1]["data"]["relationships"]["author"]["data"]["id"]
            .as_str()
            .unwrap(),
        author_id
    );
    assert_eq!(store.get("articles", article_id).unwrap()["author"], author_id);
    assert_eq!(store.get("authors", author_id).unwrap()["name"], "Alan");
}

#[tokio::test]
async fn failure_rolls_back_every_earlier_operation() {
    let (engine, store) = engine();
    let authors_before = store.count("authors");
    let articles_before = store.count("articles");

    let response = engine
        .handle(atomic(json!({"atomic:operations": [
            {"op": "add", "data": {"type": "authors", "attributes": {"name": "Alan"}}},
            {"op": "add", "data": {"type": "articles", "attributes": {"title": "Kept?"}}},
            {"op": "remove", "ref": {"type": "articles", "id": "does-not-exist"}}
        ]})))
        .await;
    assert_eq!(response.status, 404);
    let body = body_json(&response);
    assert_eq!(
        body["errors"][0]["source"]["pointer"],
        "/atomic:operations/2"
    );

    // All-or-nothing: nothing created by ops 0 and 1 survives.
    assert_eq!(store.count("authors"), authors_before);
    assert_eq!(store.count("articles"), articles_before);
}

#[tokio::test]
async fn duplicate_lid_is_rejected_before_any_side_effect() {
    let (engine, store) = engine();
    let before = store.count("authors");
    let response = engine
        .handle(atomic(json!({"atomic:operations": [
            {"op": "add", "data": {"type": "authors", "lid": "dup", "attributes": {"name": "A"}}},
            {"op": "add", "data": {"type": "authors", "lid": "dup", "attributes": {"name": "B"}}}
        ]})))
        .await;
    assert_eq!(response.status, 400);
    let body = body_json(&response);
    assert_eq!(body["errors"][0]["code"], "duplicate-lid");
    assert_eq!(
        body["errors"][0]["source"]["pointer"],
        "/atomic:operations/1/data/lid"
    );
    assert_eq!(store.count("authors"), before);
}

#[tokio::test]
async fn lid_used_before_declaration_is_unknown() {
    let (engine, _store) = engine();
    let response = engine
        .handle(atomic(json!({"atomic:operations": [
            {"op": "add", "data": {
                "type": "articles",
                "attributes": {"title": "Early"},
                "relationships": {"author": {"data": {"type": "authors", "lid": "later"}}}
            }},
            {"op": "add", "data": {"type": "authors", "lid": "later", "attributes": {"name": "L"}}}
        ]})))
        .await;
    assert_eq!(response.status, 400);
    let body = body_json(&response);
    assert_eq!(body["errors"][0]["code"], "unknown-lid");
    assert_eq!(
        body["errors"][0]["source"]["pointer"],
        "/atomic:operations/0/data/relationships/author/data"
    );
}

#[tokio::test]
async fn update_and_remove_by_lid_ref() {
    let (engine, store) = engine();
    let response = engine
        .handle(atomic(json!({"atomic:operations": [
            {"op": "add", "data": {"type": "tags", "lid": "t-new", "attributes": {"label": "fresh"}}},
            {"op": "update", "ref": {"type": "tags", "lid": "t-new"},
             "data": {"type": "tags", "attributes": {"label": "renamed"}}},
        ]})))
        .await;
    assert_eq!(response.status, 200);
    let body = body_json(&response);
    let results = body["atomic:results"].as_array().unwrap();
    let id = results[0]["data"]["id"].as_str().unwrap();
    assert_eq!(results[1]["data"]["attributes"]["label"], "renamed");
    assert_eq!(store.get("tags", id).unwrap()["label"], "renamed");
}

#[tokio::test]
async fn remove_only_batch_returns_204() {
    let (engine, store) = engine();
    let response = engine
        .handle(atomic(json!({"atomic:operations": [
            {"op": "remove", "ref": {"type": "articles", "id": "3"}}
        ]})))
        .await;
    assert_eq!(response.status, 204);
    assert!(response.body.is_none());
    assert!(store.get("articles", "3").is_none());
}

#[tokio::test]
async fn relationship_operation_updates_linkage() {
    let (engine, store) = engine();
    let response = engine
        .handle(atomic(json!({"atomic:operations": [
            {"op": "add", "ref": {"type": "articles", "id": "3", "relationship": "tags"},
             "data": [{"type": "tags", "id": "t1"}]},
            {"op": "update", "ref": {"type": "articles", "id": "1", "relationship": "author"},
             "data": {"type": "authors", "id": "a2"}}
        ]})))
        .await;
    assert_eq!(response.status, 204);
    assert_eq!(store.get("articles", "3").unwrap()["tags"], json!(["t1"]));
    assert_eq!(store.get("articles", "1").unwrap()["author"], "a2");
}

#[tokio::test]
async fn operation_count_limit() {
    let mut config = support::default_config();
    config.limits.max_operations = 2;
    let (engine, _store) = engine_with(config);

    let op = json!({"op": "remove", "ref": {"type": "articles", "id": "1"}});
    let response = engine
        .handle(atomic(json!({"atomic:operations": [op.clone(), op.clone(), op]})))
        .await;
    assert_eq!(response.status, 400);
    let body = body_json(&response);
    assert_eq!(body["errors"][0]["code"], "too-many-operations");
}

#[tokio::test]
async fn unknown_operation_verb() {
    let (engine, _store) = engine();
    let response = engine
        .handle(atomic(json!({"atomic:operations": [
            {"op": "upsert", "data": {"type": "tags", "attributes": {"label": "x"}}}
        ]})))
        .await;
    assert_eq!(response.status, 400);
    let body = body_json(&response);
    assert_eq!(body["errors"][0]["code"], "unknown-operation");
    assert_eq!(
        body["errors"][0]["source"]["pointer"],
        "/atomic:operations/0/op"
    );
}

#[tokio::test]
async fn later_operations_observe_earlier_writes() {
    let (engine, store) = engine();
    // Create an author, then an article referencing it by lid, then point
    // an existing article's author at the same new author by real
    // linkage through the article created in between.
    let response = engine
        .handle(atomic(json!({"atomic:operations": [
            {"op": "add", "data": {"type": "authors", "lid": "chain", "attributes": {"name": "Chain"}}},
            {"op": "update", "ref": {"type": "articles", "id": "2"},
             "data": {"type": "articles",
                      "relationships": {"author": {"data": {"type": "authors", "lid": "chain"}}}}}
        ]})))
        .await;
    assert_eq!(response.status, 200);
    let body = body_json(&response);
    let author_id = body["atomic:results"][0]["data"]["id"].as_str().unwrap();
    assert_eq!(store.get("articles", "2").unwrap()["author"], author_id);
}
