//! Write-path integration: create, update, delete, relationship writes,
//! validation mapping, and client-generated ids.

mod support;

use http::Method;
use jsonapi_core::MEDIA_TYPE;
use jsonapi_engine::RequestContext;
use serde_json::json;
use support::{body_json, engine, engine_with};

fn post(path: &str, body: serde_json::Value) -> RequestContext {
    RequestContext::get(path)
        .with_method(Method::POST)
        .with_header("content-type", MEDIA_TYPE)
        .with_body(serde_json::to_vec(&body).unwrap())
}

fn patch(path: &str, body: serde_json::Value) -> RequestContext {
    post(path, body).with_method(Method::PATCH)
}

fn delete(path: &str) -> RequestContext {
    RequestContext::get(path).with_method(Method::DELETE)
}

#[tokio::test]
async fn create_returns_201_location_and_surrogate_keys() {
    let (engine, store) = engine();
    let response = engine
        .handle(post(
            "/api/articles",
            json!({"data": {
                "type": "articles",
                "attributes": {"title": "X"},
                "relationships": {"author": {"data": {"type": "authors", "id": "a1"}}}
            }}),
        ))
        .await;
    assert_eq!(response.status, 201);

    let body = body_json(&response);
    let id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["attributes"]["title"], "X");
    assert_eq!(
        response.header("location"),
        Some(format!("http://localhost/api/articles/{id}").as_str())
    );
    assert_eq!(
        response.header("surrogate-key"),
        Some(format!("articles articles:{id}").as_str())
    );

    // The entity exists and carries the linkage.
    let entity = store.get("articles", &id).unwrap();
    assert_eq!(entity["author"], "a1");

    // The purger was asked to invalidate the type and resource keys.
    let purged = store.purged();
    assert_eq!(purged.len(), 1);
    assert_eq!(purged[0], vec!["articles".to_string(), format!("articles:{id}")]);
}

#[tokio::test]
async fn create_with_missing_relationship_target_is_404() {
    let (engine, store) = engine();
    let before = store.count("articles");
    let response = engine
        .handle(post(
            "/api/articles",
            json!({"data": {
                "type": "articles",
                "attributes": {"title": "X"},
                "relationships": {"author": {"data": {"type": "authors", "id": "nope"}}}
            }}),
        ))
        .await;
    assert_eq!(response.status, 404);
    let body = body_json(&response);
    assert_eq!(
        body["errors"][0]["source"]["pointer"],
        "/data/relationships/author/data"
    );
    assert_eq!(store.count("articles"), before);
}

#[tokio::test]
async fn validation_failure_maps_to_422_with_pointer() {
    let (engine, store) = engine();
    let before = store.count("articles");
    let response = engine
        .handle(post(
            "/api/articles",
            json!({"data": {"type": "articles", "attributes": {"title": ""}}}),
        ))
        .await;
    assert_eq!(response.status, 422);
    let body = body_json(&response);
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["code"], "unprocessable-entity");
    assert_eq!(errors[0]["source"]["pointer"], "/data/attributes/title");
    assert_eq!(store.count("articles"), before);
}

#[tokio::test]
async fn round_trip_patch_of_read_attributes_is_stable() {
    let (engine, store) = engine();

    let read = engine.handle(RequestContext::get("/api/articles/1")).await;
    let before = body_json(&read);
    let attributes = before["data"]["attributes"].clone();

    // PATCH back exactly what was read; the read-only createdAt is
    // silently dropped rather than rejected.
    let response = engine
        .handle(patch(
            "/api/articles/1",
            json!({"data": {"type": "articles", "id": "1", "attributes": attributes}}),
        ))
        .await;
    assert_eq!(response.status, 200);

    let after = body_json(&engine.handle(RequestContext::get("/api/articles/1")).await);
    assert_eq!(before["data"], after["data"]);
    assert_eq!(store.get("articles", "1").unwrap()["title"], "First");
}

#[tokio::test]
async fn update_unknown_attribute_is_400_and_unwritten() {
    let (engine, store) = engine();
    let response = engine
        .handle(patch(
            "/api/articles/1",
            json!({"data": {"type": "articles", "id": "1", "attributes": {"colour": "red"}}}),
        ))
        .await;
    assert_eq!(response.status, 400);
    let body = body_json(&response);
    assert_eq!(body["errors"][0]["code"], "unknown-attribute");
    assert_eq!(
        body["errors"][0]["source"]["pointer"],
        "/data/attributes/colour"
    );
    assert!(store.get("articles", "1").unwrap().get("colour").is_none());
}

#[tokio::test]
async fn delete_removes_and_purges() {
    let (engine, store) = engine();
    let response = engine.handle(delete("/api/articles/3")).await;
    assert_eq!(response.status, 204);
    assert!(response.body.is_none());
    assert!(store.get("articles", "3").is_none());
    assert_eq!(
        store.purged()[0],
        vec!["articles".to_string(), "articles:3".to_string()]
    );

    let response = engine.handle(delete("/api/articles/3")).await;
    assert_eq!(response.status, 404);
}

#[tokio::test]
async fn client_generated_ids_are_policy_gated() {
    let (engine, store) = engine();

    // Articles do not opt in: 403 with the id pointer.
    let response = engine
        .handle(post(
            "/api/articles",
            json!({"data": {"type": "articles", "id": "custom", "attributes": {"title": "X"}}}),
        ))
        .await;
    assert_eq!(response.status, 403);
    let body = body_json(&response);
    assert_eq!(body["errors"][0]["code"], "forbidden-client-generated-id");
    assert_eq!(body["errors"][0]["source"]["pointer"], "/data/id");

    // Tags opt in: the id is honored.
    let response = engine
        .handle(post(
            "/api/tags",
            json!({"data": {"type": "tags", "id": "t9", "attributes": {"label": "new"}}}),
        ))
        .await;
    assert_eq!(response.status, 201);
    assert!(store.get("tags", "t9").is_some());

    // Reusing a taken id is a conflict.
    let response = engine
        .handle(post(
            "/api/tags",
            json!({"data": {"type": "tags", "id": "t1", "attributes": {"label": "dup"}}}),
        ))
        .await;
    assert_eq!(response.status, 409);
    let body = body_json(&response);
    assert_eq!(body["errors"][0]["code"], "conflict");
}

#[tokio::test]
async fn relationship_replace_add_remove() {
    let (engine, store) = engine();

    // PATCH replaces to-one linkage.
    let response = engine
        .handle(patch(
            "/api/articles/1/relationships/author",
            json!({"data": {"type": "authors", "id": "a2"}}),
        ))
        .await;
    assert_eq!(response.status, 200);
    let body = body_json(&response);
    assert_eq!(body["data"]["id"], "a2");
    assert_eq!(store.get("articles", "1").unwrap()["author"], "a2");

    // PATCH with null clears it.
    let response = engine
        .handle(patch(
            "/api/articles/1/relationships/author",
            json!({"data": null}),
        ))
        .await;
    assert_eq!(response.status, 200);
    let body = body_json(&response);
    assert!(body["data"].is_null());

    // POST adds to a to-many relationship.
    let response = engine
        .handle(post(
            "/api/articles/3/relationships/tags",
            json!({"data": [{"type": "tags", "id": "t1"}]}),
        ))
        .await;
    assert_eq!(response.status, 200);
    assert_eq!(store.get("articles", "3").unwrap()["tags"], json!(["t1"]));

    // DELETE removes members.
    let response = engine
        .handle(
            post(
                "/api/articles/1/relationships/tags",
                json!({"data": [{"type": "tags", "id": "t1"}]}),
            )
            .with_method(Method::DELETE),
        )
        .await;
    assert_eq!(response.status, 200);
    assert_eq!(store.get("articles", "1").unwrap()["tags"], json!(["t2"]));
}

#[tokio::test]
async fn to_one_add_remove_is_405() {
    let (engine, _store) = engine();
    let response = engine
        .handle(post(
            "/api/articles/1/relationships/author",
            json!({"data": {"type": "authors", "id": "a2"}}),
        ))
        .await;
    assert_eq!(response.status, 405);
    assert_eq!(response.header("allow"), Some("GET, PATCH"));
}

#[tokio::test]
async fn relationship_writes_can_be_disabled() {
    let mut config = support::default_config();
    config.write.allow_relationship_writes = false;
    let (engine, store) = engine_with(config);

    let response = engine
        .handle(patch(
            "/api/articles/1/relationships/author",
            json!({"data": null}),
        ))
        .await;
    assert_eq!(response.status, 405);
    assert_eq!(response.header("allow"), Some("GET"));
    assert_eq!(store.get("articles", "1").unwrap()["author"], "a1");
}

#[tokio::test]
async fn relationship_write_response_can_be_204() {
    let mut config = support::default_config();
    config.relationships.write_response = jsonapi_engine::WriteResponseMode::NoContent;
    let (engine, _store) = engine_with(config);

    let response = engine
        .handle(patch(
            "/api/articles/1/relationships/author",
            json!({"data": {"type": "authors", "id": "a2"}}),
        ))
        .await;
    assert_eq!(response.status, 204);
    assert!(response.body.is_none());
}

#[tokio::test]
async fn relationship_write_target_must_exist() {
    let (engine, store) = engine();
    let response = engine
        .handle(patch(
            "/api/articles/1/relationships/author",
            json!({"data": {"type": "authors", "id": "ghost"}}),
        ))
        .await;
    assert_eq!(response.status, 404);
    assert_eq!(store.get("articles", "1").unwrap()["author"], "a1");
}
