//! Profile integration: activation via media type and config, hook
//! mutation of documents, hook failure as request outcome.

mod support;

use std::sync::Arc;

use jsonapi_core::MEDIA_TYPE;
use jsonapi_engine::hooks::{MetaPhase, QueryPhase};
use jsonapi_engine::{Error, JsonApiEngine, Profile, RequestContext};
use serde_json::{json, Value};
use support::{body_json, default_config, registry, InMemoryStore};

const COUNTS_URI: &str = "https://example.org/profiles/counts";
const CLAMP_URI: &str = "https://example.org/profiles/clamp";

/// Adds a marker to top-level meta.
struct Counts;

impl Profile for Counts {
    fn uri(&self) -> &str {
        COUNTS_URI
    }

    fn on_top_level_meta(&self, phase: &mut MetaPhase<'_>) -> Result<(), Error> {
        phase
            .meta
            .insert("countsProfile".to_string(), Value::Bool(true));
        Ok(())
    }
}

/// Clamps every page size to one; misbehaves on purpose for the failure
/// test when the type is `tags`.
struct Clamp;

impl Profile for Clamp {
    fn uri(&self) -> &str {
        CLAMP_URI
    }

    fn on_parse_query(&self, phase: &mut QueryPhase<'_>) -> Result<(), Error> {
        if phase.type_name == "tags" {
            return Err(Error::internal(anyhow::anyhow!("clamp does not do tags")));
        }
        phase.criteria.page.size = 1;
        Ok(())
    }
}

fn profiled_engine() -> (JsonApiEngine, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::fixture());
    let engine = JsonApiEngine::builder()
        .registry(registry())
        .config(default_config())
        .profile(Arc::new(Counts))
        .profile(Arc::new(Clamp))
        .repository(store.clone())
        .persister(store.clone())
        .relationship_reader(store.clone())
        .relationship_updater(store.clone())
        .existence_checker(store.clone())
        .transaction_manager(store.clone())
        .surrogate_purger(store.clone())
        .build()
        .unwrap();
    (engine, store)
}

#[tokio::test]
async fn requested_profile_runs_and_is_echoed() {
    let (engine, _store) = profiled_engine();
    let accept = format!("{MEDIA_TYPE}; profile=\"{COUNTS_URI}\"");
    let response = engine
        .handle(RequestContext::get("/api/articles").with_header("accept", &accept))
        .await;
    assert_eq!(response.status, 200);
    assert!(response
        .header("content-type")
        .unwrap()
        .contains(&format!("profile=\"{COUNTS_URI}\"")));

    let body = body_json(&response);
    assert_eq!(body["meta"]["countsProfile"], json!(true));
    // The other registered profile stayed inactive.
    assert_eq!(body["data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn inactive_profiles_do_not_run() {
    let (engine, _store) = profiled_engine();
    let response = engine.handle(RequestContext::get("/api/articles")).await;
    let body = body_json(&response);
    assert!(body["meta"].get("countsProfile").is_none());
}

#[tokio::test]
async fn profile_can_rewrite_criteria() {
    let (engine, _store) = profiled_engine();
    let accept = format!("{MEDIA_TYPE}; profile=\"{CLAMP_URI}\"");
    let response = engine
        .handle(RequestContext::get("/api/articles").with_header("accept", &accept))
        .await;
    let body = body_json(&response);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["meta"]["total"], 3);
}

#[tokio::test]
async fn hook_failure_becomes_the_request_outcome() {
    let (engine, _store) = profiled_engine();
    let accept = format!("{MEDIA_TYPE}; profile=\"{CLAMP_URI}\"");
    let response = engine
        .handle(RequestContext::get("/api/tags").with_header("accept", &accept))
        .await;
    assert_eq!(response.status, 500);
    let body = body_json(&response);
    assert_eq!(body["errors"][0]["code"], "internal");
    // Collaborator/hook detail never leaks.
    assert_eq!(body["errors"][0]["detail"], "an internal error occurred");
}

#[tokio::test]
async fn per_type_profiles_activate_without_request_opt_in() {
    let store = Arc::new(InMemoryStore::fixture());
    let mut config = default_config();
    config
        .profiles
        .per_type
        .insert("articles".to_string(), vec![COUNTS_URI.to_string()]);
    let engine = JsonApiEngine::builder()
        .registry(registry())
        .config(config)
        .profile(Arc::new(Counts))
        .repository(store.clone())
        .persister(store.clone())
        .relationship_reader(store.clone())
        .relationship_updater(store.clone())
        .existence_checker(store.clone())
        .transaction_manager(store.clone())
        .surrogate_purger(store.clone())
        .build()
        .unwrap();

    let response = engine.handle(RequestContext::get("/api/articles")).await;
    let body = body_json(&response);
    assert_eq!(body["meta"]["countsProfile"], json!(true));

    let response = engine.handle(RequestContext::get("/api/tags")).await;
    let body = body_json(&response);
    assert!(body["meta"].get("countsProfile").is_none());
}
