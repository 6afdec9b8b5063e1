//! Request-level tests driving the router in-process over the memory backend.

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use docgate_server::{AppConfig, build_app, gate::TokenSigner};
use serde_json::{Value, json};
use std::time::Duration;
use tower::ServiceExt;

async fn app(cfg: AppConfig) -> Router {
    build_app(&cfg).await.expect("build app")
}

async fn default_app() -> Router {
    app(AppConfig::default()).await
}

/// Percent-encodes a query string value.
fn encode(raw: &str) -> String {
    raw.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => (b as char).to_string(),
            _ => format!("%{b:02X}"),
        })
        .collect()
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>, token: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header("x-owner-key", token);
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    (status, body)
}

async fn create(app: &Router, collection: &str, body: Value) -> Value {
    let (status, created) = send(app, Method::POST, &format!("/{collection}"), Some(body), None).await;
    assert_eq!(status, StatusCode::CREATED);
    created
}

#[tokio::test]
async fn health_and_banner() {
    let app = default_app().await;

    let (status, body) = send(&app, Method::GET, "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));

    create(&app, "players", json!({ "name": "Alice" })).await;
    let (status, body) = send(&app, Method::GET, "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "docgate");
    assert_eq!(body["collections"], json!(["players"]));
}

#[tokio::test]
async fn alice_and_bob_leaderboard() {
    let app = default_app().await;

    let alice = create(&app, "players", json!({ "name": "Alice", "score": 10 })).await;
    assert_eq!(alice["name"], "Alice");
    assert_eq!(alice["score"], 10);
    assert!(alice["_id"].is_string());

    create(&app, "players", json!({ "name": "Bob", "score": 20 })).await;

    let (status, top) = send(&app, Method::GET, "/players?sort=-score&limit=1", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let top = top.as_array().unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0]["name"], "Bob");
    assert_eq!(top[0]["score"], 20);
}

#[tokio::test]
async fn create_then_read_round_trips() {
    let app = default_app().await;
    let created = create(&app, "notes", json!({ "title": "hello", "tags": ["a", "b"], "meta": { "pinned": true } })).await;
    let id = created["_id"].as_str().unwrap();

    let (status, fetched) = send(&app, Method::GET, &format!("/notes/{id}"), None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn sorting_and_paging_are_consistent() {
    let app = default_app().await;
    for score in [5, 1, 4, 2, 3] {
        create(&app, "scores", json!({ "score": score })).await;
    }

    let (_, ascending) = send(&app, Method::GET, "/scores?sort=score", None, None).await;
    let values = ascending
        .as_array()
        .unwrap()
        .iter()
        .map(|doc| doc["score"].as_i64().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(values, vec![1, 2, 3, 4, 5]);

    let (_, page) = send(&app, Method::GET, "/scores?sort=score&skip=1&limit=2", None, None).await;
    assert_eq!(page.as_array().unwrap(), &ascending.as_array().unwrap()[1..3]);

    let (_, beyond) = send(&app, Method::GET, "/scores?sort=score&skip=10", None, None).await;
    assert_eq!(beyond, json!([]));

    let (status, empty) = send(&app, Method::GET, "/scores?limit=0", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(empty, json!([]));
}

#[tokio::test]
async fn filters_and_projections_apply() {
    let app = default_app().await;
    create(&app, "players", json!({ "name": "Alice", "score": 10 })).await;
    create(&app, "players", json!({ "name": "Bob", "score": 20 })).await;

    let filter = encode(r#"{"score":{"$gt":15}}"#);
    let (status, body) = send(&app, Method::GET, &format!("/players?filter={filter}&select=name"), None, None).await;

    assert_eq!(status, StatusCode::OK);
    let docs = body.as_array().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["name"], "Bob");
    assert!(docs[0].get("score").is_none());
    assert!(docs[0]["_id"].is_string());
}

#[tokio::test]
async fn malformed_list_parameters_are_bad_requests() {
    let app = default_app().await;

    for query in [
        "filter=not-json".to_string(),
        format!("filter={}", encode(r#"{"$where":"1"}"#)),
        format!("filter={}", encode(r#"{"a.b":1}"#)),
        "limit=ten".to_string(),
        "skip=-1".to_string(),
        "select=-name".to_string(),
    ] {
        let (status, body) = send(&app, Method::GET, &format!("/players?{query}"), None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{query}");
        assert!(body["error"].is_string(), "{query}");
    }

    // Nothing reached the store, so nothing was bound
    let (_, banner) = send(&app, Method::GET, "/", None, None).await;
    assert_eq!(banner["collections"], json!([]));
}

#[tokio::test]
async fn required_filters_can_be_enforced() {
    let mut cfg = AppConfig::default();
    cfg.collections.filter_required = true;
    let app = app(cfg).await;

    let (status, _) = send(&app, Method::GET, "/players", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, &format!("/players?filter={}", encode("{}")), None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn malformed_bodies_and_names_are_bad_requests() {
    let app = default_app().await;

    let (status, _) = send(&app, Method::POST, "/players", Some(json!([1, 2])), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/players")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::POST, "/_private", Some(json!({ "a": 1 })), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("collection name"));
}

#[tokio::test]
async fn malformed_ids_fail_and_missing_documents_are_404() {
    let app = default_app().await;
    let missing = "6f1c2b3a-0d4e-4f5a-8b6c-7d8e9f0a1b2c";

    for method in [Method::GET, Method::DELETE] {
        let (status, body) = send(&app, method.clone(), "/players/not-a-uuid", None, None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{method}");
        assert!(body["details"].as_str().unwrap().contains("not-a-uuid"), "{method}");
    }
    let (status, _) = send(&app, Method::PUT, "/players/not-a-uuid", Some(json!({ "a": 1 })), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    // A malformed `_id` inside a filter is still a malformed filter
    let filter = encode(r#"{"_id":"not-a-uuid"}"#);
    let (status, _) = send(&app, Method::GET, &format!("/players?filter={filter}"), None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::GET, &format!("/players/{missing}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, _) = send(&app, Method::PUT, &format!("/players/{missing}"), Some(json!({ "a": 1 })), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::DELETE, &format!("/players/{missing}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_by_id_merges_fields() {
    let app = default_app().await;
    let alice = create(&app, "players", json!({ "name": "Alice", "score": 10 })).await;
    let id = alice["_id"].as_str().unwrap();

    let (status, updated) = send(&app, Method::PUT, &format!("/players/{id}"), Some(json!({ "score": 15 })), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated, json!({ "_id": id, "name": "Alice", "score": 15 }));
}

#[tokio::test]
async fn delete_by_id_is_safe_to_repeat() {
    let app = default_app().await;
    let alice = create(&app, "players", json!({ "name": "Alice" })).await;
    let id = alice["_id"].as_str().unwrap();
    let uri = format!("/players/{id}");

    let (status, body) = send(&app, Method::DELETE, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["_id"], id);
    assert!(body["message"].is_string());

    let (status, _) = send(&app, Method::DELETE, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bulk_update_and_delete_report_counts() {
    let app = default_app().await;
    for (name, team) in [("Alice", "red"), ("Bob", "blue"), ("Carol", "red")] {
        create(&app, "players", json!({ "name": name, "team": team })).await;
    }

    let (status, counts) = send(
        &app,
        Method::PUT,
        "/players",
        Some(json!({ "filter": { "team": "red" }, "update": { "$set": { "team": "green" } } })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(counts, json!({ "matchedCount": 2, "modifiedCount": 2 }));

    let (status, counts) = send(
        &app,
        Method::PUT,
        "/players",
        Some(json!({ "filter": { "team": "purple" }, "update": { "team": "red" } })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(counts, json!({ "matchedCount": 0, "modifiedCount": 0 }));

    let (status, counts) = send(&app, Method::DELETE, "/players", Some(json!({ "filter": { "team": "green" } })), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(counts, json!({ "deletedCount": 2 }));

    let (_, remaining) = send(&app, Method::GET, "/players", None, None).await;
    assert_eq!(remaining.as_array().unwrap().len(), 1);
    assert_eq!(remaining[0]["name"], "Bob");
}

#[tokio::test]
async fn bulk_requests_need_a_filter_and_an_update() {
    let app = default_app().await;

    for body in [
        json!({ "update": { "a": 1 } }),
        json!({ "filter": {} }),
        json!({ "filter": {}, "update": { "$inc": { "a": 1 } } }),
        json!({ "filter": "{oops", "update": { "a": 1 } }),
    ] {
        let (status, _) = send(&app, Method::PUT, "/players", Some(body.clone()), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    }

    let (status, _) = send(&app, Method::DELETE, "/players", Some(json!({})), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, Method::DELETE, "/players", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upsert_key_merges_repeated_creates() {
    let mut cfg = AppConfig::default();
    cfg.collections.upsert_key = Some("email".into());
    let app = app(cfg).await;

    let (status, first) = send(&app, Method::POST, "/owners", Some(json!({ "email": "a@b.c", "plan": "free" })), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, second) = send(&app, Method::POST, "/owners", Some(json!({ "email": "a@b.c", "plan": "pro" })), None).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(first["_id"], second["_id"]);
    assert_eq!(second["plan"], "pro");

    let (_, all) = send(&app, Method::GET, "/owners", None, None).await;
    assert_eq!(all.as_array().unwrap().len(), 1);
}

fn gated(protect_reads: bool) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.gate.enabled = true;
    cfg.gate.secret = Some("s3cret".into());
    cfg.gate.protect_reads = protect_reads;
    cfg
}

#[tokio::test]
async fn gate_rejects_writes_without_a_valid_token() {
    let app = app(gated(false)).await;
    let body = json!({ "name": "Alice" });

    let (status, error) = send(&app, Method::POST, "/players", Some(body.clone()), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(error["error"].is_string());

    let forged = TokenSigner::new("wrong").issue("owner", Duration::from_secs(60)).unwrap();
    let (status, _) = send(&app, Method::POST, "/players", Some(body.clone()), Some(forged.as_str())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let expired = TokenSigner::new("s3cret").issue_until("owner", 1).unwrap();
    let (status, _) = send(&app, Method::POST, "/players", Some(body.clone()), Some(expired.as_str())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = TokenSigner::new("s3cret").issue("owner", Duration::from_secs(60)).unwrap();
    let (status, _) = send(&app, Method::POST, "/players", Some(body), Some(token.as_str())).await;
    assert_eq!(status, StatusCode::CREATED);

    // Reads stay open, and nothing was written by the rejected attempts
    let (status, all) = send(&app, Method::GET, "/players", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn gate_accepts_bearer_tokens_and_can_protect_reads() {
    let app = app(gated(true)).await;
    let token = TokenSigner::new("s3cret").issue("owner", Duration::from_secs(60)).unwrap();

    let (status, _) = send(&app, Method::GET, "/players", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method(Method::GET)
        .uri("/players")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Health checks are never gated
    let (status, _) = send(&app, Method::GET, "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let app = default_app().await;

    let request = Request::builder()
        .uri("/healthz")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.headers()["x-request-id"], "abc-123");
}
