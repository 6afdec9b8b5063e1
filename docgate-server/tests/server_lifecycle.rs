//! Boots the gateway on an ephemeral port and talks to it over real HTTP.

use docgate_server::{AppConfig, build_app};
use serde_json::{Value, json};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};

async fn start_server() -> (String, oneshot::Sender<()>, JoinHandle<()>) {
    let app = build_app(&AppConfig::default()).await.expect("build app");

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("server error");
    });

    (format!("http://{addr}"), shutdown_tx, handle)
}

#[tokio::test]
async fn serves_requests_and_shuts_down_gracefully() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let health = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert_eq!(health.status(), reqwest::StatusCode::OK);
    assert!(health.headers().contains_key("x-request-id"));

    let created = client
        .post(format!("{base}/players"))
        .json(&json!({ "name": "Alice", "score": 10 }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), reqwest::StatusCode::CREATED);
    let created: Value = created.json().await.unwrap();
    let id = created["_id"].as_str().unwrap();

    let fetched: Value = client
        .get(format!("{base}/players/{id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched, created);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    assert!(client.get(format!("{base}/healthz")).send().await.is_err());
}
