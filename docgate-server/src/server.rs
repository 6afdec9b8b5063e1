use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router, middleware,
    routing::get,
};
use docgate::{
    error::{DocumentStoreError, DocumentStoreResult},
    memory::InMemoryStore,
    store::DocumentStore,
};
use tokio::{net::TcpListener, signal::ctrl_c};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use crate::{
    config::{AppConfig, StorageBackendKind},
    gate::{Gate, require_owner},
    handlers,
    middleware as app_middleware,
    state::AppState,
};

/// Connects the configured storage backend and wraps it in a document store.
pub async fn build_store(cfg: &AppConfig) -> DocumentStoreResult<Arc<DocumentStore>> {
    let options = cfg.collections.options();

    let store = match cfg.storage.backend {
        StorageBackendKind::Memory => {
            info!("using in-memory storage");
            DocumentStore::new(InMemoryStore::new(), options)
        }
        #[cfg(feature = "mongodb")]
        StorageBackendKind::Mongodb => {
            use docgate::{backend::StoreBackendBuilder, mongodb::MongoDbStore};

            let uri = cfg.storage.uri.as_deref().ok_or_else(|| {
                DocumentStoreError::Initialization("storage.uri is required for mongodb".into())
            })?;
            let backend = MongoDbStore::builder(uri, &cfg.storage.database).build().await?;
            info!(database = %cfg.storage.database, "using MongoDB storage");
            DocumentStore::new(backend, options)
        }
        #[cfg(not(feature = "mongodb"))]
        StorageBackendKind::Mongodb => {
            return Err(DocumentStoreError::Initialization(
                "built without the mongodb feature".into(),
            ));
        }
    };

    Ok(Arc::new(store))
}

pub fn build_router(cfg: &AppConfig, store: Arc<DocumentStore>) -> Router {
    let state = AppState::new(cfg, store);

    let mut collections = Router::new()
        .route(
            "/{collection}",
            get(handlers::list_documents)
                .post(handlers::create_document)
                .put(handlers::bulk_update)
                .delete(handlers::bulk_delete),
        )
        .route(
            "/{collection}/{id}",
            get(handlers::get_document)
                .put(handlers::update_document)
                .delete(handlers::delete_document),
        );

    if let Some(gate) = Gate::from_config(&cfg.gate) {
        info!(protect_reads = cfg.gate.protect_reads, "owner gate enabled");
        collections = collections.route_layer(middleware::from_fn_with_state(Arc::new(gate), require_owner));
    }

    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .merge(collections)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        request_id = %req_id
                    )
                })
                .on_response(|res: &axum::http::Response<_>, latency: std::time::Duration, _span: &tracing::Span| {
                    tracing::info!(
                        http.status = %res.status().as_u16(),
                        elapsed_ms = %latency.as_millis(),
                        "request handled"
                    );
                }),
        )
        // Outermost, so the trace span can read the request id
        .layer(middleware::from_fn(app_middleware::request_id))
}

pub async fn build_app(cfg: &AppConfig) -> DocumentStoreResult<Router> {
    Ok(build_router(cfg, build_store(cfg).await?))
}

/// Serves until Ctrl+C or SIGTERM, then shuts the backend down.
pub async fn run(cfg: AppConfig) -> anyhow::Result<()> {
    let store = build_store(&cfg).await.context("storage initialization failed")?;
    let app = build_router(&cfg, store.clone());

    let addr = cfg.resolve_addr().await.map_err(anyhow::Error::msg)?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "docgate listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    store.shutdown().await.context("backend shutdown failed")?;
    info!("docgate stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
        } else {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
