use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use docgate::{collection::Created, translate::ListParams};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::{error::ApiError, state::AppState};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

fn json_body(body: &Bytes) -> Result<Value, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("request body is required".into()));
    }

    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("request body is not valid JSON: {e}")))
}

pub async fn root(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let collections = state
        .store
        .list_collections()
        .await
        .map_err(|e| state.reject(e))?;

    let body = json!({
        "service": "docgate",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "collections": collections,
    });
    Ok((StatusCode::OK, Json(body)))
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

#[tracing::instrument(skip(state, body))]
pub async fn create_document(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let body = json_body(&body)?;
    let handle = state.store.collection(&collection).await.map_err(|e| state.reject(e))?;

    let response = match handle.create(&body).await.map_err(|e| state.reject(e))? {
        Created::Inserted(document) => {
            info!(id = %document["_id"], "document created");
            (StatusCode::CREATED, Json(document))
        }
        Created::Upserted { document, created } => {
            info!(id = %document["_id"], created, "document upserted");
            (StatusCode::OK, Json(document))
        }
    };

    Ok(response)
}

#[tracing::instrument(skip(state))]
pub async fn list_documents(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    // Translate before touching the store so malformed input never reaches it
    let query = state.translator.list_query(&params).map_err(|e| state.reject(e))?;
    let handle = state.store.collection(&collection).await.map_err(|e| state.reject(e))?;

    let documents = handle.find(query).await.map_err(|e| state.reject(e))?;
    debug!(count = documents.len(), "documents listed");

    Ok(Json(documents))
}

#[tracing::instrument(skip(state))]
pub async fn get_document(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let handle = state.store.collection(&collection).await.map_err(|e| state.reject(e))?;
    let document = handle.find_by_id(&id).await.map_err(|e| state.reject(e))?;

    Ok(Json(document))
}

#[tracing::instrument(skip(state, body))]
pub async fn update_document(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let body = json_body(&body)?;
    let handle = state.store.collection(&collection).await.map_err(|e| state.reject(e))?;
    let document = handle.update_by_id(&id, &body).await.map_err(|e| state.reject(e))?;

    info!("document updated");
    Ok(Json(document))
}

#[tracing::instrument(skip(state, body))]
pub async fn bulk_update(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let body = json_body(&body)?;
    let update = state.translator.bulk_update(&body).map_err(|e| state.reject(e))?;
    let handle = state.store.collection(&collection).await.map_err(|e| state.reject(e))?;

    let counts = handle
        .update_many(update.filter, update.fields)
        .await
        .map_err(|e| state.reject(e))?;
    info!(matched = counts.matched_count, modified = counts.modified_count, "bulk update finished");

    Ok(Json(counts))
}

#[tracing::instrument(skip(state))]
pub async fn delete_document(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let handle = state.store.collection(&collection).await.map_err(|e| state.reject(e))?;
    let deleted = handle.delete_by_id(&id).await.map_err(|e| state.reject(e))?;

    info!("document deleted");
    Ok(Json(json!({
        "message": "Document deleted",
        "_id": deleted.to_string(),
    })))
}

#[tracing::instrument(skip(state, body))]
pub async fn bulk_delete(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let body = json_body(&body)?;
    let filter = state.translator.bulk_delete(&body).map_err(|e| state.reject(e))?;
    let handle = state.store.collection(&collection).await.map_err(|e| state.reject(e))?;

    let deleted = handle.delete_many(filter).await.map_err(|e| state.reject(e))?;
    info!(deleted, "bulk delete finished");

    Ok(Json(json!({ "deletedCount": deleted })))
}
