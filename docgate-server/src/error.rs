use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use docgate::error::DocumentStoreError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Failures returned by handlers and middleware.
///
/// Every variant renders as `{"error": <message>, "details"?: <text>}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Internal server error")]
    Internal { details: Option<String> },
}

impl ApiError {
    /// Maps a store error onto the HTTP taxonomy. Backend text is kept in
    /// `details` only when `expose_details` is set.
    pub fn from_store(err: DocumentStoreError, expose_details: bool) -> Self {
        match err {
            DocumentStoreError::DocumentNotFound(..) => ApiError::NotFound(err.to_string()),
            err if err.is_validation() => ApiError::BadRequest(err.to_string()),
            DocumentStoreError::InvalidId(_) => {
                warn!(error = %err, "malformed document id");
                ApiError::Internal {
                    details: expose_details.then(|| err.to_string()),
                }
            }
            err => {
                error!(error = %err, "store operation failed");
                ApiError::Internal {
                    details: expose_details.then(|| err.to_string()),
                }
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_client_error() {
            warn!(status = status.as_u16(), error = %self, "request rejected");
        }

        let body = match &self {
            ApiError::Internal { details: Some(details) } => json!({
                "error": self.to_string(),
                "details": details,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn envelope(error: ApiError) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_errors_are_bad_requests() {
        let error = ApiError::from_store(DocumentStoreError::InvalidQuery("limit must be a number".into()), true);
        let (status, body) = envelope(error).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Invalid query: limit must be a number" }));
    }

    #[tokio::test]
    async fn malformed_ids_are_server_errors() {
        let error = ApiError::from_store(DocumentStoreError::InvalidId("nope".into()), true);
        let (status, body) = envelope(error).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({ "error": "Internal server error", "details": "Invalid document id: nope" })
        );
    }

    #[tokio::test]
    async fn missing_documents_are_not_found() {
        let error = ApiError::from_store(
            DocumentStoreError::DocumentNotFound("42".into(), "players".into()),
            true,
        );
        let (status, body) = envelope(error).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("players"));
    }

    #[tokio::test]
    async fn backend_details_follow_the_exposure_flag() {
        let exposed = ApiError::from_store(DocumentStoreError::Backend("connection reset".into()), true);
        let (status, body) = envelope(exposed).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({ "error": "Internal server error", "details": "Backend error: connection reset" })
        );

        let hidden = ApiError::from_store(DocumentStoreError::Backend("connection reset".into()), false);
        let (_, body) = envelope(hidden).await;
        assert_eq!(body, json!({ "error": "Internal server error" }));
    }
}
