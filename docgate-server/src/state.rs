use std::sync::Arc;

use docgate::{error::DocumentStoreError, store::DocumentStore, translate::QueryTranslator};

use crate::{config::AppConfig, error::ApiError};

/// Shared per-process state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<DocumentStore>,
    pub translator: QueryTranslator,
    pub expose_error_details: bool,
}

impl AppState {
    pub fn new(cfg: &AppConfig, store: Arc<DocumentStore>) -> Self {
        Self {
            store,
            translator: QueryTranslator::new(cfg.collections.filter_required),
            expose_error_details: cfg.server.expose_error_details,
        }
    }

    /// Converts a store error into the response error for this server.
    pub fn reject(&self, err: DocumentStoreError) -> ApiError {
        ApiError::from_store(err, self.expose_error_details)
    }
}
