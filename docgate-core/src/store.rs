//! Main document store interface for the gateway.
//!
//! [`DocumentStore`] owns the backend, the model registry and the collection options.
//! Request handlers ask it for a [`Collection`] by name; the first request for a name
//! binds it, later requests reuse the binding.
//!
//! # Example
//!
//! ```ignore
//! use docgate::{prelude::*, memory::InMemoryStore};
//!
//! let store = DocumentStore::new(InMemoryStore::new(), CollectionOptions::default());
//! let players = store.collection("players").await?;
//! ```

use std::sync::Arc;
use tracing::info;

use crate::{
    backend::StoreBackend,
    collection::{Collection, CollectionOptions},
    error::DocumentStoreResult,
    registry::ModelRegistry,
};

/// A gateway-facing document store bound to a runtime-selected backend.
#[derive(Debug)]
pub struct DocumentStore {
    backend: Arc<dyn StoreBackend>,
    registry: ModelRegistry,
    options: Arc<CollectionOptions>,
}

impl DocumentStore {
    /// Creates a new document store with the given backend.
    pub fn new<B: StoreBackend + 'static>(backend: B, options: CollectionOptions) -> Self {
        Self::from_shared(Arc::new(backend), options)
    }

    /// Creates a document store from an already shared backend.
    pub fn from_shared(backend: Arc<dyn StoreBackend>, options: CollectionOptions) -> Self {
        Self {
            backend,
            registry: ModelRegistry::new(),
            options: Arc::new(options),
        }
    }

    pub fn backend(&self) -> &Arc<dyn StoreBackend> {
        &self.backend
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn options(&self) -> &CollectionOptions {
        &self.options
    }

    /// Resolves `name` through the model registry and returns a collection handle.
    ///
    /// # Errors
    ///
    /// Fails for invalid collection names or when the backend cannot create the collection.
    pub async fn collection(&self, name: &str) -> DocumentStoreResult<Collection> {
        let binding = self
            .registry
            .resolve(name, self.backend.as_ref())
            .await?;

        Ok(Collection::new(binding, self.backend.clone(), self.options.clone()))
    }

    /// Lists the collections present in the backend, sorted by name.
    pub async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        let mut names = self.backend.list_collections().await?;
        names.sort();

        Ok(names)
    }

    /// Shuts down the backend.
    pub async fn shutdown(&self) -> DocumentStoreResult<()> {
        info!("shutting down document store");
        self.backend.shutdown().await
    }
}
