//! Lazy, process-wide binding of collection names to backend collections.
//!
//! The first resolution of a name validates it, asks the backend to create the
//! collection and caches the binding. Later resolutions return the cached binding.
//! Bindings are never evicted.
//!
//! No registry-wide lock is held while the backend creates a collection: only
//! resolutions of the same unbound name wait for it.

use chrono::{DateTime, Utc};
use mea::{mutex::Mutex, rwlock::RwLock};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info};

use crate::{
    backend::StoreBackend,
    error::{DocumentStoreError, DocumentStoreResult},
};

const MAX_COLLECTION_NAME_LEN: usize = 64;

/// The association between a caller-supplied name and a backend collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionBinding {
    name: String,
    bound_at: DateTime<Utc>,
}

impl CollectionBinding {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// When the binding was first made in this process.
    pub fn bound_at(&self) -> DateTime<Utc> {
        self.bound_at
    }
}

/// Validates a collection name taken from a request path.
///
/// Names are 1 to 64 characters long, start with an ASCII letter or digit and
/// otherwise contain only ASCII letters, digits, `_` and `-`.
pub fn validate_collection_name(name: &str) -> DocumentStoreResult<()> {
    let mut chars = name.chars();

    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => chars
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
        _ => false,
    };

    if !valid || name.len() > MAX_COLLECTION_NAME_LEN {
        return Err(DocumentStoreError::InvalidCollectionName(name.to_string()));
    }

    Ok(())
}

/// Insert-once cache of collection bindings.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    bindings: RwLock<HashMap<String, Arc<CollectionBinding>>>,
    /// One lock per name that is currently being bound.
    pending: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the binding for `name`, creating it on first use.
    ///
    /// Concurrent first resolutions of the same name are serialized on a per-name
    /// lock and observe a single binding. Other names, cached or not, proceed
    /// while the backend is creating the collection.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidCollectionName`] for names outside the
    /// accepted character set, or the backend's error if the collection could not
    /// be created.
    pub async fn resolve(
        &self,
        name: &str,
        backend: &dyn StoreBackend,
    ) -> DocumentStoreResult<Arc<CollectionBinding>> {
        if let Some(binding) = self.bindings.read().await.get(name) {
            return Ok(binding.clone());
        }

        validate_collection_name(name)?;

        let slot = self
            .pending
            .lock()
            .await
            .entry(name.to_string())
            .or_default()
            .clone();
        let _binding = slot.lock().await;

        if let Some(binding) = self.bindings.read().await.get(name) {
            debug!(collection = name, "binding created concurrently, reusing");
            return Ok(binding.clone());
        }

        let result = self.bind(name, backend).await;

        let mut pending = self.pending.lock().await;
        if pending.get(name).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
            pending.remove(name);
        }

        result
    }

    async fn bind(&self, name: &str, backend: &dyn StoreBackend) -> DocumentStoreResult<Arc<CollectionBinding>> {
        backend.create_collection(name).await?;

        let binding = self
            .bindings
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(CollectionBinding {
                    name: name.to_string(),
                    bound_at: Utc::now(),
                })
            })
            .clone();
        info!(collection = name, "bound new collection");

        Ok(binding)
    }

    /// Returns `true` if `name` has been bound in this process.
    pub async fn contains(&self, name: &str) -> bool {
        self.bindings.read().await.contains_key(name)
    }

    /// Number of bindings made so far.
    pub async fn len(&self) -> usize {
        self.bindings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
