//! Storage backend abstraction for the gateway.
//!
//! This module defines the traits that abstract over different storage implementations,
//! allowing the gateway to run against an in-process store or a document database.
//!
//! # Overview
//!
//! The [`StoreBackend`] trait provides a unified async interface for every operation the
//! gateway performs: inserting, fetching, querying, updating (single, bulk and upsert) and
//! deleting documents, plus collection management. Implementations must be thread-safe
//! and support concurrent access; each call is expected to be atomic per document.
//!
//! Documents cross this boundary as BSON documents that carry their own `_id`.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances

use async_trait::async_trait;
use bson::{Bson, Document, Uuid};
use std::fmt::Debug;

use crate::{
    error::DocumentStoreResult,
    query::{Expr, Query},
    update::{Update, UpdateCounts, Upserted},
};

/// Abstract interface for document storage backends.
///
/// The trait is object safe; the gateway holds backends as `Arc<dyn StoreBackend>`
/// so the concrete store can be chosen at runtime from configuration.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts new documents. Each document already carries its `_id`.
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<()>;

    /// Fetches documents by identifier. Missing ids are skipped.
    async fn get_documents(
        &self,
        ids: Vec<Uuid>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Runs a filtered, sorted, projected and paginated query.
    async fn query_documents(
        &self,
        query: Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Applies `update` to the document with the given id.
    ///
    /// Returns the updated document, or `None` if no document has that id.
    async fn update_document(
        &self,
        id: Uuid,
        update: Update,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Applies `update` to every document matching `filter` (`None` matches all).
    async fn update_documents(
        &self,
        filter: Option<Expr>,
        update: Update,
        collection: &str,
    ) -> DocumentStoreResult<UpdateCounts>;

    /// Atomically updates the first document whose `key` equals `value`, inserting
    /// `update.insert_document()` when none matches.
    async fn upsert_document(
        &self,
        key: &str,
        value: Bson,
        update: Update,
        collection: &str,
    ) -> DocumentStoreResult<Upserted>;

    /// Deletes documents by identifier and returns how many were removed.
    async fn delete_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<u64>;

    /// Deletes every document matching `filter` (`None` matches all).
    async fn delete_matching(
        &self,
        filter: Option<Expr>,
        collection: &str,
    ) -> DocumentStoreResult<u64>;

    /// Creates the collection if it does not exist yet. Must be idempotent.
    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()>;

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;

    /// Releases backend resources. The default does nothing.
    async fn shutdown(&self) -> DocumentStoreResult<()> {
        Ok(())
    }
}

/// Factory trait for constructing backends, possibly asynchronously.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
