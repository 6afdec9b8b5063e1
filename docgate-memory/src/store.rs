//! In-memory storage implementation for the gateway.
//!
//! Documents are kept as BSON documents in insertion-ordered maps behind an
//! async-aware read-write lock. Insertion order is the store's native order, so
//! queries without a sort (and ties within a sort) return documents in the order
//! they were created.

use std::{collections::HashMap, sync::Arc};
use async_trait::async_trait;
use indexmap::IndexMap;
use mea::rwlock::RwLock;
use bson::{Bson, Document, Uuid};
use tracing::debug;

use docgate_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    document::{ID_FIELD, document_id},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Query},
    update::{Update, UpdateCounts, Upserted},
};

use crate::evaluator::{DocumentEvaluator, Comparable, compare_documents};

type CollectionMap = IndexMap<Uuid, Document>;
type StoreMap = HashMap<String, CollectionMap>;


/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data. Every operation holds the lock for its whole
/// duration, which makes single-call updates and upserts atomic.
///
/// Queries scan all documents in a collection (no indexing).
///
/// # Example
///
/// ```ignore
/// use docgate_memory::InMemoryStore;
/// use docgate::backend::StoreBackend;
/// use bson::{Uuid, doc};
///
/// let store = InMemoryStore::new();
/// let id = Uuid::new();
/// store.insert_documents(vec![doc! { "_id": id, "name": "Alice" }], "players").await?;
///
/// let docs = store.get_documents(vec![id], "players").await?;
/// assert_eq!(docs.len(), 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// The main storage map: collection_name -> (document_id -> document)
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    fn project(document: &Document, query: &Query) -> Document {
        match &query.projection {
            Some(fields) => document
                .iter()
                .filter(|(key, _)| key.as_str() == ID_FIELD || fields.iter().any(|f| f == *key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            None => document.clone(),
        }
    }
}


#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_documents(&self, documents: Vec<Document>, collection: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let collection_map = store
            .entry(collection.to_string())
            .or_default();

        let mut prepared = Vec::with_capacity(documents.len());
        for document in documents {
            let id = document_id(&document)
                .ok_or_else(|| DocumentStoreError::InvalidDocument("document has no _id".into()))?;

            if collection_map.contains_key(&id) {
                return Err(DocumentStoreError::Backend(format!(
                    "duplicate key {id} in collection {collection}"
                )));
            }

            prepared.push((id, document));
        }

        collection_map.extend(prepared);

        Ok(())
    }

    async fn get_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        let store = self.store.read().await;
        let collection_map = match store.get(collection) {
            Some(col) => col,
            None => return Ok(vec![]),
        };

        Ok(
            ids
                .iter()
                .filter_map(|id| collection_map.get(id).cloned())
                .collect()
        )
    }

    async fn query_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        let store = self.store.read().await;
        let collection_map = match store.get(collection) {
            Some(col) => col,
            None => return Ok(vec![]),
        };

        let mut matched = collection_map
            .values()
            .filter(|doc| DocumentEvaluator::matches(doc, query.filter.as_ref()))
            .collect::<Vec<_>>();

        // Stable sort: ties keep insertion order
        if !query.sort.is_empty() {
            matched.sort_by(|a, b| compare_documents(a, b, &query.sort));
        }

        Ok(
            matched
                .into_iter()
                .skip(query.offset.unwrap_or(0))
                .take(query.limit.unwrap_or(usize::MAX))
                .map(|doc| Self::project(doc, &query))
                .collect()
        )
    }

    async fn update_document(&self, id: Uuid, update: Update, collection: &str) -> DocumentStoreResult<Option<Document>> {
        let mut store = self.store.write().await;
        let Some(document) = store
            .get_mut(collection)
            .and_then(|col| col.get_mut(&id))
        else {
            return Ok(None);
        };

        *document = update.apply_to(document);

        Ok(Some(document.clone()))
    }

    async fn update_documents(&self, filter: Option<Expr>, update: Update, collection: &str) -> DocumentStoreResult<UpdateCounts> {
        let mut store = self.store.write().await;
        let Some(collection_map) = store.get_mut(collection) else {
            return Ok(UpdateCounts::default());
        };

        let mut counts = UpdateCounts::default();
        for document in collection_map.values_mut() {
            if !DocumentEvaluator::matches(document, filter.as_ref()) {
                continue;
            }

            counts.matched_count += 1;
            let next = update.apply_to(document);
            if !same_document(&next, document) {
                *document = next;
                counts.modified_count += 1;
            }
        }

        debug!(collection, matched = counts.matched_count, modified = counts.modified_count, "bulk update applied");

        Ok(counts)
    }

    async fn upsert_document(&self, key: &str, value: Bson, update: Update, collection: &str) -> DocumentStoreResult<Upserted> {
        let mut store = self.store.write().await;
        let collection_map = store
            .entry(collection.to_string())
            .or_default();

        let target = Comparable::from(&value);
        let existing = collection_map
            .values_mut()
            .find(|doc| doc.get(key).map(Comparable::from).is_some_and(|v| v == target));

        if let Some(document) = existing {
            *document = update.apply_to(document);
            return Ok(Upserted { document: document.clone(), created: false });
        }

        let document = update.insert_document();
        let id = document_id(&document)
            .ok_or_else(|| DocumentStoreError::InvalidDocument("upsert insert has no _id".into()))?;
        collection_map.insert(id, document.clone());

        Ok(Upserted { document, created: true })
    }

    async fn delete_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<u64> {
        let mut store = self.store.write().await;
        let Some(collection_map) = store.get_mut(collection) else {
            return Ok(0);
        };

        Ok(
            ids
                .iter()
                .filter(|id| collection_map.shift_remove(*id).is_some())
                .count() as u64
        )
    }

    async fn delete_matching(&self, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<u64> {
        let mut store = self.store.write().await;
        let Some(collection_map) = store.get_mut(collection) else {
            return Ok(0);
        };

        let before = collection_map.len();
        collection_map.retain(|_, doc| !DocumentEvaluator::matches(doc, filter.as_ref()));

        Ok((before - collection_map.len()) as u64)
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.store
            .write()
            .await
            .entry(name.to_string())
            .or_default();

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        Ok(
            self.store
                .read()
                .await
                .keys()
                .cloned()
                .collect()
        )
    }
}

/// Field-by-field comparison that ignores key order.
fn same_document(a: &Document, b: &Document) -> bool {
    a.len() == b.len()
        && a.iter().all(|(key, value)| b.get(key).is_some_and(|other| other == value))
}


/// Builder for constructing [`InMemoryStore`] instances.
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds and returns a new [`InMemoryStore`] instance.
    ///
    /// This always succeeds and returns a freshly initialized store.
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docgate_core::query::{Filter, SortDirection};

    async fn seeded() -> (InMemoryStore, Vec<Uuid>) {
        let store = InMemoryStore::new();
        let ids = (0..4).map(|_| Uuid::new()).collect::<Vec<_>>();

        store
            .insert_documents(
                vec![
                    doc! { "_id": ids[0], "name": "Alice", "score": 10 },
                    doc! { "_id": ids[1], "name": "Bob", "score": 20 },
                    doc! { "_id": ids[2], "name": "Carol", "score": 10 },
                    doc! { "_id": ids[3], "name": "Dave" },
                ],
                "players",
            )
            .await
            .unwrap();

        (store, ids)
    }

    fn names(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|doc| doc.get_str("name").unwrap()).collect()
    }

    #[tokio::test]
    async fn queries_keep_insertion_order_without_sort() {
        let (store, _) = seeded().await;
        let docs = store.query_documents(Query::new(), "players").await.unwrap();

        assert_eq!(names(&docs), vec!["Alice", "Bob", "Carol", "Dave"]);
    }

    #[tokio::test]
    async fn sort_ties_fall_back_to_insertion_order() {
        let (store, _) = seeded().await;
        let query = Query::builder().sort("score", SortDirection::Desc).build();
        let docs = store.query_documents(query, "players").await.unwrap();

        assert_eq!(names(&docs), vec!["Bob", "Alice", "Carol", "Dave"]);
    }

    #[tokio::test]
    async fn pagination_and_projection_apply_after_sorting() {
        let (store, _) = seeded().await;
        let query = Query::builder()
            .sort("name", SortDirection::Asc)
            .offset(1)
            .limit(2)
            .select(["name"])
            .build();
        let docs = store.query_documents(query, "players").await.unwrap();

        assert_eq!(names(&docs), vec!["Bob", "Carol"]);
        assert!(docs.iter().all(|doc| doc.contains_key("_id") && !doc.contains_key("score")));
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let (store, ids) = seeded().await;
        let result = store
            .insert_documents(vec![doc! { "_id": ids[0], "name": "Again" }], "players")
            .await;

        assert!(matches!(result, Err(DocumentStoreError::Backend(_))));
    }

    #[tokio::test]
    async fn bulk_update_counts_only_real_changes() {
        let (store, _) = seeded().await;
        let counts = store
            .update_documents(Some(Filter::eq("score", 10)), Update::merge(doc! { "name": "Alice" }), "players")
            .await
            .unwrap();

        assert_eq!(counts, UpdateCounts { matched_count: 2, modified_count: 1 });

        let none = store
            .update_documents(Some(Filter::gt("score", 100)), Update::merge(doc! { "x": 1 }), "players")
            .await
            .unwrap();
        assert_eq!(none, UpdateCounts::default());
    }

    #[tokio::test]
    async fn update_document_reports_missing_ids() {
        let (store, ids) = seeded().await;

        let updated = store
            .update_document(ids[1], Update::replace(doc! { "name": "Robert" }), "players")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated, doc! { "_id": ids[1], "name": "Robert" });

        let missing = store
            .update_document(Uuid::new(), Update::merge(doc! { "x": 1 }), "players")
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn upsert_inserts_then_merges() {
        let store = InMemoryStore::new();
        let id = Uuid::new();
        let update = |fields: Document| Update::merge(fields).with_on_insert(doc! { "_id": id });

        let first = store
            .upsert_document("email", "a@b.c".into(), update(doc! { "email": "a@b.c", "level": 1 }), "owners")
            .await
            .unwrap();
        assert!(first.created);

        let second = store
            .upsert_document("email", "a@b.c".into(), update(doc! { "email": "a@b.c", "level": 2 }), "owners")
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.document, doc! { "_id": id, "email": "a@b.c", "level": 2 });
    }

    #[tokio::test]
    async fn deletes_count_removed_documents() {
        let (store, ids) = seeded().await;

        assert_eq!(store.delete_documents(vec![ids[0]], "players").await.unwrap(), 1);
        assert_eq!(store.delete_documents(vec![ids[0]], "players").await.unwrap(), 0);
        assert_eq!(store.delete_matching(Some(Filter::exists("score")), "players").await.unwrap(), 2);
        assert_eq!(store.delete_matching(None, "players").await.unwrap(), 1);
        assert_eq!(store.delete_matching(None, "nobody").await.unwrap(), 0);
    }
}
