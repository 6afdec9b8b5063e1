//! Collection handles returned by the model registry.
//!
//! A [`Collection`] pairs a resolved binding with the backend and the gateway's
//! collection options. It is the only place that assigns identifiers and writes
//! timestamps, so every backend sees fully prepared documents.
//!
//! # Example
//!
//! ```ignore
//! use docgate::prelude::*;
//! use serde_json::json;
//!
//! let players = store.collection("players").await?;
//! let alice = players.create(&json!({ "name": "Alice", "score": 10 })).await?;
//! let top = players
//!     .find(Query::builder().sort("score", SortDirection::Desc).limit(1).build())
//!     .await?;
//! ```

use bson::{Bson, DateTime, Document, Uuid};
use serde_json::Value;
use std::sync::Arc;

use crate::{
    backend::StoreBackend,
    document::{
        CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD, document_to_json, json_to_document, new_id,
        parse_id,
    },
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Query},
    registry::CollectionBinding,
    update::{Update, UpdateCounts, UpdateMode},
};

/// Per-gateway behaviour switches applied to every collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionOptions {
    /// Stamp `createdAt`/`updatedAt` on writes.
    pub timestamps: bool,
    /// How update-by-id applies its body.
    pub update_mode: UpdateMode,
    /// When set, creates whose body carries this field upsert on it instead.
    pub upsert_key: Option<String>,
}

/// Outcome of a create request.
#[derive(Debug, Clone, PartialEq)]
pub enum Created {
    /// A new document was inserted.
    Inserted(Value),
    /// The body matched an existing document on the upsert key, which was updated,
    /// or the upsert inserted a document.
    Upserted { document: Value, created: bool },
}

impl Created {
    pub fn document(&self) -> &Value {
        match self {
            Created::Inserted(document) => document,
            Created::Upserted { document, .. } => document,
        }
    }

    pub fn into_document(self) -> Value {
        match self {
            Created::Inserted(document) => document,
            Created::Upserted { document, .. } => document,
        }
    }
}

/// Handle to a bound, schema-less collection.
#[derive(Debug, Clone)]
pub struct Collection {
    binding: Arc<CollectionBinding>,
    backend: Arc<dyn StoreBackend>,
    options: Arc<CollectionOptions>,
}

impl Collection {
    pub(crate) fn new(
        binding: Arc<CollectionBinding>,
        backend: Arc<dyn StoreBackend>,
        options: Arc<CollectionOptions>,
    ) -> Self {
        Self { binding, backend, options }
    }

    pub fn name(&self) -> &str {
        self.binding.name()
    }

    pub fn binding(&self) -> &Arc<CollectionBinding> {
        &self.binding
    }

    /// Stores `body` as a new document, or upserts it when the upsert key applies.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] if `body` is not a JSON object.
    pub async fn create(&self, body: &Value) -> DocumentStoreResult<Created> {
        let mut fields = json_to_document(body)?;
        fields.remove(ID_FIELD);
        if self.options.timestamps {
            fields.remove(CREATED_AT_FIELD);
            fields.remove(UPDATED_AT_FIELD);
        }

        if let Some(key) = self.options.upsert_key.as_deref() {
            if let Some(value) = fields.get(key).cloned() {
                return self.upsert(key, value, fields).await;
            }
        }

        let now = DateTime::now();
        let mut document = Document::new();
        document.insert(ID_FIELD, new_id());
        if self.options.timestamps {
            document.insert(CREATED_AT_FIELD, now);
            document.insert(UPDATED_AT_FIELD, now);
        }
        for (key, value) in fields {
            document.insert(key, value);
        }

        self.backend
            .insert_documents(vec![document.clone()], self.name())
            .await?;

        Ok(Created::Inserted(document_to_json(&document)))
    }

    async fn upsert(&self, key: &str, value: Bson, mut fields: Document) -> DocumentStoreResult<Created> {
        let now = DateTime::now();
        let mut on_insert = Document::new();
        on_insert.insert(ID_FIELD, new_id());
        if self.options.timestamps {
            on_insert.insert(CREATED_AT_FIELD, now);
            fields.insert(UPDATED_AT_FIELD, now);
        }

        let upserted = self
            .backend
            .upsert_document(
                key,
                value,
                Update::merge(fields).with_on_insert(on_insert),
                self.name(),
            )
            .await?;

        Ok(Created::Upserted {
            document: document_to_json(&upserted.document),
            created: upserted.created,
        })
    }

    /// Lists documents matching `query`.
    pub async fn find(&self, query: Query) -> DocumentStoreResult<Vec<Value>> {
        Ok(self
            .backend
            .query_documents(query, self.name())
            .await?
            .iter()
            .map(document_to_json)
            .collect())
    }

    /// Fetches one document by its string id.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidId`] for malformed ids and
    /// [`DocumentStoreError::DocumentNotFound`] when no document has the id.
    pub async fn find_by_id(&self, id: &str) -> DocumentStoreResult<Value> {
        let uuid = parse_id(id)?;

        self.backend
            .get_documents(vec![uuid], self.name())
            .await?
            .first()
            .map(document_to_json)
            .ok_or_else(|| self.not_found(uuid))
    }

    /// Replaces or merges the document with the given id, per the configured update mode.
    pub async fn update_by_id(&self, id: &str, body: &Value) -> DocumentStoreResult<Value> {
        let uuid = parse_id(id)?;
        let mut fields = json_to_document(body)?;
        fields.remove(ID_FIELD);
        if self.options.timestamps {
            fields.remove(CREATED_AT_FIELD);
            fields.insert(UPDATED_AT_FIELD, DateTime::now());
        }

        self.backend
            .update_document(uuid, Update::new(self.options.update_mode, fields), self.name())
            .await?
            .as_ref()
            .map(document_to_json)
            .ok_or_else(|| self.not_found(uuid))
    }

    /// `$set`s `fields` on every document matching `filter` (`None` matches all).
    pub async fn update_many(
        &self,
        filter: Option<Expr>,
        mut fields: Document,
    ) -> DocumentStoreResult<UpdateCounts> {
        fields.remove(ID_FIELD);
        if self.options.timestamps {
            fields.remove(CREATED_AT_FIELD);
            fields.insert(UPDATED_AT_FIELD, DateTime::now());
        }

        self.backend
            .update_documents(filter, Update::merge(fields), self.name())
            .await
    }

    /// Deletes one document by its string id and returns the parsed id.
    pub async fn delete_by_id(&self, id: &str) -> DocumentStoreResult<Uuid> {
        let uuid = parse_id(id)?;

        match self.backend.delete_documents(vec![uuid], self.name()).await? {
            0 => Err(self.not_found(uuid)),
            _ => Ok(uuid),
        }
    }

    /// Deletes every document matching `filter` and returns the count.
    pub async fn delete_many(&self, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        self.backend.delete_matching(filter, self.name()).await
    }

    fn not_found(&self, id: Uuid) -> DocumentStoreError {
        DocumentStoreError::DocumentNotFound(id.to_string(), self.name().to_string())
    }
}
