use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Document, Bson, Uuid, doc};
use mongodb::{
    Client, Collection as MongoCollection,
    error::{Error as MongoError, ErrorKind},
    options::{ClientOptions, FindOptions, ReturnDocument, UpdateModifications},
};
use tracing::{debug, info};

use docgate_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    document::{CREATED_AT_FIELD, ID_FIELD, document_id},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Query},
    update::{Update, UpdateCounts, UpdateMode, Upserted},
};

use crate::{sanitizer::ValueSanitizer, query::MongoQueryTranslator};

/// Server error code for `create` on an existing namespace.
const NAMESPACE_EXISTS: i32 = 48;

fn backend_error(error: MongoError) -> DocumentStoreError {
    DocumentStoreError::Backend(error.to_string())
}

fn is_namespace_exists(error: &MongoError) -> bool {
    matches!(*error.kind, ErrorKind::Command(ref command) if command.code == NAMESPACE_EXISTS)
}

/// Builds the find options for `query`, or `None` when the window is empty.
///
/// The server reads a limit of 0 as "no limit" and a negative one as a single
/// batch, so an empty window never reaches it and large values saturate.
fn find_options(query: &Query) -> Option<FindOptions> {
    let mut options = FindOptions::default();

    if let Some(limit) = query.limit {
        if limit == 0 {
            return None;
        }
        options.limit = Some(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    if let Some(skip) = query.offset {
        options.skip = Some(u64::try_from(skip).unwrap_or(u64::MAX));
    }
    if !query.sort.is_empty() {
        options.sort = Some(MongoQueryTranslator::sort_document(&query.sort));
    }
    if let Some(fields) = &query.projection {
        options.projection = Some(MongoQueryTranslator::projection_document(fields));
    }

    Some(options)
}

/// MongoDB storage backend.
///
/// Each gateway collection maps to a MongoDB collection of the same name in the
/// configured database. Document keys are escaped through the sanitizer before they
/// are written and restored when read back.
#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(&ValueSanitizer::sanitize_key(collection_name))
    }

    /// Converts an update into MongoDB update modifications.
    ///
    /// Merges become `$set`. Replacements run as a pipeline that keeps `_id` and
    /// `createdAt` and wraps the new body in `$literal` so string values are never
    /// read as field paths.
    fn modifications(update: &Update) -> UpdateModifications {
        let fields = ValueSanitizer::sanitize_document(&update.fields);

        match update.mode {
            UpdateMode::Merge => UpdateModifications::Document(doc! { "$set": fields }),
            UpdateMode::Replace => UpdateModifications::Pipeline(vec![doc! {
                "$replaceWith": {
                    "$mergeObjects": [
                        { ID_FIELD: format!("${ID_FIELD}"), CREATED_AT_FIELD: format!("${CREATED_AT_FIELD}") },
                        { "$literal": fields },
                    ],
                },
            }]),
        }
    }

    async fn collect(&self, cursor: mongodb::Cursor<Document>) -> DocumentStoreResult<Vec<Document>> {
        Ok(
            cursor
                .try_collect::<Vec<Document>>()
                .await
                .map_err(backend_error)?
                .iter()
                .map(ValueSanitizer::restore_document)
                .collect()
        )
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_documents(&self, documents: Vec<Document>, collection: &str) -> DocumentStoreResult<()> {
        if documents.is_empty() {
            return Ok(());
        }

        self.get_collection(collection)
            .insert_many(
                documents
                    .iter()
                    .map(ValueSanitizer::sanitize_document)
                    .collect::<Vec<Document>>(),
            )
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn get_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        let cursor = self.get_collection(collection)
            .find(doc! { ID_FIELD: { "$in": ids } })
            .await
            .map_err(backend_error)?;

        self.collect(cursor).await
    }

    async fn query_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        let Some(options) = find_options(&query) else {
            return Ok(Vec::new());
        };

        let filter = MongoQueryTranslator::filter_document(query.filter.as_ref())?;
        debug!(collection, ?filter, "running find");

        let cursor = self.get_collection(collection)
            .find(filter)
            .with_options(options)
            .await
            .map_err(backend_error)?;

        self.collect(cursor).await
    }

    async fn update_document(&self, id: Uuid, update: Update, collection: &str) -> DocumentStoreResult<Option<Document>> {
        Ok(
            self.get_collection(collection)
                .find_one_and_update(doc! { ID_FIELD: id }, Self::modifications(&update))
                .return_document(ReturnDocument::After)
                .await
                .map_err(backend_error)?
                .as_ref()
                .map(ValueSanitizer::restore_document)
        )
    }

    async fn update_documents(&self, filter: Option<Expr>, update: Update, collection: &str) -> DocumentStoreResult<UpdateCounts> {
        let result = self.get_collection(collection)
            .update_many(
                MongoQueryTranslator::filter_document(filter.as_ref())?,
                Self::modifications(&update),
            )
            .await
            .map_err(backend_error)?;

        Ok(UpdateCounts {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
        })
    }

    async fn upsert_document(&self, key: &str, value: Bson, update: Update, collection: &str) -> DocumentStoreResult<Upserted> {
        let inserted_id = document_id(&update.on_insert);
        let key = ValueSanitizer::sanitize_key(key);

        let mut on_insert = ValueSanitizer::sanitize_document(&update.on_insert);
        let fields = ValueSanitizer::sanitize_document(&update.fields);
        for field in fields.keys() {
            on_insert.remove(field);
        }

        let document = self.get_collection(collection)
            .find_one_and_update(
                doc! { key.as_str(): value },
                doc! { "$set": fields, "$setOnInsert": on_insert },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(backend_error)?
            .ok_or_else(|| DocumentStoreError::Backend("upsert returned no document".into()))?;

        let created = inserted_id.is_some() && document_id(&document) == inserted_id;

        Ok(Upserted {
            document: ValueSanitizer::restore_document(&document),
            created,
        })
    }

    async fn delete_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<u64> {
        Ok(
            self.get_collection(collection)
                .delete_many(doc! { ID_FIELD: { "$in": ids } })
                .await
                .map_err(backend_error)?
                .deleted_count
        )
    }

    async fn delete_matching(&self, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<u64> {
        Ok(
            self.get_collection(collection)
                .delete_many(MongoQueryTranslator::filter_document(filter.as_ref())?)
                .await
                .map_err(backend_error)?
                .deleted_count
        )
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        match self.client
            .database(&self.database)
            .create_collection(&ValueSanitizer::sanitize_key(name))
            .await
        {
            Ok(()) => Ok(()),
            Err(error) if is_namespace_exists(&error) => {
                debug!(collection = name, "collection already exists");
                Ok(())
            }
            Err(error) => Err(backend_error(error)),
        }
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        Ok(
            self.client
                .database(&self.database)
                .list_collection_names()
                .await
                .map_err(backend_error)?
                .into_iter()
                .filter(|name| !name.starts_with("system."))
                .map(|name| ValueSanitizer::restore_key(&name))
                .collect()
        )
    }

    async fn shutdown(&self) -> DocumentStoreResult<()> {
        info!(database = %self.database, "closing MongoDB client");
        self.client.clone().shutdown().await;

        Ok(())
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let mut options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;
        options.app_name.get_or_insert_with(|| "docgate".to_string());

        Ok(MongoDbStore::new(
            Client::with_options(options)
                .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}
