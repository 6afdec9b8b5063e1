//! Error types and result types for gateway and document store operations.
//!
//! Every layer of the gateway (registry, query translation, collection handles and
//! backends) reports failures through [`DocumentStoreError`]. The HTTP surface maps
//! the variants onto status codes: validation variants become client errors, while
//! backend variants become server errors.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// The requested document was not found in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} not found in collection {1}")]
    DocumentNotFound(String, String),
    /// The document body is not a JSON object or carries forbidden content.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// A filter, sort, projection or pagination parameter could not be translated.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// The collection name falls outside the accepted character set.
    #[error("Invalid collection name: {0}")]
    InvalidCollectionName(String),
    /// The document identifier is not a valid UUID.
    #[error("Invalid document id: {0}")]
    InvalidId(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
    /// An unknown error occurred.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl DocumentStoreError {
    /// Returns `true` for errors caused by malformed request input.
    ///
    /// A malformed path id is not counted: it fails the same way a store lookup
    /// failure does.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DocumentStoreError::InvalidDocument(_)
                | DocumentStoreError::InvalidQuery(_)
                | DocumentStoreError::InvalidCollectionName(_)
        )
    }

    pub(crate) fn invalid_query(message: impl Into<String>) -> Self {
        DocumentStoreError::InvalidQuery(message.into())
    }
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
