//! Main docgate crate providing a unified interface to the collection gateway.
//!
//! This crate is the primary entry point for users of docgate. It re-exports the core
//! types and functionality from the sub-crates and provides convenient access to the
//! storage backends.
//!
//! # Features
//!
//! - **Schema-less collections** - Any valid name becomes a collection on first use
//! - **Multiple backends** - In-memory and MongoDB storage behind one trait
//! - **Safe query translation** - Allow-listed filters, sorts, projections and pagination
//! - **Bulk operations** - Filtered updates and deletes with affected counts
//!
//! # Quick Start
//!
//! ```ignore
//! use docgate::{prelude::*, memory::InMemoryStore};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DocumentStore::new(
//!         InMemoryStore::builder().build().await?,
//!         CollectionOptions::default(),
//!     );
//!
//!     // The first request for a name binds the collection
//!     let players = store.collection("players").await?;
//!     players.create(&json!({ "name": "Alice", "score": 10 })).await?;
//!     players.create(&json!({ "name": "Bob", "score": 20 })).await?;
//!
//!     // Request parameters go through the translator before reaching the store
//!     let translator = QueryTranslator::new(false);
//!     let query = translator.list_query(&ListParams {
//!         filter: Some(r#"{"score":{"$gte":15}}"#.to_string()),
//!         ..Default::default()
//!     })?;
//!
//!     println!("{:?}", players.find(query).await?);
//!
//!     store.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - `mongodb` - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use docgate_core::{backend, collection, document, error, query, registry, store, translate, update};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docgate_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docgate_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
