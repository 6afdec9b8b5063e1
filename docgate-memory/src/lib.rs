//! In-memory document storage backend for docgate.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is the default backend
//! for development, tests and single-process deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Schema-less storage** - Stores documents as BSON, keyed by their UUID
//! - **Stable ordering** - Insertion order is kept, so sorts fall back to creation order
//! - **Full query support** - Filtering, compound sorts, pagination and projections
//!
//! # Quick Start
//!
//! ```ignore
//! use docgate::{prelude::*, memory::InMemoryStore};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryStore::builder().build().await?;
//!     let store = DocumentStore::new(backend, CollectionOptions::default());
//!
//!     let players = store.collection("players").await?;
//!     players.create(&json!({ "name": "Alice", "score": 10 })).await?;
//!
//!     Ok(())
//! }
//! ```

mod evaluator;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
