//! Core of the docgate project: a dynamic, schema-less collection gateway over document stores.
//!
//! This crate provides:
//!
//! - **Document conversion** ([`document`]) - JSON/BSON conversion, ids and field name rules
//! - **Store backend abstraction** ([`backend`]) - The trait every storage backend implements
//! - **Query and filtering API** ([`query`]) - Filter expressions, compound sorts, projections
//! - **Query translation** ([`translate`]) - Allow-listed parsing of request parameters and bodies
//! - **Updates** ([`update`]) - Replace/merge updates, bulk counts and upsert results
//! - **Model registry** ([`registry`]) - Lazy, insert-once binding of collection names
//! - **Collections** ([`collection`]) - Handles that create, read, update and delete documents
//! - **Document store** ([`store`]) - Entry point tying backend, registry and options together
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use docgate::{prelude::*, memory::InMemoryStore};
//! use serde_json::json;
//!
//! let store = DocumentStore::new(InMemoryStore::new(), CollectionOptions::default());
//! let players = store.collection("players").await?;
//! players.create(&json!({ "name": "Alice", "score": 10 })).await?;
//! ```

pub mod backend;
pub mod collection;
pub mod document;
pub mod error;
pub mod query;
pub mod registry;
pub mod store;
pub mod translate;
pub mod update;
