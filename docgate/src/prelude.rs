//! Convenient re-exports of commonly used types from docgate.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docgate::prelude::*;
//! ```
//!
//! This provides access to:
//! - The document store, registry and collection handles
//! - Store backends and builders
//! - Query construction, filtering and request translation
//! - Update descriptions and error types

pub use docgate_core::{
    collection::{Collection, CollectionOptions, Created},
    store::DocumentStore,
    registry::{CollectionBinding, ModelRegistry},
    backend::{StoreBackend, StoreBackendBuilder},
    query::{Query, QueryVisitor, Expr, Sort, SortDirection, FieldOp, QueryBuilder, Filter},
    translate::{BulkUpdate, ListParams, QueryTranslator},
    update::{Update, UpdateCounts, UpdateMode, Upserted},
    error::{DocumentStoreError, DocumentStoreResult},
};
