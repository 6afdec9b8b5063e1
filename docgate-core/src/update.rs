//! Update descriptions passed from collection handles to backends.

use bson::Document;
use serde::{Deserialize, Serialize};

use crate::document::{CREATED_AT_FIELD, ID_FIELD};

/// How an update body is applied to a stored document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// The body replaces the stored document. `_id` and `createdAt` are kept.
    Replace,
    /// Each body field is `$set` on the stored document; other fields are kept.
    #[default]
    Merge,
}

/// A single update operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub mode: UpdateMode,
    /// Fields written by the update.
    pub fields: Document,
    /// Fields written only when an upsert inserts a new document.
    pub on_insert: Document,
}

impl Update {
    pub fn new(mode: UpdateMode, fields: Document) -> Self {
        Self { mode, fields, on_insert: Document::new() }
    }

    pub fn merge(fields: Document) -> Self {
        Self::new(UpdateMode::Merge, fields)
    }

    pub fn replace(fields: Document) -> Self {
        Self::new(UpdateMode::Replace, fields)
    }

    pub fn with_on_insert(mut self, on_insert: Document) -> Self {
        self.on_insert = on_insert;
        self
    }

    /// Applies the update to `current` and returns the resulting document.
    ///
    /// Backends that evaluate updates in-process use this; the result keeps the
    /// identifier of `current`.
    pub fn apply_to(&self, current: &Document) -> Document {
        let mut next = match self.mode {
            UpdateMode::Merge => current.clone(),
            UpdateMode::Replace => {
                let mut kept = Document::new();
                for key in [ID_FIELD, CREATED_AT_FIELD] {
                    if let Some(value) = current.get(key) {
                        kept.insert(key, value.clone());
                    }
                }
                kept
            }
        };

        for (key, value) in self.fields.iter() {
            if key != ID_FIELD {
                next.insert(key.clone(), value.clone());
            }
        }

        next
    }

    /// Builds the document inserted by an upsert that matched nothing.
    pub fn insert_document(&self) -> Document {
        let mut document = self.on_insert.clone();
        for (key, value) in self.fields.iter() {
            if key != ID_FIELD {
                document.insert(key.clone(), value.clone());
            }
        }
        document
    }
}

/// Counts reported by a bulk update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCounts {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// Result of an upsert: the stored document and whether it was newly created.
#[derive(Debug, Clone, PartialEq)]
pub struct Upserted {
    pub document: Document,
    pub created: bool,
}
