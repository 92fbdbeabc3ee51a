//! Typed results returned by collection/table operations.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::datatypes::SomeId;

/// Result of `insert_one` on a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    /// The id of the inserted document (server- or client-generated).
    pub inserted_id: SomeId,
}

/// Result of `insert_many` on a collection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InsertManyResult {
    /// Ids of the inserted documents, in input order.
    pub inserted_ids: Vec<SomeId>,
    /// Number of inserted documents.
    pub inserted_count: usize,
}

/// Result of update operations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateResult {
    /// Documents matched by the filter.
    pub matched_count: u64,
    /// Documents actually modified.
    pub modified_count: u64,
    /// Id of the upserted document, when an upsert happened.
    pub upserted_id: Option<SomeId>,
}

impl UpdateResult {
    /// 1 when an upsert happened, else 0.
    pub fn upserted_count(&self) -> u64 {
        u64::from(self.upserted_id.is_some())
    }
}

/// Result of delete operations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeleteResult {
    /// Documents deleted.
    pub deleted_count: u64,
}

/// Aggregate result of `bulk_write`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BulkWriteResult {
    pub inserted_count: u64,
    pub matched_count: u64,
    pub modified_count: u64,
    pub deleted_count: u64,
    pub upserted_count: u64,
}

impl BulkWriteResult {
    pub(crate) fn absorb_insert(&mut self, inserted: usize) {
        self.inserted_count += inserted as u64;
    }

    pub(crate) fn absorb_update(&mut self, update: &UpdateResult) {
        self.matched_count += update.matched_count;
        self.modified_count += update.modified_count;
        self.upserted_count += update.upserted_count();
    }

    pub(crate) fn absorb_delete(&mut self, delete: &DeleteResult) {
        self.deleted_count += delete.deleted_count;
    }
}

/// Result of `insert_one` on a table: the row's full primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct TableInsertOneResult {
    /// Primary key column name → inserted value.
    pub inserted_id: Map<String, Value>,
}

/// Result of `insert_many` on a table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableInsertManyResult {
    /// One primary key map per inserted row, in input order.
    pub inserted_ids: Vec<Map<String, Value>>,
    /// Number of inserted rows.
    pub inserted_count: usize,
}

/// One element of a find-and-rerank result set.
#[derive(Debug, Clone, PartialEq)]
pub struct RerankedResult<T> {
    /// The retrieved document.
    pub document: T,
    /// Similarity/rerank scores keyed by scorer name.
    pub scores: HashMap<String, f64>,
}

/// A collection as reported by `list_collections`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CollectionDescriptor {
    /// Collection name.
    pub name: String,
    /// Creation-time definition (default id, vector config, indexing).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

/// A table as reported by `list_tables`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TableDescriptor {
    /// Table name.
    pub name: String,
    /// The table definition (columns, primary key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<Value>,
}

/// An index as reported by `list_indexes`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IndexDescriptor {
    /// Index name.
    pub name: String,
    /// The index definition (column, options).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<Value>,
}
