//! In-memory composite secondary indexes, maintained incrementally as the
//! engine inserts, removes, and updates records.
//!
//! Modeled on the teacher crate's `storage::index::RunIndex`: a
//! `HashMap`-backed bucket structure that removes a bucket entirely once it
//! empties, rather than leaving stale empty entries around.

use litestore_core::error::{Error, Result};
use litestore_core::value::{RecordId, Value};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Whether an index rejects a second record mapping to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// A second item mapping to the same composite key is a conflict.
    Unique,
    /// Duplicate composite keys are allowed.
    Normal,
}

/// One item stored in an index bucket.
#[derive(Debug, Clone, PartialEq)]
struct IndexItem {
    id: RecordId,
}

/// A single composite-key index over a fixed, ordered list of fields.
pub struct Index {
    kind: IndexKind,
    fields: Vec<String>,
    buckets: FxHashMap<String, Vec<IndexItem>>,
}

impl Index {
    fn new(kind: IndexKind, fields: Vec<String>) -> Self {
        Index { kind, fields, buckets: FxHashMap::default() }
    }

    /// Canonical composite key: the JSON array of the record's values for
    /// this index's fields, or `None` if any field is absent.
    fn key_for(&self, record: &Value) -> Option<String> {
        let mut values = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            values.push(record.get_path(field)?.clone());
        }
        Some(Value::Array(values).canonical_json())
    }

    fn insert(&mut self, record: &Value) -> Result<()> {
        let Some(key) = self.key_for(record) else { return Ok(()) };
        let Some(id) = record.record_id() else { return Ok(()) };
        let bucket = self.buckets.entry(key).or_default();
        if self.kind == IndexKind::Unique && !bucket.is_empty() {
            return Err(Error::conflict(format!(
                "unique index violation on fields {:?}",
                self.fields
            )));
        }
        bucket.push(IndexItem { id });
        Ok(())
    }

    fn remove(&mut self, record: &Value) {
        let Some(key) = self.key_for(record) else { return };
        let Some(id) = record.record_id() else { return };
        if let Some(bucket) = self.buckets.get_mut(&key) {
            bucket.retain(|item| item.id != id);
            if bucket.is_empty() {
                self.buckets.remove(&key);
            }
        }
    }

    fn query(&self, values: &[Value]) -> Vec<RecordId> {
        let key = Value::Array(values.to_vec()).canonical_json();
        self.buckets
            .get(&key)
            .map(|bucket| bucket.iter().map(|item| item.id.clone()).collect())
            .unwrap_or_default()
    }
}

/// Index name convention: `<field1>_<field2>_..._<kind>`.
pub fn index_name(fields: &[String], kind: IndexKind) -> String {
    let suffix = match kind {
        IndexKind::Unique => "unique",
        IndexKind::Normal => "normal",
    };
    format!("{}_{suffix}", fields.join("_"))
}

/// Owns every secondary index for every table.
#[derive(Default)]
pub struct IndexManager {
    tables: FxHashMap<String, FxHashMap<String, Index>>,
}

impl IndexManager {
    /// Construct an empty manager.
    pub fn new() -> Self {
        IndexManager::default()
    }

    /// Declare an index on `table` over `fields`, empty until records are added.
    pub fn declare_index(&mut self, table: &str, fields: Vec<String>, kind: IndexKind) -> String {
        let name = index_name(&fields, kind);
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(name.clone(), Index::new(kind, fields));
        name
    }

    /// Add `record` to every index declared on `table`. A record missing an
    /// indexed field is skipped for that index, not an error.
    pub fn add_to_indexes(&mut self, table: &str, record: &Value) -> Result<()> {
        if let Some(indexes) = self.tables.get_mut(table) {
            for index in indexes.values_mut() {
                index.insert(record)?;
            }
        }
        Ok(())
    }

    /// Remove `record` from every index declared on `table`.
    pub fn remove_from_indexes(&mut self, table: &str, record: &Value) {
        if let Some(indexes) = self.tables.get_mut(table) {
            for index in indexes.values_mut() {
                index.remove(record);
            }
        }
    }

    /// Remove `old`, then insert `new`, across every index on `table`.
    pub fn update_indexes(&mut self, table: &str, old: &Value, new: &Value) -> Result<()> {
        self.remove_from_indexes(table, old);
        self.add_to_indexes(table, new)
    }

    /// Record ids exactly matching `values` against the named index.
    pub fn query_index(&self, table: &str, index_name: &str, values: &[Value]) -> Vec<RecordId> {
        self.tables
            .get(table)
            .and_then(|indexes| indexes.get(index_name))
            .map(|index| index.query(values))
            .unwrap_or_default()
    }

    /// Drop every index declared on `table`.
    pub fn clear_table_indexes(&mut self, table: &str) {
        self.tables.remove(table);
    }

    /// Rebuild every index on `table` from scratch against `records`.
    pub fn rebuild(&mut self, table: &str, records: &[Value]) -> Result<()> {
        if let Some(indexes) = self.tables.get_mut(table) {
            for index in indexes.values_mut() {
                index.buckets.clear();
            }
        }
        for record in records {
            if let Some(indexes) = self.tables.get_mut(table) {
                for index in indexes.values_mut() {
                    index.insert(record)?;
                }
            }
        }
        Ok(())
    }

    /// Index names declared on `table`.
    pub fn index_names(&self, table: &str) -> Vec<String> {
        self.tables
            .get(table)
            .map(|indexes| indexes.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn record(id: i64, email: &str) -> Value {
        Value::Object(BTreeMap::from([
            ("id".to_string(), Value::Int(id)),
            ("email".to_string(), Value::String(email.to_string())),
        ]))
    }

    #[test]
    fn unique_index_rejects_duplicate_key() {
        let mut mgr = IndexManager::new();
        mgr.declare_index("users", vec!["email".to_string()], IndexKind::Unique);
        mgr.add_to_indexes("users", &record(1, "a@x.com")).unwrap();
        let err = mgr.add_to_indexes("users", &record(2, "a@x.com")).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn normal_index_allows_duplicates_and_queries_by_value() {
        let mut mgr = IndexManager::new();
        let name = mgr.declare_index("users", vec!["email".to_string()], IndexKind::Normal);
        mgr.add_to_indexes("users", &record(1, "a@x.com")).unwrap();
        mgr.add_to_indexes("users", &record(2, "a@x.com")).unwrap();
        let ids = mgr.query_index("users", &name, &[Value::String("a@x.com".into())]);
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn record_missing_indexed_field_is_skipped_not_errored() {
        let mut mgr = IndexManager::new();
        mgr.declare_index("users", vec!["email".to_string()], IndexKind::Unique);
        let bare = Value::Object(BTreeMap::from([("id".to_string(), Value::Int(1))]));
        mgr.add_to_indexes("users", &bare).unwrap();
        mgr.add_to_indexes("users", &bare).unwrap();
    }

    #[test]
    fn remove_then_reinsert_same_key_succeeds_on_unique_index() {
        let mut mgr = IndexManager::new();
        mgr.declare_index("users", vec!["email".to_string()], IndexKind::Unique);
        let r = record(1, "a@x.com");
        mgr.add_to_indexes("users", &r).unwrap();
        mgr.remove_from_indexes("users", &r);
        mgr.add_to_indexes("users", &record(2, "a@x.com")).unwrap();
    }

    #[test]
    fn clear_table_indexes_drops_all_buckets() {
        let mut mgr = IndexManager::new();
        let name = mgr.declare_index("users", vec!["email".to_string()], IndexKind::Normal);
        mgr.add_to_indexes("users", &record(1, "a@x.com")).unwrap();
        mgr.clear_table_indexes("users");
        assert!(mgr.query_index("users", &name, &[Value::String("a@x.com".into())]).is_empty());
    }
}
