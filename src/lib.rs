//! # litestore
//!
//! An embedded, file-backed, document-oriented table store.
//!
//! litestore keeps each table as either a single file or a set of bounded
//! chunks under one root directory, with atomic writes, a SHA-256 integrity
//! envelope, and optional AES-CTR+HMAC encryption at rest. Reads go through a
//! Mongo-style filter/sort/paginate pipeline backed by an in-memory secondary
//! index and a write-back cache; writes can be grouped into single-writer
//! transactions that snapshot and replay.
//!
//! # Quick Start
//!
//! ```no_run
//! use litestore::{StorageEngine, EngineConfig, CreateTableOptions, ReadOptions, WriteMode};
//! use litestore::Value;
//! use std::collections::BTreeMap;
//! use std::path::PathBuf;
//!
//! fn main() -> litestore::Result<()> {
//!     let engine = StorageEngine::open(PathBuf::from("./my-data"), EngineConfig::default())?;
//!
//!     engine.create_table("users", CreateTableOptions::default())?;
//!     engine.write(
//!         "users",
//!         vec![Value::Object(BTreeMap::from([
//!             ("id".to_string(), Value::Int(1)),
//!             ("name".to_string(), Value::String("Ada".to_string())),
//!         ]))],
//!         WriteMode::Append,
//!     )?;
//!
//!     let found = engine.read("users", ReadOptions::default())?;
//!     assert_eq!(found.len(), 1);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The [`StorageEngine`] struct is the main entry point. All operations go
//! through it; table layout, catalog metadata, secondary indexes, and the
//! read cache are internal to the crates that back it and are not exposed
//! directly.
//!
//! Internal crates (`litestore-core`, `litestore-storage`, `litestore-engine`)
//! are implementation detail. Only the public API surface re-exported here is
//! stable.

pub use litestore_engine::*;
