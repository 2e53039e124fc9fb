//! The public face of litestore: `StorageEngine` and the options/result
//! types its methods take and return.
//!
//! `litestore-core` defines the value model and error type; `litestore-storage`
//! owns the on-disk layout, catalog, indexes, and cache; this crate wires them
//! together with the query pipeline, the transaction coordinator, and the
//! background auto-sync loop into one coherent API.

#![warn(missing_docs)]

pub mod autosync;
pub mod config;
pub mod query;
pub mod storage_engine;
pub mod transaction;

pub use autosync::{AutoSyncService, SyncStats};
pub use config::{AutoSyncSettings, CacheSettings, EncryptionConfig, EngineConfig, PerformanceConfig};
pub use query::{Filter, QueryOptions, SortAlgorithm, SortDirection, SortKey};
pub use storage_engine::{BulkOperation, CreateTableOptions, ReadOptions, StorageEngine, WriteResult};
pub use transaction::{Operation, TransactionState, WriteMode};

pub use litestore_core::error::{Error, Result};
pub use litestore_core::value::{RecordId, Value};
pub use litestore_storage::catalog::{ColumnSchema, ColumnType, TableMeta, TableMode};
pub use litestore_storage::index::IndexKind;
