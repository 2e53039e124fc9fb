//! File-level storage primitives for litestore: the filesystem backend,
//! on-disk codecs, single-file and chunked table handlers, the table
//! catalog, secondary indexes, and the read-through cache.
//!
//! `litestore-engine` composes these into the public `StorageEngine`; this
//! crate has no notion of transactions, queries, or the engine's public API.

#![warn(missing_docs)]

pub mod backend;
pub mod cache;
pub mod catalog;
pub mod chunked;
pub mod codec;
pub mod index;
pub mod single_file;

pub use backend::{FileBackend, FileStat, LocalFileBackend};
pub use cache::{CacheConfig, CacheManager, EvictionStrategy};
pub use catalog::{CatalogManager, ColumnSchema, ColumnType, TableMeta, TableMode};
pub use chunked::{AppendOutcome, ChunkedFileHandler};
pub use codec::{AesCtrHmacEncryption, EncryptionCodec, IntegrityCodec, NoopEncryption};
pub use index::{IndexKind, IndexManager};
pub use single_file::SingleFileHandler;
