//! Core types shared across litestore.
//!
//! This crate defines the foundational types used throughout the storage
//! engine: the canonical record `Value`, the unified `Error` type, table
//! name validation, and shared size/time/concurrency limits. It has no I/O
//! and no locking of its own — those live in `litestore-storage` and
//! `litestore-engine`.

#![warn(missing_docs)]

pub mod error;
pub mod limits;
pub mod table_name;
pub mod value;

pub use error::{Error, Result};
pub use table_name::validate_table_name;
pub use value::{RecordId, Value};
