//! Size, time, and concurrency limits shared across litestore crates.
//!
//! Centralizing these as named constants (rather than scattering magic
//! numbers) follows the teacher crate's `core::limits` module.

/// Maximum length of a table name, in bytes.
pub const MAX_TABLE_NAME_LEN: usize = 100;

/// Default target chunk size for chunked tables (5 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Minimum allowed chunk size (1 MiB); configured values below this are
/// clamped up.
pub const MIN_CHUNK_SIZE: u64 = 1024 * 1024;

/// Minimum number of chunk indices to probe when directory listing is
/// unavailable and existence must be determined by trial.
pub const MIN_CHUNK_PROBE_RANGE: usize = 20;

/// Capacity of the chunk LRU cache used by `ChunkedFileHandler::read_all`.
pub const CHUNK_CACHE_CAPACITY: usize = 10;

/// Maximum concurrent chunk writes within a single `append`.
pub const MAX_CONCURRENT_CHUNK_WRITES: usize = 4;

/// Maximum concurrent chunk reads within a single `read_all`/`read_range`.
pub const MAX_CONCURRENT_CHUNK_READS: usize = 6;

/// Retry attempts for a transiently-locked/busy chunk write.
pub const CHUNK_WRITE_RETRIES: u32 = 3;

/// Backoff between chunk write retries, in milliseconds.
pub const CHUNK_WRITE_RETRY_BACKOFF_MS: u64 = 100;

/// Default per-I/O-operation timeout, in milliseconds.
pub const DEFAULT_IO_TIMEOUT_MS: u64 = 10_000;

/// Catalog save debounce interval in normal operation, in milliseconds.
pub const CATALOG_DEBOUNCE_MS: u64 = 200;

/// Catalog save debounce interval in test mode, in milliseconds.
pub const CATALOG_DEBOUNCE_TEST_MS: u64 = 10;

/// Default auto-sync tick interval, in milliseconds.
pub const DEFAULT_AUTOSYNC_INTERVAL_MS: u64 = 5_000;

/// Default minimum dirty item count before an auto-sync tick flushes.
pub const DEFAULT_AUTOSYNC_MIN_ITEMS: usize = 1;

/// Default maximum batch size for a single auto-sync flush.
pub const DEFAULT_AUTOSYNC_BATCH_SIZE: usize = 100;

/// Maximum jitter added to a cache entry's TTL when avalanche protection is
/// enabled, in milliseconds (5 minutes).
pub const MAX_CACHE_TTL_JITTER_MS: u64 = 5 * 60 * 1000;

/// Minimum TTL, in milliseconds, above which jitter is applied at all.
pub const JITTER_ELIGIBLE_TTL_MS: u64 = 1_000;

/// Fraction of `max_memory_usage` that a cleanup pass targets (70%).
pub const CACHE_MEMORY_CLEANUP_TARGET: f64 = 0.7;

/// Batch size for `bulk_write` operation processing.
pub const BULK_WRITE_BATCH_SIZE: usize = 1_000;

/// PBKDF2 iteration count floor for key derivation (spec.md §4.3: "≥100000").
pub const MIN_PBKDF2_ITERATIONS: u32 = 100_000;

/// How often `count()` is permitted to opportunistically verify against
/// actual length, per table (5 minutes).
pub const COUNT_VERIFY_INTERVAL_MS: u64 = 5 * 60 * 1000;

/// Only opportunistically verify counts for tables updated within this
/// window (24 hours).
pub const COUNT_VERIFY_FRESHNESS_MS: u64 = 24 * 60 * 60 * 1000;
