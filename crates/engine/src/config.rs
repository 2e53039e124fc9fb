//! Engine configuration: every key named in the external-interfaces
//! configuration table, with a TOML round-trip via the `toml` crate.

use crate::query::SortAlgorithm;
use litestore_core::error::{Error, Result};
use litestore_core::limits::{
    DEFAULT_AUTOSYNC_BATCH_SIZE, DEFAULT_AUTOSYNC_INTERVAL_MS, DEFAULT_AUTOSYNC_MIN_ITEMS,
    DEFAULT_CHUNK_SIZE, DEFAULT_IO_TIMEOUT_MS, MIN_PBKDF2_ITERATIONS,
};
use serde::{Deserialize, Serialize};

/// Root configuration for a `StorageEngine` instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Byte target for chunked table files.
    pub chunk_size: u64,
    /// Root directory name for the on-disk store.
    pub storage_folder: String,
    /// Default sort algorithm selector, used when a query doesn't request one explicitly.
    #[serde(rename = "sortMethods")]
    pub sort_method: SortAlgorithm,
    /// Per-I/O-operation timeout, in milliseconds.
    pub timeout: u64,
    /// Encryption-at-rest settings.
    pub encryption: EncryptionConfig,
    /// Cache and auto-sync settings.
    pub cache: CacheSettings,
    /// Advisory performance hints.
    pub performance: PerformanceConfig,
    /// Passed through untouched; outside the core's contract (rate limiting, retries).
    pub api: Option<serde_json::Value>,
    /// Passed through untouched; outside the core's contract.
    pub monitoring: Option<serde_json::Value>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            storage_folder: "expo-litedatastore".to_string(),
            sort_method: SortAlgorithm::default(),
            timeout: DEFAULT_IO_TIMEOUT_MS,
            encryption: EncryptionConfig::default(),
            cache: CacheSettings::default(),
            performance: PerformanceConfig::default(),
            api: None,
            monitoring: None,
        }
    }
}

impl EngineConfig {
    /// Parse a config from a TOML document.
    pub fn from_toml_str(s: &str) -> Result<EngineConfig> {
        toml::from_str(s).map_err(|e| Error::invalid_input(format!("invalid engine config: {e}")))
    }

    /// Serialize this config as a TOML document.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::invalid_input(format!("config is not serializable: {e}")))
    }
}

/// Encryption-at-rest settings. `enabled = false` (the default) uses a
/// no-op codec; the core never chooses the primitive, only whether and how
/// often to invoke it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EncryptionConfig {
    /// Whether payloads are wrapped in an authenticated envelope.
    pub enabled: bool,
    /// Cipher identifier, informational (the core always uses AES-CTR + HMAC).
    pub algorithm: String,
    /// Derived key size, in bytes.
    pub key_size: u32,
    /// HMAC identifier, informational.
    pub hmac_algorithm: String,
    /// PBKDF2 iteration count, clamped up to `MIN_PBKDF2_ITERATIONS`.
    pub key_iterations: u32,
    /// Whether individual fields (rather than whole payloads) are encrypted.
    /// Advisory; the core encrypts whole payloads only.
    pub enable_field_level_encryption: bool,
    /// Field names flagged for field-level encryption upstream.
    pub encrypted_fields: Vec<String>,
    /// How long a derived key may be reused before re-deriving, in milliseconds.
    pub cache_timeout: u64,
    /// Maximum number of derived keys to retain.
    pub max_cache_size: usize,
    /// Whether bulk operations batch encryption calls. Advisory.
    pub use_bulk_operations: bool,
    /// Passphrase used to derive the encryption key. Not one of the named
    /// configuration keys in the external interface, but required to
    /// actually construct an encryption codec from this config.
    pub passphrase: Option<String>,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        EncryptionConfig {
            enabled: false,
            algorithm: "aes-128-ctr".to_string(),
            key_size: 16,
            hmac_algorithm: "hmac-sha256".to_string(),
            key_iterations: MIN_PBKDF2_ITERATIONS,
            enable_field_level_encryption: false,
            encrypted_fields: Vec::new(),
            cache_timeout: 0,
            max_cache_size: 0,
            use_bulk_operations: false,
            passphrase: None,
        }
    }
}

/// Cache sizing, expiry, and auto-sync settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheSettings {
    /// Maximum cached entry count before eviction.
    pub max_size: usize,
    /// Default TTL for cached reads, in milliseconds.
    pub default_expiry: i64,
    /// Whether cached payloads are compressed. Advisory; not yet implemented.
    pub enable_compression: bool,
    /// How often expired entries are proactively swept, in milliseconds.
    pub cleanup_interval: u64,
    /// Fraction of `maxMemoryUsage` at which a memory-pressure warning logs.
    pub memory_warning_threshold: f64,
    /// Background dirty-flush settings.
    pub auto_sync: AutoSyncSettings,
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            max_size: 10_000,
            default_expiry: 60_000,
            enable_compression: false,
            cleanup_interval: 60_000,
            memory_warning_threshold: 0.8,
            auto_sync: AutoSyncSettings::default(),
        }
    }
}

/// `AutoSyncService` tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AutoSyncSettings {
    /// Whether the background flush loop runs at all.
    pub enabled: bool,
    /// Tick interval, in milliseconds.
    pub interval: u64,
    /// Minimum dirty-entry count before a tick flushes anything.
    pub min_items: usize,
    /// Maximum entries flushed in a single tick.
    pub batch_size: usize,
}

impl Default for AutoSyncSettings {
    fn default() -> Self {
        AutoSyncSettings {
            enabled: true,
            interval: DEFAULT_AUTOSYNC_INTERVAL_MS,
            min_items: DEFAULT_AUTOSYNC_MIN_ITEMS,
            batch_size: DEFAULT_AUTOSYNC_BATCH_SIZE,
        }
    }
}

/// Advisory performance hints; the engine does not currently change
/// behavior based on these beyond what's documented at each call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PerformanceConfig {
    /// Whether the query engine may pick a non-default sort/filter strategy.
    pub enable_query_optimization: bool,
    /// Advisory cap on concurrent operations a host may issue.
    pub max_concurrent_operations: usize,
    /// Whether bulk operations batch internally. Advisory.
    pub enable_batch_optimization: bool,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        PerformanceConfig {
            enable_query_optimization: true,
            max_concurrent_operations: 4,
            enable_batch_optimization: true,
        }
    }
}
