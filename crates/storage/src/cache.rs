//! Read-through cache with LRU/LFU eviction, jittered TTL, dirty tracking,
//! and single-flight ("breakdown guard") loader deduplication.
//!
//! The expiry index is a `BTreeMap<timestamp, HashSet<key>>`, the same shape
//! as the teacher crate's `storage::ttl::TTLIndex`, so expired-entry scans
//! are a prefix walk rather than a full table scan.

use litestore_core::error::{Error, Result};
use litestore_core::limits::{CACHE_MEMORY_CLEANUP_TARGET, JITTER_ELIGIBLE_TTL_MS, MAX_CACHE_TTL_JITTER_MS};
use litestore_core::value::Value;
use parking_lot::{Condvar, Mutex};
use rand::Rng;
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

/// Eviction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionStrategy {
    /// Evict the least-recently-used entry.
    Lru,
    /// Evict the least-frequently-used entry.
    Lfu,
}

/// Cache sizing and behavior configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries before eviction kicks in.
    pub max_size: usize,
    /// Maximum accounted memory usage, in bytes, before eviction kicks in.
    pub max_memory_usage: usize,
    /// Eviction strategy.
    pub strategy: EvictionStrategy,
    /// Whether TTL jitter ("avalanche protection") is applied.
    pub avalanche_protection: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_size: 10_000,
            max_memory_usage: 64 * 1024 * 1024,
            strategy: EvictionStrategy::Lru,
            avalanche_protection: true,
        }
    }
}

struct Entry {
    payload: Value,
    table: String,
    expires_at: i64,
    access_count: u64,
    last_access: i64,
    dirty: bool,
    original_size: usize,
}

struct CacheState {
    entries: FxHashMap<String, Entry>,
    expiry_index: BTreeMap<i64, HashSet<String>>,
    lru_order: VecDeque<String>,
    keys_by_table: FxHashMap<String, HashSet<String>>,
    memory_used: usize,
}

impl CacheState {
    fn new() -> Self {
        CacheState {
            entries: FxHashMap::default(),
            expiry_index: BTreeMap::new(),
            lru_order: VecDeque::new(),
            keys_by_table: FxHashMap::default(),
            memory_used: 0,
        }
    }

    fn remove(&mut self, key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            self.memory_used = self.memory_used.saturating_sub(entry.original_size);
            if let Some(bucket) = self.expiry_index.get_mut(&entry.expires_at) {
                bucket.remove(key);
                if bucket.is_empty() {
                    self.expiry_index.remove(&entry.expires_at);
                }
            }
            if let Some(bucket) = self.keys_by_table.get_mut(&entry.table) {
                bucket.remove(key);
            }
        }
        self.lru_order.retain(|k| k != key);
    }

    fn touch_lru(&mut self, key: &str) {
        self.lru_order.retain(|k| k != key);
        self.lru_order.push_back(key.to_string());
    }

    fn evict_if_needed(&mut self, config: &CacheConfig) {
        if self.entries.len() <= config.max_size && self.memory_used <= config.max_memory_usage {
            return;
        }
        // Cleanup target: shrink memory back to 70% of the cap, not merely
        // under it, so eviction doesn't re-trigger on the very next insert.
        let memory_target = (config.max_memory_usage as f64 * CACHE_MEMORY_CLEANUP_TARGET) as usize;
        while (self.entries.len() > config.max_size || self.memory_used > memory_target)
            && !self.entries.is_empty()
        {
            let victim = match config.strategy {
                EvictionStrategy::Lru => self.lru_order.front().cloned(),
                EvictionStrategy::Lfu => self
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.access_count)
                    .map(|(k, _)| k.clone()),
            };
            let Some(victim) = victim else { break };
            self.remove(&victim);
        }
    }
}

type InFlight = Arc<(Mutex<Option<Result<Value>>>, Condvar)>;

/// The read-through cache owned by the storage engine.
pub struct CacheManager {
    config: CacheConfig,
    state: Mutex<CacheState>,
    in_flight: Mutex<FxHashMap<String, InFlight>>,
}

impl CacheManager {
    /// Build a cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        CacheManager { config, state: Mutex::new(CacheState::new()), in_flight: Mutex::new(FxHashMap::default()) }
    }

    fn jittered_expiry(&self, ttl_ms: i64) -> i64 {
        let now = now_ms();
        if !self.config.avalanche_protection || ttl_ms < JITTER_ELIGIBLE_TTL_MS as i64 {
            return now + ttl_ms;
        }
        let jitter = rand::thread_rng().gen_range(0..=MAX_CACHE_TTL_JITTER_MS as i64);
        now + ttl_ms + jitter
    }

    /// Insert or overwrite `key`'s cached payload.
    pub fn set(&self, key: &str, table: &str, payload: Value, ttl_ms: i64, dirty: bool) {
        let expires_at = self.jittered_expiry(ttl_ms);
        let size = payload.canonical_json().len();
        let mut state = self.state.lock();
        state.remove(key);
        state.entries.insert(
            key.to_string(),
            Entry {
                payload,
                table: table.to_string(),
                expires_at,
                access_count: 0,
                last_access: now_ms(),
                dirty,
                original_size: size,
            },
        );
        state.memory_used += size;
        state.expiry_index.entry(expires_at).or_default().insert(key.to_string());
        state.keys_by_table.entry(table.to_string()).or_default().insert(key.to_string());
        state.touch_lru(key);
        state.evict_if_needed(&self.config);
    }

    /// Look up `key`. Returns `None` for a missing or expired entry
    /// (expired entries are removed as a side effect).
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut state = self.state.lock();
        let now = now_ms();
        let expired = state.entries.get(key).map(|e| e.expires_at <= now).unwrap_or(false);
        if expired {
            state.remove(key);
            return None;
        }
        let payload = state.entries.get(key).map(|e| e.payload.clone());
        if payload.is_some() {
            if let Some(entry) = state.entries.get_mut(key) {
                entry.access_count += 1;
                entry.last_access = now;
            }
            state.touch_lru(key);
        }
        payload
    }

    /// Remove `key` from the cache.
    pub fn delete(&self, key: &str) {
        self.state.lock().remove(key);
    }

    /// Remove every non-dirty cached key belonging to `table` (read-through
    /// results, stale after a write). Dirty write-back entries are left
    /// alone — they're cleared by `mark_as_clean` once flushed, not by
    /// invalidation.
    pub fn invalidate_table(&self, table: &str) {
        let mut state = self.state.lock();
        let keys: Vec<String> = state
            .keys_by_table
            .get(table)
            .map(|k| k.iter().cloned().collect())
            .unwrap_or_default();
        for key in keys {
            if state.entries.get(&key).map(|e| e.dirty).unwrap_or(false) {
                continue;
            }
            state.remove(&key);
        }
    }

    /// Remove every cached key belonging to `table`, dirty or not. Used when
    /// the table itself is gone (dropped or recreated), so there's nothing
    /// left for a dirty entry to be flushed against.
    pub fn drop_table(&self, table: &str) {
        let mut state = self.state.lock();
        let keys: Vec<String> = state
            .keys_by_table
            .get(table)
            .map(|k| k.iter().cloned().collect())
            .unwrap_or_default();
        for key in keys {
            state.remove(&key);
        }
    }

    /// Every dirty entry as `(key, table, payload)`, `table` taken from the
    /// entry's own attribution rather than parsed back out of `key`.
    pub fn dirty_data(&self) -> Vec<(String, String, Value)> {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|(_, e)| e.dirty)
            .map(|(k, e)| (k.clone(), e.table.clone(), e.payload.clone()))
            .collect()
    }

    /// Clear the dirty bit on `key`, if present.
    pub fn mark_as_clean(&self, key: &str) {
        if let Some(entry) = self.state.lock().entries.get_mut(key) {
            entry.dirty = false;
        }
    }

    /// Single-flight read-through: the first caller for `key` runs `loader`;
    /// concurrent callers for the same key await that result instead of
    /// re-running it. `table` is the cache's bucket attribution for `key`,
    /// used by `invalidate_table` — callers must pass the real table name,
    /// not a value derived from `key` (table names may contain `_`).
    pub fn get_safe(
        &self,
        key: &str,
        table: &str,
        ttl_ms: i64,
        loader: impl FnOnce() -> Result<Value>,
    ) -> Result<Value> {
        if let Some(cached) = self.get(key) {
            return Ok(cached);
        }

        let (slot, is_leader) = {
            let mut in_flight = self.in_flight.lock();
            if let Some(existing) = in_flight.get(key) {
                (Arc::clone(existing), false)
            } else {
                let slot: InFlight = Arc::new((Mutex::new(None), Condvar::new()));
                in_flight.insert(key.to_string(), Arc::clone(&slot));
                (slot, true)
            }
        };

        if is_leader {
            let result = loader();
            if let Ok(value) = &result {
                self.set(key, table, value.clone(), ttl_ms, false);
            }
            {
                let mut guard = slot.0.lock();
                *guard = Some(clone_result(&result));
            }
            slot.1.notify_all();
            self.in_flight.lock().remove(key);
            result
        } else {
            let mut guard = slot.0.lock();
            while guard.is_none() {
                slot.1.wait(&mut guard);
            }
            clone_result(guard.as_ref().unwrap())
        }
    }
}

fn clone_result(result: &Result<Value>) -> Result<Value> {
    match result {
        Ok(v) => Ok(v.clone()),
        Err(e) => Err(clone_error(e)),
    }
}

fn clone_error(e: &Error) -> Error {
    Error::corrupt(e.to_string())
}

/// The table name portion of a cache key, the text before the first `_`.
pub fn table_from_key(key: &str) -> &str {
    key.split('_').next().unwrap_or(key)
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
