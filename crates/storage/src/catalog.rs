//! Table catalog: persistent metadata about every table, debounced to disk.
//!
//! The catalog itself is not integrity-wrapped (`meta.ldb` is plain JSON;
//! see the on-disk layout); a parse failure or missing file simply
//! reinitializes an empty catalog and persists it immediately, the same
//! auto-repair behavior the teacher crate's indices give themselves when a
//! run entry goes missing (see `storage::index::RunIndex`).

use crate::backend::FileBackend;
use crate::index::IndexKind;
use litestore_core::error::Result;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::warn;

const CATALOG_VERSION: &str = "1.0.0";

/// Whether a table is stored as a single file or a chunked directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableMode {
    /// One `<name>.ldb` file.
    Single,
    /// A `<name>/` directory of `NNNNNN.ldb` chunk files.
    Chunked,
}

/// Declared type of a table column. Advisory only; never enforced at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// UTF-8 string.
    String,
    /// Numeric value.
    Number,
    /// Boolean value.
    Boolean,
    /// ISO-8601 date/time string.
    Date,
    /// Opaque binary payload (base64-encoded string on the wire).
    Blob,
}

/// A declared column's type and sensitivity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// The column's declared type.
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Whether this field is flagged as high-risk (subject to stricter
    /// cache/encryption handling upstream of the core).
    #[serde(default)]
    pub is_high_risk: bool,
}

/// Persistent metadata for one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMeta {
    /// Storage layout.
    pub mode: TableMode,
    /// Path relative to the store root (file for `single`, directory for `chunked`).
    pub path: String,
    /// Current record count.
    pub count: usize,
    /// On-disk size in bytes, if known.
    #[serde(default)]
    pub size: Option<u64>,
    /// Number of chunk files, for `chunked` tables.
    #[serde(default)]
    pub chunks: Option<usize>,
    /// Creation timestamp, milliseconds since the epoch.
    pub created_at: i64,
    /// Last-modified timestamp, milliseconds since the epoch.
    pub updated_at: i64,
    /// Declared column types.
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnSchema>,
    /// Secondary indexes declared on this table.
    #[serde(default)]
    pub indexes: BTreeMap<String, IndexKind>,
    /// Whether this table is flagged high-risk (bypasses the read cache).
    #[serde(default)]
    pub is_high_risk: bool,
    /// Field names that triggered the high-risk flag, if any.
    #[serde(default)]
    pub high_risk_fields: Vec<String>,
}

impl TableMeta {
    fn new(mode: TableMode, path: String, now: i64) -> Self {
        TableMeta {
            mode,
            path,
            count: 0,
            size: None,
            chunks: None,
            created_at: now,
            updated_at: now,
            columns: BTreeMap::new(),
            indexes: BTreeMap::new(),
            is_high_risk: false,
            high_risk_fields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Catalog {
    version: String,
    #[serde(rename = "generatedAt")]
    generated_at: i64,
    tables: BTreeMap<String, TableMeta>,
}

impl Catalog {
    fn empty() -> Self {
        Catalog { version: CATALOG_VERSION.to_string(), generated_at: now_ms(), tables: BTreeMap::new() }
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

struct DebounceSignal {
    dirty: Mutex<bool>,
    condvar: Condvar,
}

/// Owns the in-memory table catalog and persists it to `meta.ldb`, debounced
/// so bursts of mutations coalesce into one write.
pub struct CatalogManager {
    backend: Arc<dyn FileBackend>,
    path: PathBuf,
    state: Arc<Mutex<Catalog>>,
    signal: Arc<DebounceSignal>,
    writing: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl CatalogManager {
    /// Load the catalog at `path` (re-initializing to empty on any parse
    /// failure), and spawn its debounce worker.
    pub fn new(backend: Arc<dyn FileBackend>, path: PathBuf, debounce_ms: u64) -> Self {
        let initial = Self::load_or_reinit(&*backend, &path);
        let state = Arc::new(Mutex::new(initial));
        let signal = Arc::new(DebounceSignal { dirty: Mutex::new(false), condvar: Condvar::new() });
        let writing = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = {
            let backend = Arc::clone(&backend);
            let path = path.clone();
            let state = Arc::clone(&state);
            let signal = Arc::clone(&signal);
            let writing = Arc::clone(&writing);
            let shutdown = Arc::clone(&shutdown);
            std::thread::spawn(move || {
                debounce_loop(backend, path, state, signal, writing, shutdown, debounce_ms);
            })
        };

        CatalogManager {
            backend,
            path,
            state,
            signal,
            writing,
            shutdown,
            worker: Some(worker),
        }
    }

    fn load_or_reinit(backend: &dyn FileBackend, path: &PathBuf) -> Catalog {
        if !backend.exists(path) {
            return Catalog::empty();
        }
        match backend.read(path).and_then(|bytes| {
            serde_json::from_slice::<Catalog>(&bytes)
                .map_err(|e| litestore_core::error::Error::corrupt(e.to_string()))
        }) {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(error = %e, "catalog failed to load, reinitializing empty");
                Catalog::empty()
            }
        }
    }

    /// Merge `patch` over the table's existing entry, creating a default of
    /// `default_mode` if absent, and always refreshing `updated_at`.
    pub fn update(&self, name: &str, default_mode: TableMode, patch: impl FnOnce(&mut TableMeta)) {
        let now = now_ms();
        {
            let mut state = self.state.lock();
            let entry = state
                .tables
                .entry(name.to_string())
                .or_insert_with(|| TableMeta::new(default_mode, default_table_path(name, default_mode), now));
            patch(entry);
            entry.updated_at = now;
        }
        self.trigger_save();
    }

    /// Remove the table's catalog entry, if present.
    pub fn delete(&self, name: &str) {
        {
            let mut state = self.state.lock();
            state.tables.remove(name);
        }
        self.trigger_save();
    }

    /// A copy of the table's metadata, if it exists.
    pub fn get(&self, name: &str) -> Option<TableMeta> {
        self.state.lock().tables.get(name).cloned()
    }

    /// The table's record count, if it exists.
    pub fn count(&self, name: &str) -> Option<usize> {
        self.get(name).map(|meta| meta.count)
    }

    /// Every table name currently registered.
    pub fn all_tables(&self) -> Vec<String> {
        self.state.lock().tables.keys().cloned().collect()
    }

    /// Whether a table is registered.
    pub fn has_table(&self, name: &str) -> bool {
        self.state.lock().tables.contains_key(name)
    }

    fn trigger_save(&self) {
        let mut dirty = self.signal.dirty.lock();
        *dirty = true;
        self.signal.condvar.notify_one();
    }

    /// Force an immediate, synchronous save, bypassing the debounce timer.
    pub fn save_now(&self) -> Result<()> {
        save(&*self.backend, &self.path, &self.state, &self.writing)
    }
}

impl Drop for CatalogManager {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.signal.condvar.notify_one();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        let _ = self.save_now();
    }
}

fn default_table_path(name: &str, mode: TableMode) -> String {
    match mode {
        TableMode::Single => format!("{name}.ldb"),
        TableMode::Chunked => name.to_string(),
    }
}

fn save(
    backend: &dyn FileBackend,
    path: &PathBuf,
    state: &Mutex<Catalog>,
    writing: &AtomicBool,
) -> Result<()> {
    if writing
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Ok(());
    }
    let result = {
        let mut catalog = state.lock().clone();
        catalog.generated_at = now_ms();
        let bytes = serde_json::to_vec_pretty(&catalog).expect("catalog serialization is infallible");
        backend.write_atomic(path, &bytes)
    };
    writing.store(false, Ordering::SeqCst);
    result
}

#[allow(clippy::too_many_arguments)]
fn debounce_loop(
    backend: Arc<dyn FileBackend>,
    path: PathBuf,
    state: Arc<Mutex<Catalog>>,
    signal: Arc<DebounceSignal>,
    writing: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    debounce_ms: u64,
) {
    loop {
        {
            let mut dirty = signal.dirty.lock();
            while !*dirty && !shutdown.load(Ordering::SeqCst) {
                signal.condvar.wait(&mut dirty);
            }
            if shutdown.load(Ordering::SeqCst) {
                return;
            }
        }
        std::thread::sleep(Duration::from_millis(debounce_ms));
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        {
            let mut dirty = signal.dirty.lock();
            *dirty = false;
        }
        if let Err(e) = save(&*backend, &path, &state, &writing) {
            warn!(error = %e, "catalog debounced save failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalFileBackend;
    use tempfile::tempdir;

    fn manager(path: PathBuf) -> CatalogManager {
        CatalogManager::new(Arc::new(LocalFileBackend::default()), path, 10)
    }

    #[test]
    fn update_creates_default_entry_and_refreshes_timestamp() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path().join("meta.ldb"));
        mgr.update("users", TableMode::Single, |meta| meta.count = 3);
        let meta = mgr.get("users").unwrap();
        assert_eq!(meta.count, 3);
        assert_eq!(meta.mode, TableMode::Single);
    }

    #[test]
    fn delete_removes_entry() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path().join("meta.ldb"));
        mgr.update("users", TableMode::Single, |_| {});
        mgr.delete("users");
        assert!(!mgr.has_table("users"));
    }

    #[test]
    fn save_now_persists_and_reload_recovers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.ldb");
        {
            let mgr = manager(path.clone());
            mgr.update("users", TableMode::Chunked, |meta| meta.count = 7);
            mgr.save_now().unwrap();
        }
        let reloaded = manager(path);
        assert_eq!(reloaded.count("users"), Some(7));
    }

    #[test]
    fn corrupt_catalog_file_reinitializes_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.ldb");
        LocalFileBackend::default().write_atomic(&path, b"not json").unwrap();
        let mgr = manager(path);
        assert!(mgr.all_tables().is_empty());
    }

    #[test]
    fn debounced_mutation_eventually_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.ldb");
        let mgr = manager(path.clone());
        mgr.update("users", TableMode::Single, |meta| meta.count = 1);
        std::thread::sleep(Duration::from_millis(100));
        let bytes = LocalFileBackend::default().read(&path).unwrap();
        let catalog: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(catalog["tables"]["users"]["count"], 1);
    }
}
