//! The orchestrator: table lifecycle, CRUD, bulk operations, migration,
//! transactions, and the auto-sync/cache/index/catalog wiring that every
//! mutating call threads through.

use crate::autosync::{AutoSyncService, SyncStats};
use crate::config::EngineConfig;
use crate::query::{self, Filter, QueryOptions};
use crate::transaction::{Operation, TransactionCoordinator, WriteMode};
use litestore_core::error::{Error, Result};
use litestore_core::limits::{COUNT_VERIFY_FRESHNESS_MS, COUNT_VERIFY_INTERVAL_MS};
use litestore_core::table_name::validate_table_name;
use litestore_core::value::{RecordId, Value};
use litestore_storage::backend::{FileBackend, LocalFileBackend};
use litestore_storage::cache::{CacheConfig, CacheManager};
use litestore_storage::catalog::{CatalogManager, ColumnSchema, TableMeta, TableMode};
use litestore_storage::chunked::ChunkedFileHandler;
use litestore_storage::codec::{AesCtrHmacEncryption, EncryptionCodec, NoopEncryption};
use litestore_storage::index::{IndexKind, IndexManager};
use litestore_storage::single_file::SingleFileHandler;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Options accepted by `create_table`.
#[derive(Debug, Clone, Default)]
pub struct CreateTableOptions {
    /// Explicit layout; `None` lets the engine choose from the initial data size.
    pub mode: Option<TableMode>,
    /// Records to seed the table with.
    pub initial_data: Vec<Value>,
    /// Declared column schema, stored as advisory catalog metadata.
    pub columns: BTreeMap<String, ColumnSchema>,
}

/// Options accepted by `read`/`find_many`.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Mongo-style filter object; `None` matches every record.
    pub filter: Option<Value>,
    /// Sort pipeline and pagination.
    pub query: QueryOptions,
    /// Skip the read cache for this call.
    pub bypass_cache: bool,
}

/// Outcome of a `write` or `bulk_write` call.
#[derive(Debug, Clone, Copy)]
pub struct WriteResult {
    /// Number of records the call actually affected.
    pub written: usize,
    /// Table length after the call completed.
    pub total_after_write: usize,
    /// Whether the table is chunked.
    pub chunked: bool,
}

/// One operation within a `bulk_write` batch, keyed by the record's `id` field.
#[derive(Debug, Clone)]
pub enum BulkOperation {
    /// Upsert: update if `id` exists, append otherwise.
    Insert(Value),
    /// Merge `data`'s fields onto the existing record with the same `id`.
    Update(Value),
    /// Remove the record with this `id`.
    Delete(RecordId),
}

fn bulk_operation_to_value(op: &BulkOperation) -> Value {
    let mut fields = BTreeMap::new();
    match op {
        BulkOperation::Insert(data) => {
            fields.insert("type".to_string(), Value::String("insert".to_string()));
            fields.insert("data".to_string(), data.clone());
        }
        BulkOperation::Update(data) => {
            fields.insert("type".to_string(), Value::String("update".to_string()));
            fields.insert("data".to_string(), data.clone());
        }
        BulkOperation::Delete(id) => {
            fields.insert("type".to_string(), Value::String("delete".to_string()));
            let id_value = match id {
                RecordId::Int(n) => Value::Int(*n),
                RecordId::Str(s) => Value::String(s.clone()),
            };
            fields.insert("id".to_string(), id_value);
        }
    }
    Value::Object(fields)
}

fn bulk_operation_from_value(value: &Value) -> Result<BulkOperation> {
    let object = value.as_object().ok_or_else(|| Error::invalid_input("bulk operation must be an object"))?;
    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::invalid_input("bulk operation missing 'type'"))?;
    match kind {
        "insert" => Ok(BulkOperation::Insert(object.get("data").cloned().unwrap_or_else(Value::empty_object))),
        "update" => Ok(BulkOperation::Update(object.get("data").cloned().unwrap_or_else(Value::empty_object))),
        "delete" => {
            let id = object.get("id").and_then(Value::record_id_from_field).ok_or_else(|| Error::invalid_input("delete op missing 'id'"))?;
            Ok(BulkOperation::Delete(id))
        }
        other => Err(Error::invalid_input(format!("unsupported bulk operation type: {other}"))),
    }
}

fn cache_key(table: &str, options: &ReadOptions) -> String {
    let mut descriptor = BTreeMap::new();
    descriptor.insert("filter".to_string(), options.filter.clone().unwrap_or_else(Value::empty_object));
    descriptor.insert("skip".to_string(), Value::Int(options.query.skip as i64));
    if let Some(limit) = options.query.limit {
        descriptor.insert("limit".to_string(), Value::Int(limit as i64));
    }
    let sort: Vec<Value> = options
        .query
        .sort
        .iter()
        .map(|k| {
            Value::Array(vec![
                Value::String(k.field.clone()),
                Value::String(if k.direction == query::SortDirection::Asc { "asc".to_string() } else { "desc".to_string() }),
            ])
        })
        .collect();
    descriptor.insert("sort".to_string(), Value::Array(sort));
    format!("{table}_{}", Value::Object(descriptor).canonical_json())
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn estimated_size(records: &[Value]) -> usize {
    records.iter().map(|r| r.canonical_json().len()).sum()
}

/// Everything the engine owns except the auto-sync thread, so auto-sync's
/// closures can hold an `Arc` back to this without a circular `Self`.
struct Core {
    backend: Arc<dyn FileBackend>,
    encryption: Arc<dyn EncryptionCodec>,
    root: PathBuf,
    catalog: CatalogManager,
    indexes: Mutex<IndexManager>,
    cache: CacheManager,
    transactions: TransactionCoordinator,
    config: EngineConfig,
    last_count_verify: Mutex<HashMap<String, i64>>,
    dirty_seq: std::sync::atomic::AtomicU64,
}

impl Core {
    fn table_path(&self, meta: &TableMeta) -> PathBuf {
        self.root.join(&meta.path)
    }

    fn single_handler(&self, meta: &TableMeta) -> SingleFileHandler {
        SingleFileHandler::new(Arc::clone(&self.backend), Arc::clone(&self.encryption), self.table_path(meta))
    }

    fn chunked_handler(&self, meta: &TableMeta) -> ChunkedFileHandler {
        ChunkedFileHandler::new(Arc::clone(&self.backend), Arc::clone(&self.encryption), self.table_path(meta), self.config.chunk_size)
    }

    fn read_all(&self, meta: &TableMeta) -> Vec<Value> {
        match meta.mode {
            TableMode::Single => self.single_handler(meta).read(),
            TableMode::Chunked => self.chunked_handler(meta).read_all(),
        }
    }

    /// Full rewrite of a table's contents, mode-appropriate.
    fn write_full(&self, meta: &TableMeta, records: &[Value]) -> Result<usize> {
        match meta.mode {
            TableMode::Single => {
                self.single_handler(meta).write(records)?;
                Ok(0)
            }
            TableMode::Chunked => {
                let outcome = self.chunked_handler(meta).write(records)?;
                Ok(outcome.chunks_after)
            }
        }
    }

    /// Extend a table's contents with `new_records`, mode-appropriate.
    fn append(&self, meta: &TableMeta, new_records: &[Value]) -> Result<usize> {
        match meta.mode {
            TableMode::Single => {
                let mut all = self.single_handler(meta).read();
                all.extend_from_slice(new_records);
                self.single_handler(meta).write(&all)?;
                Ok(0)
            }
            TableMode::Chunked => {
                let outcome = self.chunked_handler(meta).append(new_records)?;
                Ok(outcome.chunks_after)
            }
        }
    }

    fn delete_storage(&self, meta: &TableMeta) -> Result<()> {
        match meta.mode {
            TableMode::Single => self.single_handler(meta).delete(),
            TableMode::Chunked => self.chunked_handler(meta).clear(),
        }
    }

    fn require_table(&self, name: &str) -> Result<TableMeta> {
        self.catalog.get(name).ok_or_else(|| Error::not_found(name))
    }

    fn rebuild_indexes(&self, table: &str, records: &[Value]) -> Result<()> {
        self.indexes.lock().rebuild(table, records)
    }

    fn invalidate(&self, table: &str) {
        self.cache.invalidate_table(table);
    }

    /// Buffer `data` as a dirty write-back entry for `table`, for
    /// `AutoSyncService`/`flush_dirty` to pick up later. Each call gets its
    /// own cache key so concurrent writes to the same table don't clobber
    /// each other's buffered payload before the next sync tick.
    fn buffer_dirty_write(&self, table: &str, data: &[Value]) {
        if data.is_empty() {
            return;
        }
        let seq = self.dirty_seq.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let key = format!("{table}__wb_{seq}");
        let ttl = self.config.cache.default_expiry;
        self.cache.set(&key, table, Value::Array(data.to_vec()), ttl, true);
    }

    /// Create (or no-op if present) a table with the given mode and contents.
    fn create_table_now(&self, name: &str, options: &CreateTableOptions) -> Result<()> {
        validate_table_name(name)?;
        if self.catalog.has_table(name) {
            return Ok(());
        }
        let mode = options.mode.unwrap_or_else(|| {
            if estimated_size(&options.initial_data) as u64 > self.config.chunk_size / 2 {
                TableMode::Chunked
            } else {
                TableMode::Single
            }
        });
        let now = now_ms();
        let default_path = match mode {
            TableMode::Single => format!("{name}.ldb"),
            TableMode::Chunked => name.to_string(),
        };
        let temp_meta = TableMeta {
            mode,
            path: default_path,
            count: 0,
            size: None,
            chunks: None,
            created_at: now,
            updated_at: now,
            columns: options.columns.clone(),
            indexes: BTreeMap::new(),
            is_high_risk: false,
            high_risk_fields: Vec::new(),
        };
        let chunks_after = self.write_full(&temp_meta, &options.initial_data)?;
        self.rebuild_indexes(name, &options.initial_data)?;

        let count = options.initial_data.len();
        let columns = options.columns.clone();
        self.catalog.update(name, mode, move |meta| {
            meta.count = count;
            meta.columns = columns.clone();
            if mode == TableMode::Chunked {
                meta.chunks = Some(chunks_after);
            }
        });
        Ok(())
    }

    fn delete_table_now(&self, name: &str) -> Result<()> {
        if let Some(meta) = self.catalog.get(name) {
            if let Err(e) = self.delete_storage(&meta) {
                warn!(table = name, error = %e, "best-effort table deletion failed");
            }
        }
        self.catalog.delete(name);
        self.cache.drop_table(name);
        self.indexes.lock().clear_table_indexes(name);
        Ok(())
    }

    fn write_now(&self, name: &str, data: Vec<Value>, mode: WriteMode) -> Result<WriteResult> {
        if !self.catalog.has_table(name) {
            self.create_table_now(name, &CreateTableOptions::default())?;
        }
        let meta = self.require_table(name)?;
        let (total, chunks_after) = match mode {
            WriteMode::Overwrite => {
                let chunks_after = self.write_full(&meta, &data)?;
                self.rebuild_indexes(name, &data)?;
                (data.len(), chunks_after)
            }
            WriteMode::Append => {
                let chunks_after = self.append(&meta, &data)?;
                {
                    let mut indexes = self.indexes.lock();
                    for record in &data {
                        indexes.add_to_indexes(name, record)?;
                    }
                }
                (meta.count + data.len(), chunks_after)
            }
        };
        self.catalog.update(name, meta.mode, move |m| {
            m.count = total;
            if meta.mode == TableMode::Chunked {
                m.chunks = Some(chunks_after);
            }
        });
        self.buffer_dirty_write(name, &data);
        self.invalidate(name);
        Ok(WriteResult { written: data.len(), total_after_write: total, chunked: meta.mode == TableMode::Chunked })
    }

    fn read_now(&self, name: &str, options: &ReadOptions) -> Result<Vec<Value>> {
        let Some(meta) = self.catalog.get(name) else { return Ok(Vec::new()) };
        let filter = Filter::parse(&options.filter.clone().unwrap_or_else(Value::empty_object))
            .map_err(Error::invalid_input)?;

        if options.bypass_cache || meta.is_high_risk {
            let records = if self.transactions.is_active() {
                self.transactions.snapshot_for(name).unwrap_or_else(|| self.read_all(&meta))
            } else {
                self.read_all(&meta)
            };
            return Ok(query::run(records, &filter, &options.query));
        }

        let key = cache_key(name, options);
        let ttl = self.config.cache.default_expiry;
        let snapshot = if self.transactions.is_active() { self.transactions.snapshot_for(name) } else { None };
        let cached = self.cache.get_safe(&key, name, ttl, || {
            let records = snapshot.clone().unwrap_or_else(|| self.read_all(&meta));
            Ok(Value::Array(query::run(records, &filter, &options.query)))
        })?;
        Ok(cached.as_array().map(<[Value]>::to_vec).unwrap_or_default())
    }

    fn delete_now(&self, name: &str, where_filter: &Value) -> Result<usize> {
        let meta = self.require_table(name)?;
        let filter = Filter::parse(where_filter).map_err(Error::invalid_input)?;
        let all = self.read_all(&meta);
        let (dropped, kept): (Vec<Value>, Vec<Value>) = all.into_iter().partition(|r| filter.matches(r));
        if dropped.is_empty() {
            return Ok(0);
        }
        let chunks_after = self.write_full(&meta, &kept)?;
        self.rebuild_indexes(name, &kept)?;
        let count = kept.len();
        self.catalog.update(name, meta.mode, move |m| {
            m.count = count;
            if meta.mode == TableMode::Chunked {
                m.chunks = Some(chunks_after);
            }
        });
        self.invalidate(name);
        Ok(dropped.len())
    }

    fn bulk_write_now(&self, name: &str, operations: &[BulkOperation]) -> Result<WriteResult> {
        let meta = self.require_table(name)?;
        let mut records = self.read_all(&meta);
        let mut by_id: HashMap<RecordId, usize> = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            if let Some(id) = record.record_id() {
                by_id.insert(id, i);
            }
        }

        let mut affected = 0usize;
        for op in operations {
            match op {
                BulkOperation::Insert(data) => {
                    if let Some(id) = data.record_id() {
                        if let Some(&idx) = by_id.get(&id) {
                            records[idx] = data.clone();
                            affected += 1;
                            continue;
                        }
                    }
                    records.push(data.clone());
                    if let Some(id) = data.record_id() {
                        by_id.insert(id, records.len() - 1);
                    }
                    affected += 1;
                }
                BulkOperation::Update(data) => {
                    if let Some(id) = data.record_id() {
                        if let Some(&idx) = by_id.get(&id) {
                            if let (Some(existing), Some(patch)) = (records[idx].as_object().cloned(), data.as_object()) {
                                let mut merged = existing;
                                for (k, v) in patch {
                                    merged.insert(k.clone(), v.clone());
                                }
                                records[idx] = Value::Object(merged);
                                affected += 1;
                            }
                        }
                    }
                }
                BulkOperation::Delete(id) => {
                    if let Some(&idx) = by_id.get(id) {
                        records.remove(idx);
                        by_id.clear();
                        for (i, record) in records.iter().enumerate() {
                            if let Some(rid) = record.record_id() {
                                by_id.insert(rid, i);
                            }
                        }
                        affected += 1;
                    }
                }
            }
        }

        let chunks_after = self.write_full(&meta, &records)?;
        self.rebuild_indexes(name, &records)?;
        let total = records.len();
        self.catalog.update(name, meta.mode, move |m| {
            m.count = total;
            if meta.mode == TableMode::Chunked {
                m.chunks = Some(chunks_after);
            }
        });
        self.invalidate(name);
        Ok(WriteResult { written: affected, total_after_write: total, chunked: meta.mode == TableMode::Chunked })
    }

    fn count_now(&self, name: &str, force_verify: bool) -> Result<usize> {
        let meta = self.require_table(name)?;
        let now = now_ms();
        let fresh_enough = now - meta.updated_at <= COUNT_VERIFY_FRESHNESS_MS as i64;
        let due = {
            let mut last = self.last_count_verify.lock();
            let due = force_verify
                || (fresh_enough
                    && last.get(name).map(|t| now - t >= COUNT_VERIFY_INTERVAL_MS as i64).unwrap_or(true));
            if due {
                last.insert(name.to_string(), now);
            }
            due
        };
        if !due {
            return Ok(meta.count);
        }
        let actual = self.read_all(&meta).len();
        if actual != meta.count {
            warn!(table = name, catalog_count = meta.count, actual, "count drifted, auto-correcting");
            self.catalog.update(name, meta.mode, move |m| m.count = actual);
        }
        Ok(actual)
    }

    fn dirty_count(&self) -> usize {
        self.cache.dirty_data().len()
    }

    /// Drain up to `batch_size` dirty write-back entries. Each entry's data
    /// was already durably written to its table by the `write_now` call that
    /// produced it — `write_now` never defers the actual disk write — so
    /// flushing here means confirming that durability and clearing the dirty
    /// bit, not writing the payload through again (which would duplicate it
    /// under `WriteMode::Append`).
    fn flush_dirty(&self, batch_size: usize) -> Result<usize> {
        let dirty = self.cache.dirty_data();
        let mut flushed_keys = Vec::new();
        for (key, table, _payload) in dirty.into_iter().take(batch_size) {
            if self.catalog.has_table(&table) {
                flushed_keys.push(key);
            }
        }
        for key in &flushed_keys {
            self.cache.mark_as_clean(key);
        }
        Ok(flushed_keys.len())
    }
}

/// The storage engine: the single owner of a store rooted at one directory.
pub struct StorageEngine {
    core: Arc<Core>,
    autosync: AutoSyncService,
}

impl StorageEngine {
    /// Open (or initialize) a store at `root` with `config`.
    pub fn open(root: PathBuf, config: EngineConfig) -> Result<Self> {
        let backend: Arc<dyn FileBackend> = Arc::new(LocalFileBackend::new(config.timeout));
        let encryption: Arc<dyn EncryptionCodec> = if config.encryption.enabled {
            let passphrase = config
                .encryption
                .passphrase
                .clone()
                .ok_or_else(|| Error::invalid_input("encryption.enabled requires encryption.passphrase"))?;
            Arc::new(AesCtrHmacEncryption::new(passphrase, config.encryption.key_iterations))
        } else {
            Arc::new(NoopEncryption)
        };

        let catalog = CatalogManager::new(Arc::clone(&backend), root.join("meta.ldb"), litestore_core::limits::CATALOG_DEBOUNCE_MS);
        let cache = CacheManager::new(CacheConfig {
            max_size: config.cache.max_size,
            ..CacheConfig::default()
        });

        let core = Arc::new(Core {
            backend,
            encryption,
            root,
            catalog,
            indexes: Mutex::new(IndexManager::new()),
            cache,
            transactions: TransactionCoordinator::new(),
            config: config.clone(),
            last_count_verify: Mutex::new(HashMap::new()),
            dirty_seq: std::sync::atomic::AtomicU64::new(0),
        });

        let autosync = {
            let dirty_core = Arc::clone(&core);
            let flush_core = Arc::clone(&core);
            AutoSyncService::new(
                config.cache.auto_sync.enabled,
                config.cache.auto_sync.interval,
                config.cache.auto_sync.min_items,
                config.cache.auto_sync.batch_size,
                move || dirty_core.dirty_count(),
                move |batch_size| flush_core.flush_dirty(batch_size),
            )
        };

        Ok(StorageEngine { core, autosync })
    }

    /// Create a table. Idempotent; a second call for an existing name is a no-op.
    pub fn create_table(&self, name: &str, options: CreateTableOptions) -> Result<()> {
        self.core.create_table_now(name, &options)
    }

    /// Delete a table, if present. Always succeeds.
    pub fn delete_table(&self, name: &str) -> Result<()> {
        self.core.delete_table_now(name)
    }

    /// Whether `name` is a registered table.
    pub fn has_table(&self, name: &str) -> bool {
        self.core.catalog.has_table(name)
    }

    /// Every registered table name.
    pub fn list_tables(&self) -> Vec<String> {
        self.core.catalog.all_tables()
    }

    /// Declare a secondary index on `table` over `fields`.
    pub fn declare_index(&self, table: &str, fields: Vec<String>, kind: IndexKind) -> Result<String> {
        self.require_table(table)?;
        let name = self.core.indexes.lock().declare_index(table, fields.clone(), kind);
        self.core.catalog.update(table, TableMode::Single, |meta| {
            meta.indexes.insert(name_from_fields(&fields, kind), kind);
        });
        Ok(name)
    }

    /// Write `data` to `table`, creating it first if absent.
    pub fn write(&self, name: &str, data: Vec<Value>, mode: WriteMode) -> Result<WriteResult> {
        if self.core.transactions.is_active() {
            let existing = self.core.catalog.get(name).map(|m| m.count).unwrap_or(0);
            let existing_records = self.core.catalog.get(name).map(|m| self.core.read_all(&m)).unwrap_or_default();
            self.core.transactions.save_snapshot(name, existing_records)?;
            self.core.transactions.add_operation(Operation::Write { table: name.to_string(), data: data.clone(), mode })?;
            let total_after_write = match mode {
                WriteMode::Overwrite => data.len(),
                WriteMode::Append => existing + data.len(),
            };
            return Ok(WriteResult { written: data.len(), total_after_write, chunked: false });
        }
        self.core.write_now(name, data, mode)
    }

    /// Read `table` through the filter/sort/paginate pipeline; `[]` if absent.
    pub fn read(&self, name: &str, options: ReadOptions) -> Result<Vec<Value>> {
        self.core.read_now(name, &options)
    }

    /// Catalog record count, with opportunistic drift verification.
    pub fn count(&self, name: &str) -> Result<usize> {
        self.core.count_now(name, false)
    }

    /// Eagerly verify (and repair) the catalog count against actual data.
    pub fn verify_count(&self, name: &str) -> Result<usize> {
        self.core.count_now(name, true)
    }

    /// First matching record, or `None`.
    pub fn find_one(&self, name: &str, filter: Option<Value>) -> Result<Option<Value>> {
        let mut options = ReadOptions { filter, ..ReadOptions::default() };
        options.query.limit = Some(1);
        Ok(self.read(name, options)?.into_iter().next())
    }

    /// Every matching record.
    pub fn find_many(&self, name: &str, filter: Option<Value>, query: QueryOptions) -> Result<Vec<Value>> {
        self.read(name, ReadOptions { filter, query, bypass_cache: false })
    }

    /// Delete matching records, returning how many were removed.
    pub fn delete(&self, name: &str, where_filter: Value) -> Result<usize> {
        if self.core.transactions.is_active() {
            let meta = self.require_table(name)?;
            let existing_records = self.core.read_all(&meta);
            self.core.transactions.save_snapshot(name, existing_records.clone())?;
            self.core.transactions.add_operation(Operation::Delete { table: name.to_string(), filter: where_filter.clone() })?;
            let filter = Filter::parse(&where_filter).map_err(Error::invalid_input)?;
            return Ok(existing_records.iter().filter(|r| filter.matches(r)).count());
        }
        self.core.delete_now(name, &where_filter)
    }

    /// Apply a batch of inserts/updates/deletes keyed by `id`.
    pub fn bulk_write(&self, name: &str, operations: Vec<BulkOperation>) -> Result<WriteResult> {
        if self.core.transactions.is_active() {
            let meta = self.require_table(name)?;
            let existing_records = self.core.read_all(&meta);
            self.core.transactions.save_snapshot(name, existing_records.clone())?;
            let raw: Vec<Value> = operations.iter().map(bulk_operation_to_value).collect();
            self.core.transactions.add_operation(Operation::BulkWrite { table: name.to_string(), operations: raw })?;
            return Ok(WriteResult { written: operations.len(), total_after_write: existing_records.len(), chunked: meta.mode == TableMode::Chunked });
        }
        self.core.bulk_write_now(name, &operations)
    }

    /// Convert a `single` table into `chunked` layout via a verified temp table.
    pub fn migrate_to_chunked(&self, name: &str) -> Result<()> {
        let meta = self.require_table(name)?;
        let records = self.core.read_all(&meta);
        let source_count = records.len();

        let temp_name = format!("{name}_temp_{}", now_ms());
        self.core.create_table_now(
            &temp_name,
            &CreateTableOptions { mode: Some(TableMode::Chunked), initial_data: records.clone(), columns: meta.columns.clone() },
        )?;
        let temp_count = self.count(&temp_name)?;
        if temp_count != source_count {
            self.core.delete_table_now(&temp_name)?;
            return Err(Error::DataIncomplete { expected: source_count, actual: temp_count });
        }

        self.core.delete_table_now(name)?;

        let recreate = self.core.create_table_now(
            name,
            &CreateTableOptions { mode: Some(TableMode::Chunked), initial_data: records.clone(), columns: meta.columns.clone() },
        );
        if let Err(e) = recreate {
            warn!(table = name, error = %e, "migration failed after source deletion, temp table retained for recovery");
            return Err(e);
        }
        let final_count = self.count(name)?;
        if final_count != source_count {
            return Err(Error::DataIncomplete { expected: source_count, actual: final_count });
        }

        self.core.delete_table_now(&temp_name)?;
        Ok(())
    }

    /// Open a transaction. Fails if one is already active.
    pub fn begin_transaction(&self) -> Result<()> {
        self.core.transactions.begin()
    }

    /// Replay every buffered operation and return to `Idle`.
    pub fn commit(&self) -> Result<()> {
        let core = Arc::clone(&self.core);
        let core_delete = Arc::clone(&self.core);
        let core_bulk = Arc::clone(&self.core);
        self.core.transactions.commit(
            move |table, data, mode| core.write_now(table, data.to_vec(), mode).map(|_| ()),
            move |table, filter| core_delete.delete_now(table, filter).map(|_| ()),
            move |table, raw_ops| {
                let ops: Vec<BulkOperation> = raw_ops.iter().map(bulk_operation_from_value).collect::<Result<_>>()?;
                core_bulk.bulk_write_now(table, &ops).map(|_| ())
            },
        )
    }

    /// Restore every snapshotted table and return to `Idle`.
    pub fn rollback(&self) -> Result<()> {
        let core = Arc::clone(&self.core);
        self.core.transactions.rollback(move |table, records| {
            let Some(meta) = core.catalog.get(table) else { return Ok(()) };
            core.write_full(&meta, records)?;
            core.rebuild_indexes(table, records)?;
            let count = records.len();
            core.catalog.update(table, meta.mode, move |m| m.count = count);
            core.invalidate(table);
            Ok(())
        })
    }

    /// Current auto-sync statistics.
    pub fn get_sync_stats(&self) -> SyncStats {
        self.autosync.stats()
    }

    /// Force an immediate flush of dirty cache entries.
    pub fn sync_now(&self) -> Result<usize> {
        let core = Arc::clone(&self.core);
        self.autosync.sync_now(move |batch_size| core.flush_dirty(batch_size))
    }

    /// Reconfigure the auto-sync loop's threshold and cadence.
    pub fn set_auto_sync_config(&self, enabled: bool, interval_ms: u64, min_items: usize, batch_size: usize) {
        self.autosync.set_config(enabled, interval_ms, min_items, batch_size);
    }

    /// Replace a table's contents with an empty list.
    pub fn clear_table(&self, name: &str) -> Result<WriteResult> {
        self.write(name, Vec::new(), WriteMode::Overwrite)
    }

    /// Read-modify-write: merge `patch`'s fields onto every record matching
    /// `where_filter` (equality-only semantics, same parser as `delete`/`read`).
    pub fn update(&self, name: &str, patch: Value, where_filter: Value) -> Result<usize> {
        let meta = self.require_table(name)?;
        let filter = Filter::parse(&where_filter).map_err(Error::invalid_input)?;
        let Some(patch_fields) = patch.as_object().cloned() else {
            return Err(Error::invalid_input("update patch must be an object"));
        };
        let mut records = self.core.read_all(&meta);
        let mut updated = 0usize;
        for record in &mut records {
            if filter.matches(record) {
                if let Some(existing) = record.as_object_mut() {
                    for (k, v) in &patch_fields {
                        existing.insert(k.clone(), v.clone());
                    }
                    updated += 1;
                }
            }
        }
        if updated > 0 {
            let chunks_after = self.core.write_full(&meta, &records)?;
            self.core.rebuild_indexes(name, &records)?;
            let count = records.len();
            self.core.catalog.update(name, meta.mode, move |m| {
                m.count = count;
                if meta.mode == TableMode::Chunked {
                    m.chunks = Some(chunks_after);
                }
            });
            self.core.invalidate(name);
        }
        Ok(updated)
    }

    fn require_table(&self, name: &str) -> Result<TableMeta> {
        self.core.require_table(name)
    }
}

fn name_from_fields(fields: &[String], kind: IndexKind) -> String {
    litestore_storage::index::index_name(fields, kind)
}

trait RecordIdFromField {
    fn record_id_from_field(&self) -> Option<RecordId>;
}

impl RecordIdFromField for Value {
    fn record_id_from_field(&self) -> Option<RecordId> {
        match self {
            Value::Int(n) => Some(RecordId::Int(*n)),
            Value::String(s) => Some(RecordId::Str(s.clone())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn engine() -> (StorageEngine, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let engine = StorageEngine::open(dir.path().to_path_buf(), EngineConfig::default()).unwrap();
        (engine, dir)
    }

    fn rec(id: i64, name: &str, age: i64, active: bool) -> Value {
        Value::Object(BTreeMap::from([
            ("id".to_string(), Value::Int(id)),
            ("name".to_string(), Value::String(name.to_string())),
            ("age".to_string(), Value::Int(age)),
            ("active".to_string(), Value::Bool(active)),
        ]))
    }

    #[test]
    fn basic_crud_round_trips() {
        let (engine, _dir) = engine();
        engine.create_table("users", CreateTableOptions::default()).unwrap();
        engine
            .write("users", vec![rec(1, "A", 25, true), rec(2, "B", 30, false), rec(3, "C", 35, true)], WriteMode::Append)
            .unwrap();

        let active = engine
            .find_many("users", Some(Value::Object(BTreeMap::from([("active".to_string(), Value::Bool(true))]))), QueryOptions::default())
            .unwrap();
        assert_eq!(active.len(), 2);

        let dropped = engine.delete("users", Value::Object(BTreeMap::from([("id".to_string(), Value::Int(2))]))).unwrap();
        assert_eq!(dropped, 1);
        assert_eq!(engine.count("users").unwrap(), 2);
    }

    #[test]
    fn create_table_is_idempotent() {
        let (engine, _dir) = engine();
        engine.create_table("users", CreateTableOptions { initial_data: vec![rec(1, "A", 1, true)], ..Default::default() }).unwrap();
        engine.create_table("users", CreateTableOptions { initial_data: vec![rec(2, "B", 2, true)], ..Default::default() }).unwrap();
        assert_eq!(engine.count("users").unwrap(), 1);
    }

    #[test]
    fn transaction_rollback_restores_prior_state() {
        let (engine, _dir) = engine();
        engine.create_table("users", CreateTableOptions::default()).unwrap();
        engine.write("users", vec![rec(1, "A", 25, true), rec(2, "B", 30, false)], WriteMode::Append).unwrap();

        engine.begin_transaction().unwrap();
        engine.delete("users", Value::Object(BTreeMap::from([("id".to_string(), Value::Int(2))]))).unwrap();
        engine.rollback().unwrap();

        let all = engine.find_many("users", None, QueryOptions::default()).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn bulk_write_upserts_and_deletes() {
        let (engine, _dir) = engine();
        engine.create_table("users", CreateTableOptions { initial_data: vec![rec(1, "A", 25, true)], ..Default::default() }).unwrap();

        let result = engine
            .bulk_write(
                "users",
                vec![
                    BulkOperation::Update(Value::Object(BTreeMap::from([("id".to_string(), Value::Int(1)), ("age".to_string(), Value::Int(99))]))),
                    BulkOperation::Insert(rec(2, "B", 2, true)),
                ],
            )
            .unwrap();
        assert_eq!(result.total_after_write, 2);

        let first = engine.find_one("users", Some(Value::Object(BTreeMap::from([("id".to_string(), Value::Int(1))])))).unwrap().unwrap();
        assert_eq!(first.get_path("age").unwrap().as_f64(), Some(99.0));
    }

    #[test]
    fn delete_table_is_idempotent_and_invalidates_cache() {
        let (engine, _dir) = engine();
        engine.create_table("users", CreateTableOptions::default()).unwrap();
        engine.delete_table("users").unwrap();
        engine.delete_table("users").unwrap();
        assert!(!engine.has_table("users"));
    }

    #[test]
    fn migrate_to_chunked_preserves_record_count() {
        let (engine, _dir) = engine();
        let records: Vec<Value> = (0..50).map(|i| rec(i, "x", i, true)).collect();
        engine.create_table("m", CreateTableOptions { mode: Some(TableMode::Single), initial_data: records.clone(), ..Default::default() }).unwrap();
        engine.migrate_to_chunked("m").unwrap();
        assert_eq!(engine.verify_count("m").unwrap(), 50);
        let meta = engine.require_table("m").unwrap();
        assert_eq!(meta.mode, TableMode::Chunked);
    }

    #[test]
    fn write_marks_cache_dirty_and_sync_now_drains_it() {
        let (engine, _dir) = engine();
        engine.create_table("users", CreateTableOptions::default()).unwrap();
        engine.write("users", vec![rec(1, "A", 25, true)], WriteMode::Append).unwrap();
        assert!(engine.core.dirty_count() > 0);
        let synced = engine.sync_now().unwrap();
        assert!(synced > 0);
        assert!(engine.core.dirty_count() == 0);
        assert_eq!(engine.get_sync_stats().total_items_synced, synced as u64);
    }

    #[test]
    fn read_after_write_sees_fresh_data_even_with_underscore_in_table_name() {
        let (engine, _dir) = engine();
        engine.create_table("User_1", CreateTableOptions::default()).unwrap();
        engine.write("User_1", vec![rec(1, "A", 25, true)], WriteMode::Overwrite).unwrap();
        let first = engine.find_many("User_1", None, QueryOptions::default()).unwrap();
        assert_eq!(first.len(), 1);

        engine.write("User_1", vec![rec(2, "B", 30, true)], WriteMode::Overwrite).unwrap();
        let second = engine.find_many("User_1", None, QueryOptions::default()).unwrap();
        assert_eq!(second, vec![rec(2, "B", 30, true)]);
    }

    #[test]
    fn update_merges_patch_onto_matching_records() {
        let (engine, _dir) = engine();
        engine.create_table("users", CreateTableOptions { initial_data: vec![rec(1, "A", 25, true), rec(2, "B", 30, true)], ..Default::default() }).unwrap();
        let updated = engine
            .update(
                "users",
                Value::Object(BTreeMap::from([("active".to_string(), Value::Bool(false))])),
                Value::Object(BTreeMap::from([("id".to_string(), Value::Int(1))])),
            )
            .unwrap();
        assert_eq!(updated, 1);
        let record = engine.find_one("users", Some(Value::Object(BTreeMap::from([("id".to_string(), Value::Int(1))])))).unwrap().unwrap();
        assert_eq!(record.get_path("active"), Some(&Value::Bool(false)));
    }
}
