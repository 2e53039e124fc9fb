//! Background dirty-cache flush loop.
//!
//! A dedicated `std::thread` ticks on an interval, the same pattern the
//! catalog's debounce worker uses, rather than a tokio interval (see the
//! concurrency-model note in this workspace's expanded requirements doc).
//! Re-entrancy between a tick and a manual `sync_now` is forbidden via a
//! single `AtomicBool` guard.

use litestore_core::error::Result;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::warn;

/// Cumulative and most-recent statistics about background flush activity.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of ticks (or manual syncs) that performed a flush.
    pub sync_count: u64,
    /// Total dirty entries flushed across every sync.
    pub total_items_synced: u64,
    /// Wall-clock milliseconds since the epoch of the last flush, if any.
    pub last_sync_time: Option<i64>,
    /// Exponentially smoothed average flush duration, in milliseconds.
    pub avg_sync_time_ms: f64,
}

const SMOOTHING_FACTOR: f64 = 0.2;

struct SharedState {
    enabled: AtomicBool,
    interval_ms: AtomicU64,
    min_items: AtomicUsize,
    batch_size: AtomicUsize,
    is_syncing: AtomicBool,
    shutdown: AtomicBool,
    stats: Mutex<SyncStats>,
}

/// Periodically flushes dirty cache entries back to storage in batches.
pub struct AutoSyncService {
    shared: Arc<SharedState>,
    worker: Option<JoinHandle<()>>,
}

impl AutoSyncService {
    /// Build and start the background loop.
    ///
    /// `dirty_count` reports the current number of dirty cache entries (a
    /// cheap peek, no flushing). `flush` performs the actual write-back for
    /// up to `batch_size` entries and returns how many it actually synced;
    /// it is called from the single background thread, or from `sync_now`,
    /// never both at once.
    pub fn new(
        enabled: bool,
        interval_ms: u64,
        min_items: usize,
        batch_size: usize,
        dirty_count: impl Fn() -> usize + Send + Sync + 'static,
        flush: impl Fn(usize) -> Result<usize> + Send + Sync + 'static,
    ) -> Self {
        let shared = Arc::new(SharedState {
            enabled: AtomicBool::new(enabled),
            interval_ms: AtomicU64::new(interval_ms.max(1)),
            min_items: AtomicUsize::new(min_items),
            batch_size: AtomicUsize::new(batch_size),
            is_syncing: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            stats: Mutex::new(SyncStats::default()),
        });

        let worker = {
            let shared = Arc::clone(&shared);
            Some(std::thread::spawn(move || run_loop(shared, dirty_count, flush)))
        };

        AutoSyncService { shared, worker }
    }

    /// Force an immediate flush, bypassing the `min_items` threshold and
    /// the tick interval. Still guarded against overlapping an in-progress
    /// tick.
    pub fn sync_now(&self, flush: impl FnOnce(usize) -> Result<usize>) -> Result<usize> {
        if self
            .shared
            .is_syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(0);
        }
        let batch_size = self.shared.batch_size.load(Ordering::SeqCst);
        let start = Instant::now();
        let result = flush(batch_size);
        if let Ok(count) = &result {
            record_sync(&self.shared.stats, *count, start.elapsed());
        }
        self.shared.is_syncing.store(false, Ordering::SeqCst);
        result
    }

    /// A copy of the current statistics.
    pub fn stats(&self) -> SyncStats {
        self.shared.stats.lock().clone()
    }

    /// Update the tick interval, min-items threshold, and batch size;
    /// takes effect starting the next tick.
    pub fn set_config(&self, enabled: bool, interval_ms: u64, min_items: usize, batch_size: usize) {
        self.shared.enabled.store(enabled, Ordering::SeqCst);
        self.shared.interval_ms.store(interval_ms.max(1), Ordering::SeqCst);
        self.shared.min_items.store(min_items, Ordering::SeqCst);
        self.shared.batch_size.store(batch_size, Ordering::SeqCst);
    }
}

impl Drop for AutoSyncService {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_loop(
    shared: Arc<SharedState>,
    dirty_count: impl Fn() -> usize,
    flush: impl Fn(usize) -> Result<usize>,
) {
    loop {
        let interval = Duration::from_millis(shared.interval_ms.load(Ordering::SeqCst));
        std::thread::sleep(interval);
        if shared.shutdown.load(Ordering::SeqCst) {
            return;
        }
        if !shared.enabled.load(Ordering::SeqCst) {
            continue;
        }
        if shared
            .is_syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            continue;
        }
        let min_items = shared.min_items.load(Ordering::SeqCst);
        if dirty_count() >= min_items.max(1) {
            let batch_size = shared.batch_size.load(Ordering::SeqCst);
            let start = Instant::now();
            match flush(batch_size) {
                Ok(count) => record_sync(&shared.stats, count, start.elapsed()),
                Err(e) => warn!(error = %e, "auto-sync tick failed"),
            }
        }
        shared.is_syncing.store(false, Ordering::SeqCst);
    }
}

fn record_sync(stats: &Mutex<SyncStats>, items: usize, elapsed: Duration) {
    let mut stats = stats.lock();
    stats.sync_count += 1;
    stats.total_items_synced += items as u64;
    stats.last_sync_time = Some(now_ms());
    let sample_ms = elapsed.as_secs_f64() * 1000.0;
    stats.avg_sync_time_ms = if stats.sync_count == 1 {
        sample_ms
    } else {
        SMOOTHING_FACTOR * sample_ms + (1.0 - SMOOTHING_FACTOR) * stats.avg_sync_time_ms
    };
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    #[test]
    fn sync_now_flushes_and_records_stats() {
        let service = AutoSyncService::new(true, 60_000, 1, 100, || 0, |_| Ok(0));
        let synced = service.sync_now(|_batch| Ok(5)).unwrap();
        assert_eq!(synced, 5);
        let stats = service.stats();
        assert_eq!(stats.sync_count, 1);
        assert_eq!(stats.total_items_synced, 5);
        assert!(stats.last_sync_time.is_some());
    }

    #[test]
    fn sync_now_is_reentrancy_guarded() {
        let service = Arc::new(AutoSyncService::new(true, 60_000, 1, 100, || 0, |_| Ok(0)));
        let calls = Arc::new(StdAtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let service2 = Arc::clone(&service);
        service.shared.is_syncing.store(true, Ordering::SeqCst);
        let result = service2.sync_now(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        });
        assert_eq!(result.unwrap(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        service.shared.is_syncing.store(false, Ordering::SeqCst);
    }

    #[test]
    fn set_config_updates_thresholds() {
        let service = AutoSyncService::new(true, 60_000, 1, 100, || 0, |_| Ok(0));
        service.set_config(false, 1_000, 5, 50);
        assert!(!service.shared.enabled.load(Ordering::SeqCst));
        assert_eq!(service.shared.min_items.load(Ordering::SeqCst), 5);
        assert_eq!(service.shared.batch_size.load(Ordering::SeqCst), 50);
    }
}
