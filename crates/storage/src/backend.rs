//! Filesystem access behind a trait, so tests can swap in an in-memory
//! backend without touching disk.
//!
//! `LocalFileBackend` follows the write-fsync-rename pattern used by the
//! teacher crate's snapshot writer: every write lands in a sibling temp
//! file first, is fsynced, then atomically renamed into place, so a crash
//! mid-write never leaves a partially-written file visible under the real
//! name.
//!
//! Every operation races a dedicated worker thread against `recv_timeout`,
//! the same deadline-racing approach the teacher uses for its background
//! WAL flush: the real work can't be cancelled mid-syscall, so a timeout
//! abandons waiting on it (the worker thread finishes on its own) rather
//! than pretending to cancel it.

use litestore_core::error::{Error, Result};
use litestore_core::limits::DEFAULT_IO_TIMEOUT_MS;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use tracing::warn;

/// Run `f` on a worker thread, failing with `Error::timeout` if it hasn't
/// finished within `timeout_ms`. The worker thread is not aborted on
/// timeout — filesystem syscalls aren't cancellable — it simply stops being
/// waited on.
fn run_with_deadline<T: Send + 'static>(
    timeout_ms: u64,
    operation: &'static str,
    f: impl FnOnce() -> Result<T> + Send + 'static,
) -> Result<T> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(f());
    });
    match rx.recv_timeout(Duration::from_millis(timeout_ms)) {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(operation, timeout_ms)),
    }
}

/// Same as `run_with_deadline`, but for a predicate that has no `Result` to
/// carry a timeout through; a timed-out check logs and reports `false`.
fn bool_with_deadline(timeout_ms: u64, operation: &'static str, f: impl FnOnce() -> bool + Send + 'static) -> bool {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(f());
    });
    match rx.recv_timeout(Duration::from_millis(timeout_ms)) {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, timeout_ms, "filesystem check exceeded deadline, treating as false");
            false
        }
    }
}

/// Metadata about a stored file, as returned by `FileBackend::stat`.
#[derive(Debug, Clone, Copy)]
pub struct FileStat {
    /// Size of the file in bytes.
    pub len: u64,
}

/// Storage backend abstraction: everything the engine needs from a
/// filesystem, narrowed to what litestore actually uses.
pub trait FileBackend: Send + Sync {
    /// Atomically write `contents` to `path`, replacing any existing file.
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()>;

    /// Read the full contents of `path`. Returns `Error::NotFound` if absent.
    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Whether a file exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Stat a file, if it exists.
    fn stat(&self, path: &Path) -> Result<FileStat>;

    /// List entries directly inside `dir`, file names only (no subdirectories).
    fn list_dir(&self, dir: &Path) -> Result<Vec<String>>;

    /// Create `dir` and any missing parent directories.
    fn make_dir(&self, dir: &Path) -> Result<()>;

    /// Delete the file at `path`, if present. Not an error if already absent.
    fn delete(&self, path: &Path) -> Result<()>;

    /// Whether `dir` exists and is a directory.
    fn exists_dir(&self, dir: &Path) -> bool;

    /// Recursively delete `dir` and everything under it. Not an error if
    /// already absent.
    fn remove_dir_all(&self, dir: &Path) -> Result<()>;
}

/// A `FileBackend` backed by the real filesystem. Every operation fails
/// with `Error::Timeout` if it exceeds `timeout_ms`.
#[derive(Debug, Clone, Copy)]
pub struct LocalFileBackend {
    timeout_ms: u64,
}

impl Default for LocalFileBackend {
    fn default() -> Self {
        LocalFileBackend { timeout_ms: DEFAULT_IO_TIMEOUT_MS }
    }
}

impl LocalFileBackend {
    /// Build a backend whose operations are bounded by `timeout_ms`.
    pub fn new(timeout_ms: u64) -> Self {
        LocalFileBackend { timeout_ms }
    }
}

fn write_atomic_now(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = sibling_temp_path(path);

    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&temp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;

    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

fn read_now(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::not_found(path.display().to_string())
        } else {
            Error::Io(e)
        }
    })
}

fn stat_now(path: &Path) -> Result<FileStat> {
    let meta = fs::metadata(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::not_found(path.display().to_string())
        } else {
            Error::Io(e)
        }
    })?;
    Ok(FileStat { len: meta.len() })
}

fn list_dir_now(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

fn delete_now(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}

fn remove_dir_all_now(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}

impl FileBackend for LocalFileBackend {
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let path = path.to_path_buf();
        let contents = contents.to_vec();
        run_with_deadline(self.timeout_ms, "write_atomic", move || write_atomic_now(&path, &contents))
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = path.to_path_buf();
        run_with_deadline(self.timeout_ms, "read", move || read_now(&path))
    }

    fn exists(&self, path: &Path) -> bool {
        let path = path.to_path_buf();
        bool_with_deadline(self.timeout_ms, "exists", move || path.is_file())
    }

    fn stat(&self, path: &Path) -> Result<FileStat> {
        let path = path.to_path_buf();
        run_with_deadline(self.timeout_ms, "stat", move || stat_now(&path))
    }

    fn list_dir(&self, dir: &Path) -> Result<Vec<String>> {
        let dir = dir.to_path_buf();
        run_with_deadline(self.timeout_ms, "list_dir", move || list_dir_now(&dir))
    }

    fn make_dir(&self, dir: &Path) -> Result<()> {
        let dir = dir.to_path_buf();
        run_with_deadline(self.timeout_ms, "make_dir", move || {
            fs::create_dir_all(&dir)?;
            Ok(())
        })
    }

    fn delete(&self, path: &Path) -> Result<()> {
        let path = path.to_path_buf();
        run_with_deadline(self.timeout_ms, "delete", move || delete_now(&path))
    }

    fn exists_dir(&self, dir: &Path) -> bool {
        let dir = dir.to_path_buf();
        bool_with_deadline(self.timeout_ms, "exists_dir", move || dir.is_dir())
    }

    fn remove_dir_all(&self, dir: &Path) -> Result<()> {
        let dir = dir.to_path_buf();
        run_with_deadline(self.timeout_ms, "remove_dir_all", move || remove_dir_all_now(&dir))
    }
}

fn sibling_temp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("tmp");
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_name = format!(".{file_name}.{pid}.{nonce}.tmp");
    path.with_file_name(temp_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a/b.dat");
        let backend = LocalFileBackend::default();
        backend.write_atomic(&path, b"hello").unwrap();
        assert_eq!(backend.read(&path).unwrap(), b"hello");
        assert!(backend.exists(&path));
        assert_eq!(backend.stat(&path).unwrap().len, 5);
    }

    #[test]
    fn write_atomic_replaces_existing_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.dat");
        let backend = LocalFileBackend::default();
        backend.write_atomic(&path, b"first").unwrap();
        backend.write_atomic(&path, b"second-longer").unwrap();
        assert_eq!(backend.read(&path).unwrap(), b"second-longer");
    }

    #[test]
    fn read_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let backend = LocalFileBackend::default();
        let err = backend.read(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn list_dir_returns_sorted_file_names() {
        let dir = tempdir().unwrap();
        let backend = LocalFileBackend::default();
        backend.write_atomic(&dir.path().join("000002.ldb"), b"b").unwrap();
        backend.write_atomic(&dir.path().join("000001.ldb"), b"a").unwrap();
        assert_eq!(
            backend.list_dir(dir.path()).unwrap(),
            vec!["000001.ldb".to_string(), "000002.ldb".to_string()]
        );
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.dat");
        let backend = LocalFileBackend::default();
        backend.write_atomic(&path, b"x").unwrap();
        backend.delete(&path).unwrap();
        assert!(!backend.exists(&path));
        backend.delete(&path).unwrap();
    }

    #[test]
    fn run_with_deadline_times_out_on_slow_work() {
        let err = run_with_deadline(10, "sleep", || {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[test]
    fn run_with_deadline_passes_through_fast_work() {
        let value = run_with_deadline(1000, "noop", || Ok(42)).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn bool_with_deadline_reports_false_on_timeout() {
        let result = bool_with_deadline(10, "sleep", || {
            std::thread::sleep(Duration::from_millis(200));
            true
        });
        assert!(!result);
    }
}
