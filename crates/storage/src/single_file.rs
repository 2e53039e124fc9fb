//! Whole-table single-file storage: one `<table>.ldb` file holding the
//! entire record list, always rewritten in full.

use crate::backend::FileBackend;
use crate::codec::{EncryptionCodec, IntegrityCodec};
use litestore_core::error::{Error, Result};
use litestore_core::value::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Reads and writes a single `.ldb` file as a JSON array of records, wrapped
/// in an integrity envelope and, optionally, an authenticated encryption
/// envelope.
pub struct SingleFileHandler {
    backend: Arc<dyn FileBackend>,
    encryption: Arc<dyn EncryptionCodec>,
    integrity: IntegrityCodec,
    path: PathBuf,
}

impl SingleFileHandler {
    /// Build a handler for the file at `path`.
    pub fn new(
        backend: Arc<dyn FileBackend>,
        encryption: Arc<dyn EncryptionCodec>,
        path: PathBuf,
    ) -> Self {
        SingleFileHandler { backend, encryption, integrity: IntegrityCodec, path }
    }

    /// Read all records. Returns an empty list if the file is absent or
    /// fails integrity/decryption verification (logged, never an error).
    pub fn read(&self) -> Vec<Value> {
        if !self.backend.exists(&self.path) {
            return Vec::new();
        }
        let bytes = match self.backend.read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read table file");
                return Vec::new();
            }
        };
        let plaintext = match self.encryption.decrypt(&bytes) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "table file failed decryption, treating as empty");
                return Vec::new();
            }
        };
        match self.integrity.decode(&plaintext) {
            Ok(value) => value.as_array().map(<[Value]>::to_vec).unwrap_or_default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "table file failed integrity check, treating as empty");
                Vec::new()
            }
        }
    }

    /// Encode and atomically write the full record list, replacing any
    /// existing content.
    pub fn write(&self, records: &[Value]) -> Result<()> {
        let data = Value::Array(records.to_vec());
        let plaintext = self.integrity.encode(&data);
        let bytes = self.encryption.encrypt(&plaintext)?;
        self.backend.write_atomic(&self.path, &bytes)
    }

    /// Delete the file, idempotently.
    pub fn delete(&self) -> Result<()> {
        match self.backend.delete(&self.path) {
            Ok(()) => Ok(()),
            Err(Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalFileBackend;
    use crate::codec::NoopEncryption;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn handler(path: PathBuf) -> SingleFileHandler {
        SingleFileHandler::new(Arc::new(LocalFileBackend::default()), Arc::new(NoopEncryption), path)
    }

    fn record(id: i64) -> Value {
        Value::Object(BTreeMap::from([("id".to_string(), Value::Int(id))]))
    }

    #[test]
    fn read_of_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let h = handler(dir.path().join("t.ldb"));
        assert_eq!(h.read(), Vec::new());
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let h = handler(dir.path().join("t.ldb"));
        let records = vec![record(1), record(2)];
        h.write(&records).unwrap();
        assert_eq!(h.read(), records);
    }

    #[test]
    fn write_overwrites_previous_contents() {
        let dir = tempdir().unwrap();
        let h = handler(dir.path().join("t.ldb"));
        h.write(&[record(1), record(2)]).unwrap();
        h.write(&[record(3)]).unwrap();
        assert_eq!(h.read(), vec![record(3)]);
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.ldb");
        let h = handler(path.clone());
        LocalFileBackend::default().write_atomic(&path, b"not an envelope").unwrap();
        assert_eq!(h.read(), Vec::new());
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let h = handler(dir.path().join("t.ldb"));
        h.write(&[record(1)]).unwrap();
        h.delete().unwrap();
        assert!(h.read().is_empty());
        h.delete().unwrap();
    }
}
