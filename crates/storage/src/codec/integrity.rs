//! Content-addressed integrity envelope.
//!
//! Every file litestore writes is wrapped as `{"data": <value>, "hash":
//! <sha256 hex>}`, where `hash` is the SHA-256 of `data`'s canonical JSON
//! serialization. On read, the hash is recomputed and compared; a mismatch
//! is surfaced as `Error::Corrupt` rather than silently trusted, the same
//! seam the teacher crate reserves for its codec layer (see
//! `codec::traits::StorageCodec`) even though that trait itself carries no
//! integrity check of its own.

use litestore_core::error::{Error, Result};
use litestore_core::value::Value;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    data: Value,
    hash: String,
}

/// Wraps a `Value` payload in a SHA-256 integrity envelope and verifies it
/// back out again on read.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntegrityCodec;

impl IntegrityCodec {
    /// Compute the envelope's hash field for a given payload.
    fn hash_of(data: &Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.canonical_json().as_bytes());
        hex_encode(&hasher.finalize())
    }

    /// Wrap `data` in an integrity envelope and serialize it to bytes.
    pub fn encode(&self, data: &Value) -> Vec<u8> {
        let envelope = Envelope { data: data.clone(), hash: Self::hash_of(data) };
        serde_json::to_vec(&envelope).expect("envelope serialization is infallible")
    }

    /// Parse and verify an integrity envelope, returning the inner payload.
    ///
    /// # Errors
    ///
    /// `Error::Corrupt` if the bytes are not a well-formed envelope, or if
    /// the stored hash does not match the recomputed hash of `data`.
    pub fn decode(&self, bytes: &[u8]) -> Result<Value> {
        let envelope: Envelope = serde_json::from_slice(bytes)
            .map_err(|e| Error::corrupt(format!("malformed integrity envelope: {e}")))?;
        let expected = Self::hash_of(&envelope.data);
        if expected != envelope.hash {
            return Err(Error::corrupt(format!(
                "integrity hash mismatch: expected {expected}, stored {}",
                envelope.hash
            )));
        }
        Ok(envelope.data)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample() -> Value {
        Value::Object(BTreeMap::from([
            ("id".to_string(), Value::Int(1)),
            ("name".to_string(), Value::String("Ada".to_string())),
        ]))
    }

    #[test]
    fn encode_then_decode_round_trips() {
        let codec = IntegrityCodec;
        let data = sample();
        let bytes = codec.encode(&data);
        assert_eq!(codec.decode(&bytes).unwrap(), data);
    }

    #[test]
    fn tampered_hash_is_rejected() {
        let codec = IntegrityCodec;
        let bytes = codec.encode(&sample());
        let mut envelope: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        envelope["data"]["name"] = serde_json::json!("Eve");
        let tampered = serde_json::to_vec(&envelope).unwrap();
        let err = codec.decode(&tampered).unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn malformed_bytes_are_corrupt_not_panic() {
        let codec = IntegrityCodec;
        let err = codec.decode(b"not json at all").unwrap_err();
        assert!(err.is_corrupt());
    }
}
