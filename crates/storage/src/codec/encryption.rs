//! Optional authenticated encryption at rest.
//!
//! Ciphertext layout is AES-128-CTR for confidentiality plus an
//! HMAC-SHA256 tag over the ciphertext for authenticity (encrypt-then-MAC),
//! with the symmetric key derived from a passphrase via PBKDF2-HMAC-SHA256.
//! The whole envelope — salt, IV, ciphertext, MAC — is JSON-then-base64
//! encoded so it layers transparently underneath `IntegrityCodec`.

use aes::cipher::{KeyIvInit, StreamCipher};
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use litestore_core::error::{Error, Result};
use litestore_core::limits::MIN_PBKDF2_ITERATIONS;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type Aes128Ctr = ctr::Ctr64BE<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

const SALT_LEN: usize = 16;
const IV_LEN: usize = 16;
const KEY_LEN: usize = 16;

/// A derived symmetric key plus the MAC key used alongside it. Both are
/// derived from the same passphrase+salt via a single PBKDF2 pass over a
/// doubled output length, then split.
#[derive(Clone)]
pub struct EncryptionKey {
    cipher_key: [u8; KEY_LEN],
    mac_key: [u8; KEY_LEN],
}

impl EncryptionKey {
    /// Derive a key pair from a passphrase and salt using PBKDF2-HMAC-SHA256.
    ///
    /// `iterations` is clamped up to `MIN_PBKDF2_ITERATIONS` if lower.
    pub fn derive(passphrase: &str, salt: &[u8], iterations: u32) -> Self {
        let iterations = iterations.max(MIN_PBKDF2_ITERATIONS);
        let mut material = [0u8; KEY_LEN * 2];
        pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, iterations, &mut material);
        let mut cipher_key = [0u8; KEY_LEN];
        let mut mac_key = [0u8; KEY_LEN];
        cipher_key.copy_from_slice(&material[..KEY_LEN]);
        mac_key.copy_from_slice(&material[KEY_LEN..]);
        EncryptionKey { cipher_key, mac_key }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CipherEnvelope {
    salt: String,
    iv: String,
    ciphertext: String,
    mac: String,
}

/// A pluggable encryption codec for bytes already wrapped by `IntegrityCodec`.
pub trait EncryptionCodec: Send + Sync {
    /// Encrypt `plaintext`, returning an opaque encoded blob.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt a blob produced by `encrypt`.
    fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>>;
}

/// The no-op codec used when a table has no encryption configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEncryption;

impl EncryptionCodec for NoopEncryption {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>> {
        Ok(blob.to_vec())
    }
}

/// AES-128-CTR + HMAC-SHA256 authenticated encryption, keyed by a
/// passphrase-derived `EncryptionKey`. Each `encrypt` call generates a fresh
/// random salt and IV, so repeated encryption of identical plaintext never
/// produces identical blobs.
pub struct AesCtrHmacEncryption {
    passphrase: String,
    iterations: u32,
}

impl AesCtrHmacEncryption {
    /// Build a codec that derives a fresh key (with a fresh salt) on every
    /// call from `passphrase`.
    pub fn new(passphrase: impl Into<String>, iterations: u32) -> Self {
        AesCtrHmacEncryption { passphrase: passphrase.into(), iterations }
    }
}

impl EncryptionCodec for AesCtrHmacEncryption {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        rand::thread_rng().fill_bytes(&mut iv);

        let key = EncryptionKey::derive(&self.passphrase, &salt, self.iterations);

        let mut ciphertext = plaintext.to_vec();
        let mut cipher = Aes128Ctr::new((&key.cipher_key).into(), (&iv).into());
        cipher.apply_keystream(&mut ciphertext);

        let mut mac = HmacSha256::new_from_slice(&key.mac_key)
            .expect("HMAC accepts any key length");
        mac.update(&ciphertext);
        let tag = mac.finalize().into_bytes();

        let envelope = CipherEnvelope {
            salt: STANDARD.encode(salt),
            iv: STANDARD.encode(iv),
            ciphertext: STANDARD.encode(&ciphertext),
            mac: STANDARD.encode(tag),
        };
        let json = serde_json::to_vec(&envelope).expect("envelope serialization is infallible");
        Ok(STANDARD.encode(json).into_bytes())
    }

    fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>> {
        let json = STANDARD
            .decode(blob)
            .map_err(|e| Error::corrupt(format!("malformed base64 envelope: {e}")))?;
        let envelope: CipherEnvelope = serde_json::from_slice(&json)
            .map_err(|e| Error::corrupt(format!("malformed cipher envelope: {e}")))?;

        let salt = STANDARD
            .decode(&envelope.salt)
            .map_err(|e| Error::corrupt(format!("malformed salt: {e}")))?;
        let iv = STANDARD
            .decode(&envelope.iv)
            .map_err(|e| Error::corrupt(format!("malformed iv: {e}")))?;
        let mut ciphertext = STANDARD
            .decode(&envelope.ciphertext)
            .map_err(|e| Error::corrupt(format!("malformed ciphertext: {e}")))?;
        let tag = STANDARD
            .decode(&envelope.mac)
            .map_err(|e| Error::corrupt(format!("malformed mac: {e}")))?;

        let key = EncryptionKey::derive(&self.passphrase, &salt, self.iterations);

        let mut mac = HmacSha256::new_from_slice(&key.mac_key)
            .expect("HMAC accepts any key length");
        mac.update(&ciphertext);
        mac.verify_slice(&tag)
            .map_err(|_| Error::corrupt("authentication tag mismatch".to_string()))?;

        let iv: [u8; IV_LEN] = iv
            .try_into()
            .map_err(|_| Error::corrupt("iv has wrong length".to_string()))?;
        let mut cipher = Aes128Ctr::new((&key.cipher_key).into(), (&iv).into());
        cipher.apply_keystream(&mut ciphertext);
        Ok(ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_codec_passes_bytes_through() {
        let codec = NoopEncryption;
        let data = b"plain bytes";
        assert_eq!(codec.encrypt(data).unwrap(), data);
        assert_eq!(codec.decrypt(data).unwrap(), data);
    }

    #[test]
    fn aes_ctr_hmac_round_trips() {
        let codec = AesCtrHmacEncryption::new("correct horse battery staple", 100_000);
        let plaintext = b"{\"id\":1,\"name\":\"Ada\"}";
        let blob = codec.encrypt(plaintext).unwrap();
        assert_eq!(codec.decrypt(&blob).unwrap(), plaintext);
    }

    #[test]
    fn two_encryptions_of_same_plaintext_differ() {
        let codec = AesCtrHmacEncryption::new("pw", 100_000);
        let a = codec.encrypt(b"same input").unwrap();
        let b = codec.encrypt(b"same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_ciphertext_fails_mac_check() {
        let codec = AesCtrHmacEncryption::new("pw", 100_000);
        let blob = codec.encrypt(b"payload").unwrap();
        let json_bytes = STANDARD.decode(&blob).unwrap();
        let mut envelope: serde_json::Value = serde_json::from_slice(&json_bytes).unwrap();
        let mut ct = STANDARD
            .decode(envelope["ciphertext"].as_str().unwrap())
            .unwrap();
        ct[0] ^= 0xFF;
        envelope["ciphertext"] = serde_json::json!(STANDARD.encode(ct));
        let tampered = STANDARD.encode(serde_json::to_vec(&envelope).unwrap());
        let err = codec.decrypt(tampered.as_bytes()).unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn wrong_passphrase_fails_to_decrypt() {
        let encoder = AesCtrHmacEncryption::new("right-password", 100_000);
        let decoder = AesCtrHmacEncryption::new("wrong-password", 100_000);
        let blob = encoder.encrypt(b"secret").unwrap();
        assert!(decoder.decrypt(&blob).is_err());
    }
}
