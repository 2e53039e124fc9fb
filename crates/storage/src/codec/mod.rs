//! On-disk envelopes: content-addressed integrity and optional authenticated
//! encryption, layered on top of the raw JSON a table stores.

pub mod encryption;
pub mod integrity;

pub use encryption::{EncryptionCodec, EncryptionKey, NoopEncryption, AesCtrHmacEncryption};
pub use integrity::IntegrityCodec;
