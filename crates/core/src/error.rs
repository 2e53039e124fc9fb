//! Error types for litestore.
//!
//! `Error` is the single error type returned by every layer (storage,
//! engine). Each variant corresponds to one of the error kinds named in
//! spec.md §7; the mapping to callers' recovery strategy lives in
//! `is_retryable`/`is_conflict` below, in the spirit of the teacher crate's
//! `StrataError::is_conflict`/`is_timeout`.

use thiserror::Error;

/// Result type alias for litestore operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all litestore operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad table name, malformed records, empty bulk operations, or an
    /// unsupported column type / filter / option shape.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description of what is wrong with the input.
        message: String,
    },

    /// A table required by the operation (e.g. migration source) does not exist.
    #[error("table not found: {name}")]
    NotFound {
        /// Name of the missing table.
        name: String,
    },

    /// A unique index collision, or an illegal transaction state transition.
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
    },

    /// Integrity or MAC mismatch, or an unparsable file. Reads recover from
    /// this by substituting empty data; it surfaces as an `Error` only when
    /// a caller explicitly asks to distinguish corruption from absence
    /// (e.g. `verify_count`).
    #[error("corrupt data: {message}")]
    Corrupt {
        /// Description of the corruption.
        message: String,
    },

    /// An I/O operation exceeded its configured deadline.
    #[error("timeout after {millis}ms: {operation}")]
    Timeout {
        /// What operation timed out.
        operation: String,
        /// The configured deadline, in milliseconds.
        millis: u64,
    },

    /// Permission denied, disk full, rename failed, directory creation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Post-migration record count did not match the source.
    #[error("data incomplete: expected {expected} records, found {actual}")]
    DataIncomplete {
        /// Expected record count.
        expected: usize,
        /// Actual record count observed.
        actual: usize,
    },
}

impl Error {
    /// Build an `InvalidInput` error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput { message: message.into() }
    }

    /// Build a `NotFound` error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Error::NotFound { name: name.into() }
    }

    /// Build a `Conflict` error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Error::Conflict { message: message.into() }
    }

    /// Build a `Corrupt` error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Error::Corrupt { message: message.into() }
    }

    /// Build a `Timeout` error.
    pub fn timeout(operation: impl Into<String>, millis: u64) -> Self {
        Error::Timeout { operation: operation.into(), millis }
    }

    /// Whether this error represents a condition safe to retry (a transient
    /// I/O hiccup or timeout, not a validation or logic error).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout { .. } | Error::Io(_))
    }

    /// Whether this is a unique-index or transaction-state conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Whether this is a corruption error (integrity hash or MAC mismatch).
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Error::Corrupt { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_message_round_trips() {
        let err = Error::invalid_input("bad table name");
        assert!(err.to_string().contains("bad table name"));
    }

    #[test]
    fn timeout_is_retryable_conflict_is_not() {
        let timeout = Error::timeout("chunk read", 10_000);
        let conflict = Error::conflict("unique violation");
        assert!(timeout.is_retryable());
        assert!(!conflict.is_retryable());
        assert!(conflict.is_conflict());
        assert!(!timeout.is_conflict());
    }

    #[test]
    fn io_error_converts_via_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn data_incomplete_reports_both_counts() {
        let err = Error::DataIncomplete { expected: 100, actual: 97 };
        let msg = err.to_string();
        assert!(msg.contains("100"));
        assert!(msg.contains("97"));
    }
}
