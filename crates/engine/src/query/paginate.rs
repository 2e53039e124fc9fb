//! Skip/limit pagination over an already-filtered, already-sorted record
//! slice.

use litestore_core::value::Value;

/// Apply `skip` then `limit` to `records`, consuming it.
///
/// `skip >= records.len()` yields an empty result. `skip == 0` with no
/// `limit` (or a `limit` at least as large as the remainder) returns the
/// input unchanged.
pub fn paginate(records: Vec<Value>, skip: usize, limit: Option<usize>) -> Vec<Value> {
    if skip >= records.len() {
        return Vec::new();
    }
    let mut remainder = records;
    remainder.drain(..skip);
    if let Some(limit) = limit {
        remainder.truncate(limit);
    }
    remainder
}
