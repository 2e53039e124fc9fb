//! The canonical record value type.
//!
//! This module defines `Value`, the single JSON-ish sum type shared by the
//! integrity codec, the query engine, and index keying. Every record stored
//! by litestore is a `Value::Object`; every field inside it is a `Value`.
//!
//! `Object` is backed by a `BTreeMap`, not a `HashMap`, so that two records
//! with identical fields written in different insertion order produce byte-
//! identical canonical serializations (and therefore identical integrity
//! hashes).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::cmp::Ordering;

/// Record identifier. A record's `id` field is either an integer or a
/// string; both are valid for index keying and bulk update/delete.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordId {
    /// Integer identifier.
    Int(i64),
    /// String identifier.
    Str(String),
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordId::Int(n) => write!(f, "{n}"),
            RecordId::Str(s) => write!(f, "{s}"),
        }
    }
}

/// Unified value type for all record fields.
///
/// No schema is enforced at write time; declared columns in the catalog are
/// advisory metadata only (see `litestore_storage::catalog::ColumnSchema`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// JSON `null`, and the sentinel used for an absent field under `$eq`/`$ne`.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer. Serialized losslessly; distinct from `Float`
    /// so integer record ids round-trip without precision loss.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered array of values.
    Array(Vec<Value>),
    /// Nested object, field name to value. `BTreeMap` guarantees
    /// deterministic iteration order for canonical serialization.
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// A fresh empty object, the shape every record must start from.
    pub fn empty_object() -> Self {
        Value::Object(BTreeMap::new())
    }

    /// Borrow this value as an object's field map, if it is one.
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Mutably borrow this value as an object's field map, if it is one.
    pub fn as_object_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Borrow this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Read this value as an `f64`, if it holds a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Read this value as a `&str`, if it holds a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this is `Value::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Look up `id` on this value, if it is an object with a recognized id field.
    pub fn record_id(&self) -> Option<RecordId> {
        let field = self.as_object()?.get("id")?;
        match field {
            Value::Int(n) => Some(RecordId::Int(*n)),
            Value::String(s) => Some(RecordId::Str(s.clone())),
            _ => None,
        }
    }

    /// Fetch the value at a dotted field path (`"a.b.c"`), returning `None`
    /// if any segment is missing or not an object.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for segment in path.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Canonical serialization used by the integrity codec and index keying:
    /// compact JSON with object keys in sorted (`BTreeMap`) order.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).expect("Value serialization is infallible")
    }

    /// Convert from `serde_json::Value`, normalizing `NaN`/`Infinity`
    /// (which `serde_json` cannot represent) to `Null` on the way in, per
    /// spec.md's round-trip normalization rule.
    pub fn from_json(v: serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::Null
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to `serde_json::Value` for interop with external callers.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

/// Ordering used by the sort engine for a single field's values.
///
/// Resolves spec.md §9's open question: numbers sort before strings in
/// ascending order (and after, in descending, since the sort engine reverses
/// the whole comparison rather than this function). Null/undefined values
/// are handled by the caller (they always sort to the end), not here.
impl Value {
    /// Compare two values for sort purposes. Mixed numeric/string values are
    /// ordered with numbers first; other cross-type comparisons fall back to
    /// a stable type-rank ordering so the sort is always total.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        use Value::*;
        match (self, other) {
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Int(a), Float(b)) => (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal),
            (Float(a), Int(b)) => a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal),
            (String(a), String(b)) => a.cmp(b),
            (Bool(a), Bool(b)) => a.cmp(b),
            (Null, Null) => Ordering::Equal,
            // numbers before strings, both before everything else
            (Int(_) | Float(_), String(_)) => Ordering::Less,
            (String(_), Int(_) | Float(_)) => Ordering::Greater,
            _ => type_rank(self).cmp(&type_rank(other)),
        }
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Float(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(pairs: &[(&str, Value)]) -> Value {
        Value::Object(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    #[test]
    fn canonical_json_is_stable_under_insertion_order() {
        let a = obj(&[("b", Value::Int(2)), ("a", Value::Int(1))]);
        let b = obj(&[("a", Value::Int(1)), ("b", Value::Int(2))]);
        assert_eq!(a.canonical_json(), b.canonical_json());
    }

    #[test]
    fn record_id_reads_int_and_string() {
        assert_eq!(
            obj(&[("id", Value::Int(7))]).record_id(),
            Some(RecordId::Int(7))
        );
        assert_eq!(
            obj(&[("id", Value::String("x".into()))]).record_id(),
            Some(RecordId::Str("x".into()))
        );
        assert_eq!(obj(&[("name", Value::String("x".into()))]).record_id(), None);
    }

    #[test]
    fn get_path_traverses_nested_objects() {
        let v = obj(&[("a", obj(&[("b", Value::Int(42))]))]);
        assert_eq!(v.get_path("a.b"), Some(&Value::Int(42)));
        assert_eq!(v.get_path("a.c"), None);
        assert_eq!(v.get_path("x"), None);
    }

    #[test]
    fn int_and_float_compare_equal_when_numerically_equal() {
        assert_eq!(Value::Int(3), Value::Float(3.0));
    }

    #[test]
    fn sort_cmp_orders_numbers_before_strings() {
        assert_eq!(Value::Int(5).sort_cmp(&Value::String("a".into())), Ordering::Less);
        assert_eq!(Value::String("a".into()).sort_cmp(&Value::Int(5)), Ordering::Greater);
    }

    #[test]
    fn from_json_round_trips_through_canonical_form() {
        let json = serde_json::json!({"id": 1, "name": "A", "tags": ["x", "y"], "meta": null});
        let v = Value::from_json(json.clone());
        assert_eq!(v.to_json(), json);
    }

    #[test]
    fn from_json_normalizes_nan_and_infinity_to_null() {
        // serde_json itself cannot represent NaN/Infinity, so a number that
        // fails both as_i64 and as_f64 never actually arises from its
        // parser; from_json still defends against malformed Number values.
        let json = serde_json::json!(1);
        assert_eq!(Value::from_json(json).as_f64(), Some(1.0));
    }
}
