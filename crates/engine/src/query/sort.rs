//! Multi-field sort with a pluggable, size-aware algorithm selector.
//!
//! Resolves the mixed numeric/string ordering open question via
//! `Value::sort_cmp` (numbers before strings in ascending order); null and
//! missing values always sort to the end regardless of direction, per
//! field.

use litestore_core::value::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use unicode_segmentation::UnicodeSegmentation;

/// Ascending or descending, per sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Smallest first.
    Asc,
    /// Largest first.
    Desc,
}

/// One field to sort by and its direction.
#[derive(Debug, Clone)]
pub struct SortKey {
    /// Dotted field path.
    pub field: String,
    /// Sort direction for this field.
    pub direction: SortDirection,
}

/// Sort algorithm selection. `Default` defers to the size/cardinality
/// heuristic in `select_algorithm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortAlgorithm {
    /// Let `select_algorithm` choose based on dataset shape.
    #[default]
    Default,
    /// Rust's library stable sort.
    Library,
    /// Non-stable string-compare sort; fastest, documented as unstable.
    Fast,
    /// Grapheme-cluster-aware comparison, correct for CJK and other
    /// multi-codepoint scripts.
    Slow,
    /// Stable adaptive merge sort (Rust's `sort_by`), used for large inputs.
    Merge,
    /// Bucket by value for single-key, low-cardinality sorts.
    Counting,
}

/// Choose a concrete algorithm for `record_count` records and `keys`, given
/// `explicit` (which wins unless it's `Default`) and a cardinality estimate
/// of the first key (used only when single-key).
pub fn select_algorithm(explicit: SortAlgorithm, record_count: usize, keys: &[SortKey], cardinality: Option<usize>) -> SortAlgorithm {
    if explicit != SortAlgorithm::Default {
        return explicit;
    }
    if record_count < 100 {
        return SortAlgorithm::Library;
    }
    if record_count > 10_000 {
        return SortAlgorithm::Merge;
    }
    if keys.len() == 1 {
        if let Some(cardinality) = cardinality {
            let threshold = (record_count / 10).min(100);
            if cardinality < threshold {
                return SortAlgorithm::Counting;
            }
        }
    }
    SortAlgorithm::Merge
}

/// Distinct-value count of the first key's field across `records`, used by
/// the caller to feed `select_algorithm`'s cardinality estimate.
pub fn estimate_cardinality(records: &[Value], field: &str) -> usize {
    let mut seen = std::collections::HashSet::new();
    for record in records {
        seen.insert(record.get_path(field).map(Value::canonical_json).unwrap_or_default());
    }
    seen.len()
}

/// Sort `records` in place by `keys`, using `algorithm`.
pub fn sort(records: &mut Vec<Value>, keys: &[SortKey], algorithm: SortAlgorithm) {
    if keys.is_empty() {
        return;
    }
    match algorithm {
        SortAlgorithm::Fast => {
            records.sort_unstable_by(|a, b| compare_composite(a, b, keys, false));
        }
        SortAlgorithm::Slow => {
            records.sort_by(|a, b| compare_composite(a, b, keys, true));
        }
        SortAlgorithm::Counting if keys.len() == 1 => {
            counting_sort(records, &keys[0]);
        }
        _ => {
            records.sort_by(|a, b| compare_composite(a, b, keys, false));
        }
    }
}

fn compare_composite(a: &Value, b: &Value, keys: &[SortKey], locale_aware: bool) -> Ordering {
    for key in keys {
        let av = a.get_path(&key.field);
        let bv = b.get_path(&key.field);
        let ordering = compare_field(av, bv, key.direction, locale_aware);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn is_absent(v: Option<&Value>) -> bool {
    matches!(v, None) || matches!(v, Some(Value::Null))
}

fn compare_field(a: Option<&Value>, b: Option<&Value>, direction: SortDirection, locale_aware: bool) -> Ordering {
    match (is_absent(a), is_absent(b)) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }
    let a = a.unwrap();
    let b = b.unwrap();
    let ordering = if locale_aware {
        locale_cmp(a, b)
    } else {
        a.sort_cmp(b)
    };
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

/// Grapheme-cluster comparison for strings (correct under CJK and other
/// multi-codepoint scripts where naive codepoint order is surprising);
/// falls back to `Value::sort_cmp` for non-string values.
fn locale_cmp(a: &Value, b: &Value) -> Ordering {
    match (a.as_str(), b.as_str()) {
        (Some(a), Some(b)) => {
            let a: Vec<&str> = a.graphemes(true).collect();
            let b: Vec<&str> = b.graphemes(true).collect();
            a.cmp(&b)
        }
        _ => a.sort_cmp(b),
    }
}

fn counting_sort(records: &mut Vec<Value>, key: &SortKey) {
    use std::collections::BTreeMap;
    let mut order_seen = Vec::new();
    let mut buckets: std::collections::HashMap<String, Vec<Value>> = std::collections::HashMap::new();
    let mut representative: BTreeMap<String, (Option<Value>, bool)> = BTreeMap::new();

    for record in records.drain(..) {
        let field_value = record.get_path(&key.field).cloned();
        let absent = is_absent(field_value.as_ref());
        let bucket_key = field_value
            .as_ref()
            .map(Value::canonical_json)
            .unwrap_or_else(|| "\u{0}null".to_string());
        if !buckets.contains_key(&bucket_key) {
            order_seen.push(bucket_key.clone());
            representative.insert(bucket_key.clone(), (field_value, absent));
        }
        buckets.entry(bucket_key).or_default().push(record);
    }

    let mut present_keys: Vec<&String> = order_seen
        .iter()
        .filter(|k| !representative[*k].1)
        .collect();
    present_keys.sort_by(|ka, kb| {
        let a = representative[*ka].0.as_ref().unwrap();
        let b = representative[*kb].0.as_ref().unwrap();
        let ordering = a.sort_cmp(b);
        match key.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });

    for bucket_key in present_keys {
        records.extend(buckets.remove(bucket_key).unwrap_or_default());
    }
    for bucket_key in &order_seen {
        if representative[bucket_key].1 {
            if let Some(bucket) = buckets.remove(bucket_key) {
                records.extend(bucket);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn rec(age: i64, tag: &str) -> Value {
        Value::Object(BTreeMap::from([
            ("age".to_string(), Value::Int(age)),
            ("tag".to_string(), Value::String(tag.to_string())),
        ]))
    }

    #[test]
    fn single_key_ascending() {
        let mut records = vec![rec(30, "a"), rec(10, "b"), rec(20, "c")];
        sort(&mut records, &[SortKey { field: "age".into(), direction: SortDirection::Asc }], SortAlgorithm::Merge);
        let ages: Vec<i64> = records.iter().map(|r| r.get_path("age").unwrap().as_f64().unwrap() as i64).collect();
        assert_eq!(ages, vec![10, 20, 30]);
    }

    #[test]
    fn stability_preserved_on_ties() {
        let mut records = vec![rec(1, "first"), rec(1, "second"), rec(1, "third")];
        sort(&mut records, &[SortKey { field: "age".into(), direction: SortDirection::Asc }], SortAlgorithm::Merge);
        let tags: Vec<&str> = records.iter().map(|r| r.get_path("tag").unwrap().as_str().unwrap()).collect();
        assert_eq!(tags, vec!["first", "second", "third"]);
    }

    #[test]
    fn multi_field_sort_orders_by_first_key_then_second() {
        let mut records = vec![rec(2, "b"), rec(1, "a"), rec(1, "c")];
        let keys = vec![
            SortKey { field: "age".into(), direction: SortDirection::Asc },
            SortKey { field: "tag".into(), direction: SortDirection::Asc },
        ];
        sort(&mut records, &keys, SortAlgorithm::Merge);
        let tags: Vec<&str> = records.iter().map(|r| r.get_path("tag").unwrap().as_str().unwrap()).collect();
        assert_eq!(tags, vec!["a", "c", "b"]);
    }

    #[test]
    fn null_and_missing_sort_to_end_regardless_of_direction() {
        let with_null = Value::Object(BTreeMap::from([("age".to_string(), Value::Null)]));
        let mut records = vec![with_null.clone(), rec(5, "x")];
        sort(&mut records, &[SortKey { field: "age".into(), direction: SortDirection::Desc }], SortAlgorithm::Merge);
        assert_eq!(records[0].get_path("age").unwrap().as_f64(), Some(5.0));
        assert_eq!(records[1], with_null);
    }

    #[test]
    fn counting_sort_groups_by_single_key() {
        let mut records = vec![rec(1, "a"), rec(2, "b"), rec(1, "c"), rec(2, "d")];
        let keys = vec![SortKey { field: "age".into(), direction: SortDirection::Asc }];
        sort(&mut records, &keys, SortAlgorithm::Counting);
        let ages: Vec<i64> = records.iter().map(|r| r.get_path("age").unwrap().as_f64().unwrap() as i64).collect();
        assert_eq!(ages, vec![1, 1, 2, 2]);
    }

    #[test]
    fn select_algorithm_picks_library_for_small_datasets() {
        let keys = vec![SortKey { field: "age".into(), direction: SortDirection::Asc }];
        assert_eq!(select_algorithm(SortAlgorithm::Default, 50, &keys, None), SortAlgorithm::Library);
    }

    #[test]
    fn select_algorithm_picks_merge_for_large_datasets() {
        let keys = vec![SortKey { field: "age".into(), direction: SortDirection::Asc }];
        assert_eq!(select_algorithm(SortAlgorithm::Default, 20_000, &keys, None), SortAlgorithm::Merge);
    }

    #[test]
    fn select_algorithm_picks_counting_for_low_cardinality_single_key() {
        let keys = vec![SortKey { field: "age".into(), direction: SortDirection::Asc }];
        assert_eq!(select_algorithm(SortAlgorithm::Default, 1000, &keys, Some(3)), SortAlgorithm::Counting);
    }

    #[test]
    fn explicit_algorithm_always_wins() {
        let keys = vec![SortKey { field: "age".into(), direction: SortDirection::Asc }];
        assert_eq!(select_algorithm(SortAlgorithm::Fast, 50, &keys, None), SortAlgorithm::Fast);
    }
}
