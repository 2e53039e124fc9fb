//! Filter DSL: a Mongo-style query object parsed once into a tagged sum and
//! evaluated as a pure function over a record.
//!
//! Resolves the $in/$nin-against-array open question as "intersection":
//! when the record's field is itself an array, `$in`/`$nin` test whether
//! the two value sets intersect, matching the behavior existing tests in
//! the distillation this was drawn from assumed.

use litestore_core::value::Value;

/// A single comparison operator applied to one field's value.
#[derive(Debug, Clone)]
pub enum Op {
    /// Equal, including the null/absent-field sentinel case.
    Eq(Value),
    /// Not equal.
    Ne(Value),
    /// Strictly greater than (numeric only; non-numeric values never match).
    Gt(Value),
    /// Greater than or equal.
    Gte(Value),
    /// Strictly less than.
    Lt(Value),
    /// Less than or equal.
    Lte(Value),
    /// Membership in a list. Against an array-valued field, true iff the
    /// sets intersect.
    In(Vec<Value>),
    /// Non-membership in a list. Against an array-valued field, true iff the
    /// sets do not intersect. `$nin: []` always matches.
    Nin(Vec<Value>),
    /// SQL-style `%`-wildcard match, case-insensitive, anchored at both ends.
    Like(String),
}

/// A parsed filter tree: implicit ANDs across sibling fields, explicit
/// `$and`/`$or` nesting, and leaf field predicates.
#[derive(Debug, Clone)]
pub enum Filter {
    /// All sub-filters must match.
    And(Vec<Filter>),
    /// At least one sub-filter must match.
    Or(Vec<Filter>),
    /// A single field predicate, addressed by dotted path.
    Field(String, Op),
}

impl Filter {
    /// An always-true filter, used for an empty/missing query object.
    pub fn all() -> Filter {
        Filter::And(Vec::new())
    }

    /// Parse a Mongo-style filter object into a `Filter` tree.
    pub fn parse(value: &Value) -> Result<Filter, String> {
        let Some(map) = value.as_object() else {
            return Err("filter must be an object".to_string());
        };
        if map.is_empty() {
            return Ok(Filter::all());
        }
        if let Some(and) = map.get("$and") {
            return Ok(Filter::And(parse_array(and)?));
        }
        if let Some(or) = map.get("$or") {
            return Ok(Filter::Or(parse_array(or)?));
        }

        let mut clauses = Vec::with_capacity(map.len());
        for (field, condition) in map {
            clauses.extend(parse_field(field, condition)?);
        }
        Ok(Filter::And(clauses))
    }

    /// Whether `record` satisfies this filter.
    pub fn matches(&self, record: &Value) -> bool {
        match self {
            Filter::And(clauses) => clauses.iter().all(|c| c.matches(record)),
            Filter::Or(clauses) => clauses.iter().any(|c| c.matches(record)),
            Filter::Field(path, op) => {
                let field_value = record.get_path(path);
                op.matches(field_value)
            }
        }
    }
}

fn parse_array(value: &Value) -> Result<Vec<Filter>, String> {
    let items = value.as_array().ok_or("$and/$or expects an array")?;
    items.iter().map(Filter::parse).collect()
}

fn parse_field(field: &str, condition: &Value) -> Result<Vec<Filter>, String> {
    if let Some(map) = condition.as_object() {
        if map.keys().all(|k| k.starts_with('$')) && !map.is_empty() {
            return map
                .iter()
                .map(|(op, operand)| Ok(Filter::Field(field.to_string(), Op::parse(op, operand)?)))
                .collect();
        }
    }
    Ok(vec![Filter::Field(field.to_string(), Op::Eq(condition.clone()))])
}

impl Op {
    fn parse(name: &str, operand: &Value) -> Result<Op, String> {
        Ok(match name {
            "$eq" => Op::Eq(operand.clone()),
            "$ne" => Op::Ne(operand.clone()),
            "$gt" => Op::Gt(operand.clone()),
            "$gte" => Op::Gte(operand.clone()),
            "$lt" => Op::Lt(operand.clone()),
            "$lte" => Op::Lte(operand.clone()),
            "$in" => Op::In(operand.as_array().ok_or("$in expects an array")?.to_vec()),
            "$nin" => Op::Nin(operand.as_array().ok_or("$nin expects an array")?.to_vec()),
            "$like" => Op::Like(operand.as_str().ok_or("$like expects a string")?.to_string()),
            other => return Err(format!("unsupported operator: {other}")),
        })
    }

    fn matches(&self, field_value: Option<&Value>) -> bool {
        match self {
            Op::Eq(expected) => eq_with_absence(field_value, expected),
            Op::Ne(expected) => !eq_with_absence(field_value, expected),
            Op::Gt(expected) => numeric_cmp(field_value, expected, |a, b| a > b),
            Op::Gte(expected) => numeric_cmp(field_value, expected, |a, b| a >= b),
            Op::Lt(expected) => numeric_cmp(field_value, expected, |a, b| a < b),
            Op::Lte(expected) => numeric_cmp(field_value, expected, |a, b| a <= b),
            Op::In(list) => set_intersects(field_value, list),
            Op::Nin(list) => !set_intersects(field_value, list),
            Op::Like(pattern) => match field_value.and_then(Value::as_str) {
                Some(s) => like_match(s, pattern),
                None => false,
            },
        }
    }
}

fn eq_with_absence(field_value: Option<&Value>, expected: &Value) -> bool {
    match field_value {
        Some(v) => v == expected,
        None => expected.is_null(),
    }
}

fn numeric_cmp(field_value: Option<&Value>, expected: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (field_value.and_then(Value::as_f64), expected.as_f64()) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

/// `$in`/`$nin` base case: does `field_value` intersect `list`? A scalar
/// field intersects iff it equals a member; an array field intersects iff
/// any of its elements equals a member. An absent field never intersects.
fn set_intersects(field_value: Option<&Value>, list: &[Value]) -> bool {
    let Some(field_value) = field_value else { return false };
    if let Some(items) = field_value.as_array() {
        items.iter().any(|item| list.iter().any(|l| l == item))
    } else {
        list.iter().any(|l| l == field_value)
    }
}

/// SQL-style `%` wildcard match, case-insensitive, anchored at both ends.
/// `%` matches any run of zero or more characters; there is no escape
/// character (mirrors the single wildcard the filter DSL exposes).
fn like_match(haystack: &str, pattern: &str) -> bool {
    let haystack = haystack.to_lowercase();
    let pattern = pattern.to_lowercase();
    let segments: Vec<&str> = pattern.split('%').collect();

    if segments.len() == 1 {
        return haystack == pattern;
    }

    let mut cursor = 0usize;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            if !haystack[cursor..].starts_with(segment) {
                return false;
            }
            cursor += segment.len();
        } else if i == segments.len() - 1 {
            if !haystack[cursor..].ends_with(segment) {
                return false;
            }
        } else {
            match haystack[cursor..].find(segment) {
                Some(pos) => cursor += pos + segment.len(),
                None => return false,
            }
        }
    }
    true
}
