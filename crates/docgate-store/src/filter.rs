//! Query filters.
//!
//! A subset of the MongoDB query language, parsed up front so that a
//! malformed filter is reported as a [`StoreError::InvalidFilter`] before
//! any document is read.
//!
//! Supported: field equality on dot-notation paths, `$eq`, `$ne`, `$gt`,
//! `$gte`, `$lt`, `$lte`, `$in`, `$nin`, `$exists`, and the logical `$and`,
//! `$or`, `$nor`.

use crate::error::{StoreError, StoreResult};
use crate::update::get_path;
use serde_json::{Map, Value};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
enum FieldOp {
    Eq(Value),
    Ne(Value),
    Cmp(Ordering, bool, Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Nor(Vec<Condition>),
    Field(String, Vec<FieldOp>),
}

/// A parsed query filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    root: Condition,
}

impl Default for Filter {
    fn default() -> Self {
        Self::all()
    }
}

impl Filter {
    /// A filter matching every document.
    #[must_use]
    pub fn all() -> Self {
        Self {
            root: Condition::And(Vec::new()),
        }
    }

    /// Matches documents whose `_id` equals `id`.
    #[must_use]
    pub fn by_id(id: &str) -> Self {
        Self {
            root: Condition::Field("_id".to_string(), vec![FieldOp::Eq(Value::String(id.to_string()))]),
        }
    }

    /// Parses a filter document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidFilter`] if the filter is not an object
    /// or uses an unsupported or malformed operator.
    pub fn parse(filter: &Value) -> StoreResult<Self> {
        let Value::Object(filter) = filter else {
            return Err(StoreError::invalid_filter("filter must be a JSON object"));
        };
        Ok(Self {
            root: parse_document(filter)?,
        })
    }

    /// Parses a filter from its JSON text, as found in the `filter` query
    /// parameter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidFilter`] for invalid JSON or an invalid
    /// filter.
    pub fn parse_str(filter: &str) -> StoreResult<Self> {
        let value: Value = serde_json::from_str(filter)
            .map_err(|e| StoreError::invalid_filter(format!("filter is not valid JSON: {e}")))?;
        Self::parse(&value)
    }

    /// Returns true if the document matches.
    #[must_use]
    pub fn matches(&self, document: &Value) -> bool {
        evaluate(&self.root, document)
    }
}

fn parse_document(filter: &Map<String, Value>) -> StoreResult<Condition> {
    let mut conditions = Vec::with_capacity(filter.len());
    for (key, value) in filter {
        let condition = match key.as_str() {
            "$and" => Condition::And(parse_list(key, value)?),
            "$or" => Condition::Or(parse_list(key, value)?),
            "$nor" => Condition::Nor(parse_list(key, value)?),
            other if other.starts_with('$') => {
                return Err(StoreError::invalid_filter(format!(
                    "unsupported top-level operator {other}"
                )))
            }
            path => Condition::Field(path.to_string(), parse_field(value)?),
        };
        conditions.push(condition);
    }

    Ok(match conditions.len() {
        1 => conditions.remove(0),
        _ => Condition::And(conditions),
    })
}

fn parse_list(operator: &str, value: &Value) -> StoreResult<Vec<Condition>> {
    let Value::Array(items) = value else {
        return Err(StoreError::invalid_filter(format!("{operator} requires an array")));
    };
    if items.is_empty() {
        return Err(StoreError::invalid_filter(format!("{operator} requires a non-empty array")));
    }
    items
        .iter()
        .map(|item| match item {
            Value::Object(document) => parse_document(document),
            _ => Err(StoreError::invalid_filter(format!(
                "{operator} entries must be objects"
            ))),
        })
        .collect()
}

fn parse_field(value: &Value) -> StoreResult<Vec<FieldOp>> {
    let operators = match value {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => map,
        Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => {
            return Err(StoreError::invalid_filter(
                "cannot mix operators and fields in a field condition",
            ))
        }
        _ => return Ok(vec![FieldOp::Eq(value.clone())]),
    };

    operators
        .iter()
        .map(|(operator, argument)| {
            Ok(match operator.as_str() {
                "$eq" => FieldOp::Eq(argument.clone()),
                "$ne" => FieldOp::Ne(argument.clone()),
                "$gt" => FieldOp::Cmp(Ordering::Greater, false, argument.clone()),
                "$gte" => FieldOp::Cmp(Ordering::Greater, true, argument.clone()),
                "$lt" => FieldOp::Cmp(Ordering::Less, false, argument.clone()),
                "$lte" => FieldOp::Cmp(Ordering::Less, true, argument.clone()),
                "$in" => FieldOp::In(array_argument(operator, argument)?),
                "$nin" => FieldOp::Nin(array_argument(operator, argument)?),
                "$exists" => match argument {
                    Value::Bool(exists) => FieldOp::Exists(*exists),
                    _ => return Err(StoreError::invalid_filter("$exists requires a boolean")),
                },
                other => {
                    return Err(StoreError::invalid_filter(format!(
                        "unsupported operator {other}"
                    )))
                }
            })
        })
        .collect()
}

fn array_argument(operator: &str, argument: &Value) -> StoreResult<Vec<Value>> {
    match argument {
        Value::Array(items) => Ok(items.clone()),
        _ => Err(StoreError::invalid_filter(format!("{operator} requires an array"))),
    }
}

fn evaluate(condition: &Condition, document: &Value) -> bool {
    match condition {
        Condition::And(conditions) => conditions.iter().all(|c| evaluate(c, document)),
        Condition::Or(conditions) => conditions.iter().any(|c| evaluate(c, document)),
        Condition::Nor(conditions) => !conditions.iter().any(|c| evaluate(c, document)),
        Condition::Field(path, ops) => {
            let value = get_path(document, path);
            ops.iter().all(|op| apply(op, value))
        }
    }
}

fn apply(op: &FieldOp, value: Option<&Value>) -> bool {
    match op {
        FieldOp::Eq(expected) => value.is_some_and(|v| equals(v, expected)),
        FieldOp::Ne(expected) => !value.is_some_and(|v| equals(v, expected)),
        FieldOp::Cmp(direction, inclusive, bound) => value.is_some_and(|v| {
            compare(v, bound).is_some_and(|ord| ord == *direction || (*inclusive && ord == Ordering::Equal))
        }),
        FieldOp::In(candidates) => {
            value.is_some_and(|v| candidates.iter().any(|c| equals(v, c)))
        }
        FieldOp::Nin(candidates) => {
            !value.is_some_and(|v| candidates.iter().any(|c| equals(v, c)))
        }
        FieldOp::Exists(exists) => value.is_some() == *exists,
    }
}

/// Equality with array membership: an array field equals a scalar it
/// contains.
fn equals(value: &Value, expected: &Value) -> bool {
    if value == expected {
        return true;
    }
    match (value, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(items), _) => items.iter().any(|item| item == expected),
        _ => false,
    }
}

fn compare(value: &Value, bound: &Value) -> Option<Ordering> {
    match (value, bound) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
