//! Document paths, dot-notation and update operators.
//!
//! Paths use dot-notation (`address.city`); numeric segments index into
//! arrays when reading. Every function here reports problems through
//! [`StoreError`] values instead of panicking.

use crate::error::{StoreError, StoreResult};
use serde_json::{Map, Number, Value};

/// Returns the value at a dot-notation path.
#[must_use]
pub fn get_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(document, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Returns the value at a dot-notation path of a top-level document.
#[must_use]
pub fn lookup<'a>(document: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    match path.split_once('.') {
        Some((first, rest)) => document.get(first).and_then(|value| get_path(value, rest)),
        None => document.get(path),
    }
}

/// Sets the value at a dot-notation path, creating intermediate objects.
///
/// # Errors
///
/// Returns an error if an intermediate segment exists but is not an object.
pub fn set_path(document: &mut Map<String, Value>, path: &str, value: Value) -> StoreResult<()> {
    let (parent, leaf) = parent_mut(document, path, true)?;
    match parent {
        Some(parent) => {
            parent.insert(leaf.to_string(), value);
            Ok(())
        }
        None => Err(StoreError::invalid_update(format!(
            "cannot create field '{leaf}' in path '{path}'"
        ))),
    }
}

/// Removes the value at a dot-notation path, returning it.
///
/// Missing paths are not an error.
pub fn remove_path(document: &mut Map<String, Value>, path: &str) -> Option<Value> {
    match parent_mut(document, path, false) {
        Ok((Some(parent), leaf)) => parent.remove(leaf),
        _ => None,
    }
}

/// Walks to the object holding the last segment of `path`.
fn parent_mut<'a, 'p>(
    document: &'a mut Map<String, Value>,
    path: &'p str,
    create: bool,
) -> StoreResult<(Option<&'a mut Map<String, Value>>, &'p str)> {
    if path.is_empty() || path.split('.').any(str::is_empty) {
        return Err(StoreError::invalid_update(format!("invalid field path '{path}'")));
    }

    let (intermediate, leaf) = match path.rsplit_once('.') {
        Some((intermediate, leaf)) => (Some(intermediate), leaf),
        None => (None, path),
    };

    let mut current = document;
    if let Some(intermediate) = intermediate {
        for segment in intermediate.split('.') {
            if !current.contains_key(segment) {
                if !create {
                    return Ok((None, leaf));
                }
                current.insert(segment.to_string(), Value::Object(Map::new()));
            }
            current = match current.get_mut(segment) {
                Some(Value::Object(next)) => next,
                _ if create => {
                    return Err(StoreError::invalid_update(format!(
                        "cannot create field '{leaf}' in path '{path}': '{segment}' is not an object"
                    )))
                }
                _ => return Ok((None, leaf)),
            };
        }
    }

    Ok((Some(current), leaf))
}

/// Returns true if any top-level key is an update operator (`$...`).
#[must_use]
pub fn has_update_operators(content: &Map<String, Value>) -> bool {
    content.keys().any(|key| key.starts_with('$'))
}

/// Expands top-level dot-notation keys into nested objects.
///
/// `{"a.b": 1, "c": 2}` becomes `{"a": {"b": 1}, "c": 2}`.
///
/// # Errors
///
/// Returns an error if two keys address the same field.
pub fn unflatten(content: Map<String, Value>) -> StoreResult<Map<String, Value>> {
    let mut result = Map::new();
    for (key, value) in content {
        let occupied = if key.contains('.') {
            lookup(&result, &key).is_some()
        } else {
            result.contains_key(&key)
        };
        if occupied {
            return Err(StoreError::invalid_document(format!(
                "field '{key}' is defined more than once"
            )));
        }

        if key.contains('.') {
            set_path(&mut result, &key, value)
                .map_err(|e| StoreError::invalid_document(e.to_string()))?;
        } else {
            result.insert(key, value);
        }
    }
    Ok(result)
}

/// Applies an update document to `document`.
///
/// Supported operators are `$set`, `$unset`, `$inc` and `$push`. Plain keys
/// behave as `$set`. `_id` is never modified.
///
/// # Errors
///
/// Returns an error for unknown operators, malformed operator arguments, or
/// values of the wrong type.
pub fn apply_update(document: &mut Map<String, Value>, update: &Map<String, Value>) -> StoreResult<()> {
    for (key, value) in update {
        let Some(operator) = key.strip_prefix('$') else {
            if key != "_id" {
                set_path(document, key, value.clone())?;
            }
            continue;
        };

        let Value::Object(arguments) = value else {
            return Err(StoreError::invalid_update(format!(
                "operator {key} requires an object argument"
            )));
        };

        for (path, argument) in arguments {
            if path == "_id" || path.starts_with("_id.") {
                return Err(StoreError::invalid_update("the field '_id' cannot be updated"));
            }
            match operator {
                "set" => set_path(document, path, argument.clone())?,
                "unset" => {
                    remove_path(document, path);
                }
                "inc" => increment(document, path, argument)?,
                "push" => push(document, path, argument)?,
                _ => {
                    return Err(StoreError::invalid_update(format!(
                        "unknown update operator {key}"
                    )))
                }
            }
        }
    }
    Ok(())
}

fn increment(document: &mut Map<String, Value>, path: &str, by: &Value) -> StoreResult<()> {
    let Value::Number(by) = by else {
        return Err(StoreError::invalid_update(format!(
            "cannot increment '{path}' by a non-numeric value"
        )));
    };

    let current = lookup(document, path).cloned();
    let next = match current {
        None => Value::Number(by.clone()),
        Some(Value::Number(current)) => Value::Number(add(&current, by)?),
        Some(_) => {
            return Err(StoreError::invalid_update(format!(
                "cannot apply $inc to the non-numeric field '{path}'"
            )))
        }
    };
    set_path(document, path, next)
}

fn add(a: &Number, b: &Number) -> StoreResult<Number> {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Ok(sum.into());
        }
    }
    let sum = a.as_f64().unwrap_or_default() + b.as_f64().unwrap_or_default();
    Number::from_f64(sum).ok_or_else(|| StoreError::invalid_update("increment overflow"))
}

fn push(document: &mut Map<String, Value>, path: &str, item: &Value) -> StoreResult<()> {
    let current = lookup(document, path).cloned();
    let next = match current {
        None => Value::Array(vec![item.clone()]),
        Some(Value::Array(mut items)) => {
            items.push(item.clone());
            Value::Array(items)
        }
        Some(_) => {
            return Err(StoreError::invalid_update(format!(
                "cannot apply $push to the non-array field '{path}'"
            )))
        }
    };
    set_path(document, path, next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_get_path() {
        let doc = json!({"a": {"b": [10, {"c": 3}]}});
        assert_eq!(get_path(&doc, "a.b.0"), Some(&json!(10)));
        assert_eq!(get_path(&doc, "a.b.1.c"), Some(&json!(3)));
        assert_eq!(get_path(&doc, "a.x"), None);
        assert_eq!(get_path(&doc, "a.b.c"), None);
    }

    #[test]
    fn test_set_and_remove_path() {
        let mut doc = object(json!({"a": 1}));
        set_path(&mut doc, "b.c.d", json!(true)).unwrap();
        assert_eq!(Value::Object(doc.clone()), json!({"a": 1, "b": {"c": {"d": true}}}));

        assert!(set_path(&mut doc, "a.x", json!(1)).is_err());
        assert!(set_path(&mut doc, "a..x", json!(1)).is_err());

        assert_eq!(remove_path(&mut doc, "b.c.d"), Some(json!(true)));
        assert_eq!(remove_path(&mut doc, "nope.deeper"), None);
        assert_eq!(Value::Object(doc), json!({"a": 1, "b": {"c": {}}}));
    }

    #[test]
    fn test_unflatten() {
        let flat = object(json!({"name": "x", "address.city": "Rome", "address.zip": "00100"}));
        let nested = unflatten(flat).unwrap();
        assert_eq!(
            Value::Object(nested),
            json!({"name": "x", "address": {"city": "Rome", "zip": "00100"}})
        );
    }

    #[test]
    fn test_unflatten_rejects_duplicates() {
        let flat = object(json!({"a": {"b": 1}, "a.b": 2}));
        assert!(unflatten(flat).is_err());

        let flat = object(json!({"a": 1, "a.b": 2}));
        assert!(unflatten(flat).is_err());
    }

    #[test]
    fn test_apply_operators() {
        let mut doc = object(json!({"_id": "d1", "n": 1, "tags": ["a"], "gone": true}));
        let update = object(json!({
            "$set": {"profile.name": "Ada"},
            "$inc": {"n": 2, "fresh": 5},
            "$push": {"tags": "b"},
            "$unset": {"gone": ""},
            "plain": 7
        }));
        apply_update(&mut doc, &update).unwrap();

        assert_eq!(
            Value::Object(doc),
            json!({
                "_id": "d1",
                "n": 3,
                "fresh": 5,
                "tags": ["a", "b"],
                "profile": {"name": "Ada"},
                "plain": 7
            })
        );
    }

    #[test]
    fn test_apply_rejects_bad_updates() {
        let mut doc = object(json!({"s": "text"}));
        assert!(apply_update(&mut doc, &object(json!({"$rename": {"s": "t"}}))).is_err());
        assert!(apply_update(&mut doc, &object(json!({"$set": 1}))).is_err());
        assert!(apply_update(&mut doc, &object(json!({"$inc": {"s": 1}}))).is_err());
        assert!(apply_update(&mut doc, &object(json!({"$push": {"s": 1}}))).is_err());
        assert!(apply_update(&mut doc, &object(json!({"$set": {"_id": "x"}}))).is_err());
    }

    #[test]
    fn test_float_increment() {
        let mut doc = object(json!({"price": 1.5}));
        apply_update(&mut doc, &object(json!({"$inc": {"price": 1}}))).unwrap();
        assert_eq!(doc["price"], json!(2.5));
    }

    #[test]
    fn test_has_update_operators() {
        assert!(has_update_operators(&object(json!({"$set": {}}))));
        assert!(!has_update_operators(&object(json!({"a": {"$set": 1}}))));
    }
}
