//! Key escaping for stored documents.
//!
//! Documents may not carry keys starting with `$` or containing `.`, yet
//! some content (GraphQL mappings, aggregation pipelines) needs them. Such
//! keys are escaped on the way in and unescaped on the way out: a leading
//! `$` becomes `_$` and every `.` becomes `::`.

use serde_json::{Map, Value};

/// Escapes every key of `value`, recursively.
#[must_use]
pub fn escape_keys(value: Value) -> Value {
    transform_keys(value, &escape_key)
}

/// Reverses [`escape_keys`].
#[must_use]
pub fn unescape_keys(value: Value) -> Value {
    transform_keys(value, &unescape_key)
}

/// Returns true if any key of `value`, at any depth, needs escaping.
#[must_use]
pub fn needs_escaping(value: &Value) -> bool {
    match value {
        Value::Object(map) => map
            .iter()
            .any(|(key, value)| key.starts_with('$') || key.contains('.') || needs_escaping(value)),
        Value::Array(items) => items.iter().any(needs_escaping),
        _ => false,
    }
}

fn escape_key(key: &str) -> String {
    let key = key.replace('.', "::");
    if key.starts_with('$') {
        format!("_{key}")
    } else {
        key
    }
}

fn unescape_key(key: &str) -> String {
    let key = key.strip_prefix("_$").map_or_else(|| key.to_string(), |rest| format!("${rest}"));
    key.replace("::", ".")
}

fn transform_keys(value: Value, rename: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (rename(&key), transform_keys(value, rename)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|item| transform_keys(item, rename)).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_escape_nested_keys() {
        let value = json!({
            "stages": [{"$match": {"address.city": "Rome"}}],
            "plain": {"$limit": 1}
        });
        let escaped = escape_keys(value.clone());
        assert_eq!(
            escaped,
            json!({
                "stages": [{"_$match": {"address::city": "Rome"}}],
                "plain": {"_$limit": 1}
            })
        );
        assert!(!needs_escaping(&escaped));
        assert!(needs_escaping(&value));
        assert_eq!(unescape_keys(escaped), value);
    }

    #[test]
    fn test_values_are_untouched() {
        let value = json!({"q": "$arg.name", "n": "a.b"});
        assert_eq!(escape_keys(value.clone()), value);
    }

    proptest! {
        #[test]
        fn escaped_keys_are_storable(key in "[$]?[a-z]{1,6}(\\.[a-z]{1,6}){0,3}") {
            let value = Value::Object(Map::from_iter([(key, json!(1))]));
            prop_assert!(!needs_escaping(&escape_keys(value)));
        }
    }
}
