//! `$arg` and `$fk` placeholder interpolation.
//!
//! A mapping template is any JSON value. An object of the form
//! `{"$arg": "name"}` is replaced by the query argument `name`; an object of
//! the form `{"$fk": "path"}` is replaced by the value at the dot-notation
//! `path` of the parent document. Every other value is copied, recursing
//! into objects and arrays.

use crate::error::InterpolationError;
use serde_json::{Map, Value};

/// Argument placeholder.
pub const ARG_OPERATOR: &str = "$arg";

/// Foreign key placeholder.
pub const FK_OPERATOR: &str = "$fk";

/// The values placeholders are resolved against.
#[derive(Debug, Clone, Copy)]
pub struct Bindings<'a> {
    arguments: &'a Map<String, Value>,
    source: Option<&'a Value>,
}

impl<'a> Bindings<'a> {
    /// Binds the field arguments.
    #[must_use]
    pub const fn new(arguments: &'a Map<String, Value>) -> Self {
        Self {
            arguments,
            source: None,
        }
    }

    /// Binds the parent document for `$fk`.
    #[must_use]
    pub const fn with_source(mut self, source: &'a Value) -> Self {
        self.source = Some(source);
        self
    }
}

/// Resolves all placeholders of `template`.
///
/// # Errors
///
/// Fails if an argument is missing or null, a foreign key path does not
/// exist in the parent document, or a placeholder operand is not a string.
pub fn interpolate(template: &Value, bindings: &Bindings<'_>) -> Result<Value, InterpolationError> {
    match template {
        Value::Object(map) => {
            if let Some(name) = map.get(ARG_OPERATOR) {
                let name = operand(ARG_OPERATOR, name)?;
                return match bindings.arguments.get(name) {
                    None | Some(Value::Null) => Err(InterpolationError::NotBound {
                        name: name.to_string(),
                    }),
                    Some(value) => Ok(value.clone()),
                };
            }
            if let Some(path) = map.get(FK_OPERATOR) {
                let path = operand(FK_OPERATOR, path)?;
                let source = bindings.source.ok_or_else(|| InterpolationError::NotBound {
                    name: path.to_string(),
                })?;
                let segments: Vec<&str> = path.split('.').collect();
                return foreign_value(source, &segments, path);
            }

            map.iter()
                .map(|(key, value)| Ok((key.clone(), interpolate(value, bindings)?)))
                .collect::<Result<Map<_, _>, _>>()
                .map(Value::Object)
        }
        Value::Array(items) => items
            .iter()
            .map(|item| interpolate(item, bindings))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

fn operand<'v>(operator: &'static str, value: &'v Value) -> Result<&'v str, InterpolationError> {
    value
        .as_str()
        .ok_or(InterpolationError::InvalidOperand { operator })
}

/// Walks `segments` from `current`. A non-numeric segment applied to an
/// array maps the rest of the path over its elements.
fn foreign_value(
    current: &Value,
    segments: &[&str],
    path: &str,
) -> Result<Value, InterpolationError> {
    let Some((segment, rest)) = segments.split_first() else {
        return Ok(current.clone());
    };

    match current {
        Value::Object(map) => match map.get(*segment) {
            Some(next) => foreign_value(next, rest, path),
            None => Err(InterpolationError::NotBound {
                name: path.to_string(),
            }),
        },
        Value::Array(items) => match segment.parse::<usize>() {
            Ok(index) => match items.get(index) {
                Some(next) => foreign_value(next, rest, path),
                None => Err(InterpolationError::IndexOutOfBounds {
                    path: path.to_string(),
                }),
            },
            Err(_) => items
                .iter()
                .map(|item| foreign_value(item, segments, path))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
        },
        _ => Err(InterpolationError::NotBound {
            name: path.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_arg_nested_in_objects_and_arrays() {
        let arguments = args(json!({"minPrice": 10, "tags": ["a", "b"]}));
        let template = json!({
            "$and": [
                {"price": {"$gte": {"$arg": "minPrice"}}},
                {"tags": {"$in": {"$arg": "tags"}}},
                {"kind": "book"}
            ]
        });

        let resolved = interpolate(&template, &Bindings::new(&arguments)).unwrap();
        assert_eq!(
            resolved,
            json!({
                "$and": [
                    {"price": {"$gte": 10}},
                    {"tags": {"$in": ["a", "b"]}},
                    {"kind": "book"}
                ]
            })
        );
    }

    #[test]
    fn test_unbound_arg() {
        let arguments = args(json!({"other": 1, "nothing": null}));
        let bindings = Bindings::new(&arguments);

        let err = interpolate(&json!({"_id": {"$arg": "id"}}), &bindings).unwrap_err();
        assert_eq!(err.to_string(), "variable id not bound");

        assert!(interpolate(&json!({"$arg": "nothing"}), &bindings).is_err());
        assert_eq!(
            interpolate(&json!({"$arg": 3}), &bindings).unwrap_err(),
            InterpolationError::InvalidOperand { operator: "$arg" }
        );
    }

    #[test]
    fn test_fk_paths() {
        let arguments = Map::new();
        let parent = json!({
            "author": {"id": "a1"},
            "reviews": [{"by": "u1"}, {"by": "u2"}]
        });
        let bindings = Bindings::new(&arguments).with_source(&parent);

        assert_eq!(
            interpolate(&json!({"_id": {"$fk": "author.id"}}), &bindings).unwrap(),
            json!({"_id": "a1"})
        );
        assert_eq!(
            interpolate(&json!({"$fk": "reviews.1.by"}), &bindings).unwrap(),
            json!("u2")
        );
        assert_eq!(
            interpolate(&json!({"$fk": "reviews.by"}), &bindings).unwrap(),
            json!(["u1", "u2"])
        );
        assert_eq!(
            interpolate(&json!({"$fk": "reviews.5.by"}), &bindings).unwrap_err(),
            InterpolationError::IndexOutOfBounds {
                path: "reviews.5.by".into()
            }
        );
        assert!(interpolate(&json!({"$fk": "editor.id"}), &bindings).is_err());
    }

    #[test]
    fn test_fk_without_parent() {
        let arguments = Map::new();
        let err = interpolate(&json!({"$fk": "author"}), &Bindings::new(&arguments)).unwrap_err();
        assert_eq!(err, InterpolationError::NotBound { name: "author".into() });
    }

    #[test]
    fn test_plain_values_are_copied() {
        let arguments = Map::new();
        let template = json!({"limit": 5, "sort": {"name": 1}, "flags": [true, null]});
        assert_eq!(
            interpolate(&template, &Bindings::new(&arguments)).unwrap(),
            template
        );
    }
}
