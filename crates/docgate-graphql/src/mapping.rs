//! Field mappings of an app definition.
//!
//! Each field of a mapped object type is either renamed from another field
//! of the source document, fetched with a query, or computed with an
//! aggregation pipeline.

use crate::error::{AppDefinitionError, AppDefinitionResult, InterpolationError};
use crate::interpolate::{interpolate, Bindings};
use docgate_config::GraphqlConfig;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Limits applied to query mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingLimits {
    /// Limit used when a query mapping declares none.
    pub default_limit: u64,
    /// Largest literal limit a query mapping may declare.
    pub max_limit: u64,
}

impl Default for MappingLimits {
    fn default() -> Self {
        Self::from(&GraphqlConfig::default())
    }
}

impl From<&GraphqlConfig> for MappingLimits {
    fn from(config: &GraphqlConfig) -> Self {
        Self {
            default_limit: config.default_limit,
            max_limit: config.max_limit,
        }
    }
}

/// Batching and caching of the fetches of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataLoaderSettings {
    /// Group the fetches of sibling fields into one query.
    pub batching: bool,
    /// Reuse results for identical keys within a request.
    pub caching: bool,
    /// Upper bound of a batch; 0 means unbounded.
    pub max_batch_size: usize,
}

impl DataLoaderSettings {
    fn parse(type_name: &str, field: &str, value: &Value) -> AppDefinitionResult<Self> {
        let Value::Object(settings) = value else {
            return Err(wrong_type(type_name, field, "dataLoader", "an object", value));
        };
        let batching = settings.get("batching").and_then(Value::as_bool).unwrap_or(false);
        let max_batch_size = if batching {
            settings
                .get("maxBatchSize")
                .and_then(Value::as_u64)
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(0)
        } else {
            0
        };
        Ok(Self {
            batching,
            caching: settings.get("caching").and_then(Value::as_bool).unwrap_or(false),
            max_batch_size,
        })
    }

    /// Returns true if a data loader is needed at all.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.batching || self.caching
    }
}

/// A field fetched with a find.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMapping {
    /// Database to query.
    pub db: String,
    /// Collection to query.
    pub collection: String,
    /// Filter template.
    pub find: Option<Value>,
    /// Sort template.
    pub sort: Option<Value>,
    /// Skip, literal or template.
    pub skip: Option<Value>,
    /// Limit, literal or template.
    pub limit: Value,
    /// Data loader settings.
    pub data_loader: DataLoaderSettings,
}

/// A [`QueryMapping`] with its placeholders resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedQuery {
    /// Database to query.
    pub db: String,
    /// Collection to query.
    pub collection: String,
    /// Filter; `{}` when the mapping declares none.
    pub find: Value,
    /// Sort.
    pub sort: Option<Value>,
    /// Skip.
    pub skip: Option<Value>,
    /// Limit.
    pub limit: Value,
}

impl QueryMapping {
    /// Resolves the mapping's placeholders.
    ///
    /// # Errors
    ///
    /// Fails if a placeholder is not bound.
    pub fn interpolate(&self, bindings: &Bindings<'_>) -> Result<ResolvedQuery, InterpolationError> {
        let resolve = |template: &Option<Value>| {
            template
                .as_ref()
                .map(|t| interpolate(t, bindings))
                .transpose()
        };
        Ok(ResolvedQuery {
            db: self.db.clone(),
            collection: self.collection.clone(),
            find: resolve(&self.find)?.unwrap_or_else(|| Value::Object(Map::new())),
            sort: resolve(&self.sort)?,
            skip: resolve(&self.skip)?,
            limit: interpolate(&self.limit, bindings)?,
        })
    }
}

/// A field computed with an aggregation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationMapping {
    /// Database to aggregate.
    pub db: String,
    /// Collection to aggregate.
    pub collection: String,
    /// Stage templates.
    pub stages: Vec<Value>,
    /// Let stages spill to disk.
    pub allow_disk_use: bool,
    /// Data loader settings.
    pub data_loader: DataLoaderSettings,
}

impl AggregationMapping {
    /// Resolves the placeholders of every stage.
    ///
    /// # Errors
    ///
    /// Fails if a placeholder is not bound.
    pub fn interpolate(&self, bindings: &Bindings<'_>) -> Result<Vec<Value>, InterpolationError> {
        self.stages.iter().map(|stage| interpolate(stage, bindings)).collect()
    }
}

/// How a single field is resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldMapping {
    /// Copy of another field of the source document.
    Rename(String),
    /// A find.
    Query(QueryMapping),
    /// An aggregation.
    Aggregation(AggregationMapping),
}

/// Field mappings of one object type, by field name.
pub type TypeMapping = BTreeMap<String, FieldMapping>;

fn wrong_type(type_name: &str, field: &str, key: &str, expected: &str, found: &Value) -> AppDefinitionError {
    AppDefinitionError::mapping(
        type_name,
        field,
        format!("'{key}' must be {expected} but was {}", json_type(found)),
    )
}

pub(crate) const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn required_string(type_name: &str, field: &str, doc: &Map<String, Value>, key: &str) -> AppDefinitionResult<String> {
    match doc.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(wrong_type(type_name, field, key, "a string", other)),
        None => Err(AppDefinitionError::mapping(
            type_name,
            field,
            format!("{key} could not be null"),
        )),
    }
}

fn optional_object(type_name: &str, field: &str, doc: &Map<String, Value>, key: &str) -> AppDefinitionResult<Option<Value>> {
    match doc.get(key) {
        None => Ok(None),
        Some(value @ Value::Object(_)) => Ok(Some(value.clone())),
        Some(other) => Err(wrong_type(type_name, field, key, "an object", other)),
    }
}

/// Parses the field mappings of `type_name`.
pub(crate) fn parse_type_mapping(
    type_name: &str,
    value: &Value,
    limits: &MappingLimits,
) -> AppDefinitionResult<TypeMapping> {
    let Value::Object(fields) = value else {
        return Err(AppDefinitionError::mapping(
            type_name,
            "*",
            format!("type mappings must be an object but was {}", json_type(value)),
        ));
    };

    fields
        .iter()
        .map(|(field, mapping)| Ok((field.clone(), parse_field(type_name, field, mapping, limits)?)))
        .collect()
}

fn parse_field(
    type_name: &str,
    field: &str,
    mapping: &Value,
    limits: &MappingLimits,
) -> AppDefinitionResult<FieldMapping> {
    let doc = match mapping {
        Value::String(alias) => return Ok(FieldMapping::Rename(alias.clone())),
        Value::Object(doc) => doc,
        other => {
            return Err(AppDefinitionError::mapping(
                type_name,
                field,
                format!("a field mapping must be a string or an object but was {}", json_type(other)),
            ))
        }
    };

    let db = required_string(type_name, field, doc, "db")?;
    let collection = required_string(type_name, field, doc, "collection")?;
    let data_loader = doc
        .get("dataLoader")
        .map(|settings| DataLoaderSettings::parse(type_name, field, settings))
        .transpose()?
        .unwrap_or_default();

    if let Some(stages) = doc.get("stages") {
        let Value::Array(stages) = stages else {
            return Err(wrong_type(type_name, field, "stages", "an array", stages));
        };
        return Ok(FieldMapping::Aggregation(AggregationMapping {
            db,
            collection,
            stages: stages.clone(),
            allow_disk_use: doc.get("allowDiskUse").and_then(Value::as_bool).unwrap_or(false),
            data_loader,
        }));
    }

    let limit = match doc.get("limit") {
        None => Value::from(limits.default_limit),
        Some(template @ Value::Object(_)) => template.clone(),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(n) if n > limits.max_limit => {
                return Err(AppDefinitionError::mapping(
                    type_name,
                    field,
                    format!("'limit' cannot be greater than {}", limits.max_limit),
                ))
            }
            Some(n) => Value::from(n),
            None => {
                return Err(AppDefinitionError::mapping(
                    type_name,
                    field,
                    "'limit' must be a non-negative integer",
                ))
            }
        },
        Some(other) => return Err(wrong_type(type_name, field, "limit", "a number or an object", other)),
    };

    let skip = match doc.get("skip") {
        None => None,
        Some(value @ (Value::Object(_) | Value::Number(_))) => Some(value.clone()),
        Some(other) => return Err(wrong_type(type_name, field, "skip", "a number or an object", other)),
    };

    Ok(FieldMapping::Query(QueryMapping {
        db,
        collection,
        find: optional_object(type_name, field, doc, "find")?,
        sort: optional_object(type_name, field, doc, "sort")?,
        skip,
        limit,
        data_loader,
    }))
}
