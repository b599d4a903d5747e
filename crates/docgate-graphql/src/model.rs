//! App definitions.
//!
//! An app definition is a stored document with three members:
//!
//! ```json
//! {
//!   "descriptor": {"name": "shop", "uri": "shop", "description": "", "enabled": true},
//!   "schema": "type Query { products: [Product] } type Product { name: String }",
//!   "mappings": {"Query": {"products": {"db": "shop", "collection": "products"}}}
//! }
//! ```
//!
//! [`AppDefinition::build`] turns the document, as stored, into the validated
//! model served by the GraphQL service.

use crate::error::{AppDefinitionError, AppDefinitionResult};
use crate::mapping::{json_type, parse_type_mapping, DataLoaderSettings, FieldMapping, MappingLimits, TypeMapping};
use crate::schema::SchemaDocument;
use docgate_store::unescape_keys;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Identity and state of an app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDescriptor {
    /// Display name.
    pub name: Option<String>,
    /// URI under the GraphQL mount; defaults to the name.
    pub uri: Option<String>,
    /// Free text.
    pub description: String,
    /// Disabled apps are not served.
    pub enabled: bool,
}

impl Default for AppDescriptor {
    fn default() -> Self {
        Self {
            name: None,
            uri: None,
            description: String::new(),
            enabled: true,
        }
    }
}

impl AppDescriptor {
    fn parse(value: &Value) -> AppDefinitionResult<Self> {
        let Value::Object(descriptor) = value else {
            return Err(AppDefinitionError::descriptor(format!(
                "'descriptor' field must be an object but was {}",
                json_type(value)
            )));
        };

        let string = |key: &str| match descriptor.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(AppDefinitionError::descriptor(format!(
                "'{key}' must be a string but was {}",
                json_type(other)
            ))),
        };

        let name = string("name")?;
        let uri = string("uri")?.or_else(|| name.clone());
        let description = string("description")?.unwrap_or_default();
        let enabled = match descriptor.get("enabled") {
            None => true,
            Some(Value::Bool(enabled)) => *enabled,
            Some(other) => {
                return Err(AppDefinitionError::descriptor(format!(
                    "'enabled' must be a boolean but was {}",
                    json_type(other)
                )))
            }
        };

        Ok(Self {
            name,
            uri,
            description,
            enabled,
        })
    }
}

/// A validated app definition.
#[derive(Debug, Clone, PartialEq)]
pub struct AppDefinition {
    id: Option<String>,
    descriptor: AppDescriptor,
    schema: SchemaDocument,
    objects: BTreeMap<String, TypeMapping>,
    others: BTreeMap<String, Value>,
}

impl AppDefinition {
    /// Validates a stored app definition document.
    ///
    /// Mapping keys may be escaped the way stored documents escape `$` and
    /// `.`; they are unescaped before parsing.
    ///
    /// # Errors
    ///
    /// Returns the first problem found: a malformed descriptor, a missing or
    /// invalid schema, missing mappings, no `Query` mapping, a mapping for an
    /// undeclared type or field, or a malformed field mapping.
    pub fn build(document: &Value, limits: &MappingLimits) -> AppDefinitionResult<Self> {
        let Value::Object(document) = document else {
            return Err(AppDefinitionError::NotAnObject {
                found: json_type(document),
            });
        };

        let descriptor = document
            .get("descriptor")
            .map(AppDescriptor::parse)
            .transpose()?
            .unwrap_or_default();

        let schema = match document.get("schema") {
            None | Some(Value::Null) => return Err(AppDefinitionError::MissingSchema),
            Some(Value::String(sdl)) => SchemaDocument::parse(sdl)?,
            Some(other) => {
                return Err(AppDefinitionError::schema(format!(
                    "'schema' field must be a string but was {}",
                    json_type(other)
                )))
            }
        };

        let mappings = match document.get("mappings") {
            None => return Err(AppDefinitionError::MissingMappings),
            Some(Value::Object(mappings)) => {
                match unescape_keys(Value::Object(mappings.clone())) {
                    Value::Object(mappings) => mappings,
                    _ => Map::new(),
                }
            }
            Some(other) => {
                return Err(AppDefinitionError::InvalidMappings {
                    found: json_type(other),
                })
            }
        };

        let mut objects = BTreeMap::new();
        let mut others = BTreeMap::new();
        for (type_name, mapping) in &mappings {
            let Some(declared) = schema.get(type_name) else {
                return Err(AppDefinitionError::UndeclaredType {
                    type_name: type_name.clone(),
                });
            };

            if !schema.is_object(type_name) {
                others.insert(type_name.clone(), mapping.clone());
                continue;
            }

            let fields = parse_type_mapping(type_name, mapping, limits)?;
            if let Some(field) = fields.keys().find(|field| !declared.has_field(field)) {
                return Err(AppDefinitionError::mapping(
                    type_name.as_str(),
                    field.as_str(),
                    format!("the field is not declared by type {type_name}"),
                ));
            }
            objects.insert(type_name.clone(), fields);
        }

        if objects.get("Query").map_or(true, BTreeMap::is_empty) {
            return Err(AppDefinitionError::MissingQueryMappings);
        }

        let id = match document.get("_id") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };

        Ok(Self {
            id,
            descriptor,
            schema,
            objects,
            others,
        })
    }

    /// Returns the stored document id.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns the descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &AppDescriptor {
        &self.descriptor
    }

    /// Returns the URI the app is served under: the descriptor URI, else the
    /// name, else the document id.
    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        self.descriptor.uri.as_deref().or(self.id.as_deref())
    }

    /// Returns true if the app is served.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.descriptor.enabled
    }

    /// Returns the schema.
    #[must_use]
    pub fn schema(&self) -> &SchemaDocument {
        &self.schema
    }

    /// Returns the field mappings of an object type.
    #[must_use]
    pub fn type_mapping(&self, type_name: &str) -> Option<&TypeMapping> {
        self.objects.get(type_name)
    }

    /// Iterates over the mapped object types.
    pub fn object_mappings(&self) -> impl Iterator<Item = (&str, &TypeMapping)> {
        self.objects.iter().map(|(name, mapping)| (name.as_str(), mapping))
    }

    /// Returns the fields fetched through a data loader, keyed
    /// `Type_field`.
    #[must_use]
    pub fn data_loaders(&self) -> BTreeMap<String, DataLoaderSettings> {
        self.objects
            .iter()
            .flat_map(|(type_name, fields)| {
                fields.iter().filter_map(move |(field, mapping)| {
                    let settings = match mapping {
                        FieldMapping::Query(query) => query.data_loader,
                        FieldMapping::Aggregation(aggregation) => aggregation.data_loader,
                        FieldMapping::Rename(_) => return None,
                    };
                    settings
                        .is_enabled()
                        .then(|| (format!("{type_name}_{field}"), settings))
                })
            })
            .collect()
    }

    /// Returns the raw mapping of a non-object type (enum, union,
    /// interface, scalar).
    #[must_use]
    pub fn other_mapping(&self, type_name: &str) -> Option<&Value> {
        self.others.get(type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shop() -> Value {
        json!({
            "_id": "shop-def",
            "descriptor": {"name": "Shop", "uri": "shop", "description": "products"},
            "schema": "type Product { name: String price: Float } \
                       enum Status { OPEN CLOSED } \
                       type Query { products(category: String): [Product] status: Status }",
            "mappings": {
                "Query": {
                    "products": {
                        "db": "shop",
                        "collection": "products",
                        "find": {"category": {"_$arg": "category"}}
                    }
                },
                "Product": {"name": "title"},
                "Status": {"OPEN": 1, "CLOSED": 0}
            }
        })
    }

    fn build(document: &Value) -> AppDefinitionResult<AppDefinition> {
        AppDefinition::build(document, &MappingLimits::default())
    }

    #[test]
    fn test_build_valid_definition() {
        let app = build(&shop()).unwrap();

        assert_eq!(app.uri(), Some("shop"));
        assert_eq!(app.id(), Some("shop-def"));
        assert_eq!(app.descriptor().name.as_deref(), Some("Shop"));
        assert!(app.is_enabled());
        assert!(app.schema().is_object("Product"));

        let Some(FieldMapping::Query(products)) = app.type_mapping("Query").and_then(|m| m.get("products")) else {
            panic!("expected a query mapping");
        };
        assert_eq!(products.find, Some(json!({"category": {"$arg": "category"}})));
        assert_eq!(app.other_mapping("Status"), Some(&json!({"OPEN": 1, "CLOSED": 0})));
        assert_eq!(app.object_mappings().count(), 2);
        assert!(app.data_loaders().is_empty());
    }

    #[test]
    fn test_data_loaders() {
        let mut document = shop();
        document["mappings"]["Query"]["products"]["dataLoader"] = json!({"caching": true});
        let app = build(&document).unwrap();

        let loaders = app.data_loaders();
        assert_eq!(loaders.len(), 1);
        assert!(loaders["Query_products"].caching);
        assert!(!loaders["Query_products"].batching);
    }

    #[test]
    fn test_uri_defaults() {
        let mut document = shop();
        document["descriptor"] = json!({"name": "Shop"});
        assert_eq!(build(&document).unwrap().uri(), Some("Shop"));

        document.as_object_mut().unwrap().remove("descriptor");
        let app = build(&document).unwrap();
        assert_eq!(app.uri(), Some("shop-def"));
        assert!(app.is_enabled());
    }

    #[test]
    fn test_rejections() {
        let cases: [(fn(&mut Value), &str); 11] = [
            (|d: &mut Value| d["descriptor"] = json!("shop"), "'descriptor' field must be an object"),
            (|d: &mut Value| d["descriptor"]["enabled"] = json!("yes"), "'enabled' must be a boolean"),
            (|d: &mut Value| { d.as_object_mut().unwrap().remove("schema"); }, "missing schema"),
            (|d: &mut Value| d["schema"] = json!(42), "'schema' field must be a string"),
            (|d: &mut Value| d["schema"] = json!("type Product { name: String }"), "invalid GraphQL schema"),
            (|d: &mut Value| { d.as_object_mut().unwrap().remove("mappings"); }, "missing mappings"),
            (|d: &mut Value| d["mappings"] = json!([]), "'mappings' field must be an object"),
            (|d: &mut Value| d["mappings"]["Query"] = json!({}), "missing or empty mappings for type Query"),
            (|d: &mut Value| d["mappings"]["Order"] = json!({}), "type Order: the type is not declared"),
            (|d: &mut Value| d["mappings"]["Product"] = json!({"sku": "code"}), "not declared by type Product"),
            (|d: &mut Value| d["mappings"]["Query"]["products"]["db"] = json!(null), "'db' must be a string"),
        ];

        for (mutate, expected) in cases {
            let mut document = shop();
            mutate(&mut document);
            let err = build(&document).unwrap_err();
            assert!(
                err.to_string().contains(expected),
                "expected '{expected}' in '{err}'"
            );
            assert!(!err.is_conflict());
        }

        assert!(matches!(
            build(&json!([])).unwrap_err(),
            AppDefinitionError::NotAnObject { found: "array" }
        ));
    }
}
