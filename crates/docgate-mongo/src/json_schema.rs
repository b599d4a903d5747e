//! JSON Schema validation of written documents.
//!
//! A collection opts in through its properties, written with
//! `PUT /{db}/{coll}` and stored in the `_properties` collection:
//!
//! ```json
//! { "jsonSchema": { "schemaId": "product", "schemaStoreDb": "catalog" } }
//! ```
//!
//! Schemas are documents of the `_schemas` collection of the schema store
//! database (the collection's own database when `schemaStoreDb` is absent).
//! Keys starting with `$` are stored escaped (`_$schema`, `_$ref`).
//!
//! Three interceptors cooperate:
//!
//! | Interceptor | Point | Checks |
//! |-------------|-------|--------|
//! | `collectionPropsInjector` | `REQUEST_BEFORE_AUTH` | attaches [`COLLECTION_PROPS`] |
//! | `jsonSchemaBeforeWrite` | `REQUEST_AFTER_AUTH` | PUT and POST content, before the write |
//! | `jsonSchemaAfterWrite` | `RESPONSE` | the PATCHed document, after the write |
//!
//! A PATCH can only be judged on the document the store produced, so the
//! after-write checker validates the new version and rolls the write back
//! when it violates the schema.

use crate::resource::{ResourceRef, RESOURCE};
use docgate_core::{AttachmentKey, BoxFuture, Exchange, GatewayError, GatewayResult, InterceptPoint};
use docgate_pipeline::{Interceptor, InterceptorDescriptor};
use docgate_store::{
    unescape_keys, DocumentRef, Documents, Etag, OperationResult, SharedDocuments, DB_OPERATION_RESULT,
    ETAG_FIELD,
};
use http::header::ETAG;
use http::{Method, StatusCode};
use jsonschema::Validator;
use serde_json::{Map, Value};

/// Properties of the addressed collection.
pub const COLLECTION_PROPS: AttachmentKey<Value> = AttachmentKey::new("collection-props");

/// Collection holding collection properties, keyed by collection name.
pub const PROPERTIES_COLLECTION: &str = "_properties";

/// Collection holding JSON schemas.
pub const SCHEMAS_COLLECTION: &str = "_schemas";

const JSON_SCHEMA_PROPERTY: &str = "jsonSchema";
const SCHEMA_ID_PROPERTY: &str = "schemaId";
const SCHEMA_STORE_DB_PROPERTY: &str = "schemaStoreDb";

fn collection_of(resource: &ResourceRef) -> Option<(&str, &str)> {
    match resource {
        ResourceRef::Collection { db, collection } => Some((db.as_str(), collection.as_str())),
        ResourceRef::Document(target) => Some((target.db.as_str(), target.collection.as_str())),
        ResourceRef::Root | ResourceRef::Database { .. } => None,
    }
}

/// The `jsonSchema` arguments of the addressed collection, if it has any.
fn schema_args(exchange: &Exchange) -> Option<&Map<String, Value>> {
    exchange
        .attachment(COLLECTION_PROPS)
        .and_then(|props| props.get(JSON_SCHEMA_PROPERTY))
        .and_then(Value::as_object)
}

/// Interceptor attaching the collection properties to document requests.
pub struct CollectionPropsInjector {
    store: SharedDocuments,
}

impl CollectionPropsInjector {
    /// Registration name.
    pub const NAME: &'static str = "collectionPropsInjector";

    /// Creates the injector.
    #[must_use]
    pub fn new(store: SharedDocuments) -> Self {
        Self { store }
    }

    /// Returns the registration descriptor.
    #[must_use]
    pub fn descriptor() -> InterceptorDescriptor {
        InterceptorDescriptor::new(Self::NAME, InterceptPoint::RequestBeforeAuth)
            .description("injects the collection properties into document requests")
            .priority(i32::MIN + 1)
    }
}

impl Interceptor for CollectionPropsInjector {
    fn resolve(&self, exchange: &Exchange) -> bool {
        !exchange.is_in_error()
            && *exchange.method() != Method::OPTIONS
            && exchange
                .attachment(RESOURCE)
                .and_then(collection_of)
                .is_some_and(|(_, collection)| collection != PROPERTIES_COLLECTION)
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            let Some((db, collection)) = exchange.attachment(RESOURCE).and_then(collection_of) else {
                return Ok(());
            };
            let target = DocumentRef::new(db, PROPERTIES_COLLECTION, collection);

            if let Some(props) = self.store.get_document(&target).await? {
                exchange.attach(COLLECTION_PROPS, props);
            }
            Ok(())
        })
    }
}

/// A compiled schema and the id it was stored under.
struct LoadedSchema {
    id: String,
    validator: Validator,
}

impl LoadedSchema {
    /// Loads the schema named by `args`.
    ///
    /// The inner error is a configuration problem of the collection, answered
    /// with 500; the outer one is a store failure.
    async fn load(
        store: &dyn Documents,
        db: &str,
        args: &Map<String, Value>,
    ) -> GatewayResult<Result<Self, String>> {
        let id = match args.get(SCHEMA_ID_PROPERTY) {
            None => {
                return Ok(Err(format!(
                    "wrong 'jsonSchema': missing property {SCHEMA_ID_PROPERTY}"
                )))
            }
            Some(Value::String(id)) => id.clone(),
            Some(_) => return Ok(Err("wrong 'jsonSchema': schema 'id' is not valid".to_string())),
        };

        let store_db = match args.get(SCHEMA_STORE_DB_PROPERTY) {
            None => db.to_string(),
            Some(Value::String(store_db)) => store_db.clone(),
            Some(_) => {
                return Ok(Err(format!(
                    "wrong 'jsonSchema': property {SCHEMA_STORE_DB_PROPERTY} must be a string"
                )))
            }
        };

        let target = DocumentRef::new(store_db, SCHEMAS_COLLECTION, id.as_str());
        let Some(stored) = store.get_document(&target).await? else {
            return Ok(Err(format!("wrong 'jsonSchema': schema {target} not found")));
        };

        let mut schema = unescape_keys(stored);
        if let Value::Object(fields) = &mut schema {
            fields.remove("_id");
            fields.remove(ETAG_FIELD);
        }

        Ok(jsonschema::validator_for(&schema)
            .map(|validator| Self { id, validator })
            .map_err(|e| format!("wrong 'jsonSchema': schema {target} is not valid: {e}")))
    }

    /// Returns the violation message for `document`, if it does not conform.
    fn violation(&self, document: &Value) -> Option<String> {
        let errors: Vec<String> = self
            .validator
            .iter_errors(document)
            .map(|error| error.to_string())
            .collect();

        if errors.is_empty() {
            None
        } else {
            Some(format!(
                "Request content violates schema {}: {}",
                self.id,
                errors.join(", ")
            ))
        }
    }
}

/// Interceptor validating PUT and POST content before it is written.
pub struct JsonSchemaBeforeWrite {
    store: SharedDocuments,
}

impl JsonSchemaBeforeWrite {
    /// Registration name.
    pub const NAME: &'static str = "jsonSchemaBeforeWrite";

    /// Creates the checker.
    #[must_use]
    pub fn new(store: SharedDocuments) -> Self {
        Self { store }
    }

    /// Returns the registration descriptor.
    #[must_use]
    pub fn descriptor() -> InterceptorDescriptor {
        InterceptorDescriptor::new(Self::NAME, InterceptPoint::RequestAfterAuth)
            .description("checks the request content against the collection's JSON schema")
    }
}

impl Interceptor for JsonSchemaBeforeWrite {
    fn resolve(&self, exchange: &Exchange) -> bool {
        if exchange.is_in_error() || schema_args(exchange).is_none() {
            return false;
        }
        matches!(
            (exchange.method(), exchange.attachment(RESOURCE)),
            (&Method::PUT, Some(ResourceRef::Document(_)))
                | (&Method::POST, Some(ResourceRef::Collection { .. }))
        )
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            let Some(args) = schema_args(exchange).cloned() else {
                return Ok(());
            };
            let Some((db, _)) = exchange.attachment(RESOURCE).and_then(collection_of) else {
                return Ok(());
            };
            let db = db.to_string();

            let schema = match LoadedSchema::load(self.store.as_ref(), &db, &args).await? {
                Ok(schema) => schema,
                Err(message) => {
                    exchange.set_in_error(StatusCode::INTERNAL_SERVER_ERROR, message);
                    return Ok(());
                }
            };

            let content = exchange.content()?.cloned().unwrap_or_else(|| Value::Object(Map::new()));
            if let Some(message) = schema.violation(&content) {
                exchange.set_in_error(StatusCode::BAD_REQUEST, message);
            }
            Ok(())
        })
    }
}

/// Interceptor validating PATCHed documents, rolling back violating writes.
pub struct JsonSchemaAfterWrite {
    store: SharedDocuments,
}

impl JsonSchemaAfterWrite {
    /// Registration name.
    pub const NAME: &'static str = "jsonSchemaAfterWrite";

    /// Creates the checker.
    #[must_use]
    pub fn new(store: SharedDocuments) -> Self {
        Self { store }
    }

    /// Returns the registration descriptor.
    #[must_use]
    pub fn descriptor() -> InterceptorDescriptor {
        InterceptorDescriptor::new(Self::NAME, InterceptPoint::Response)
            .description("checks the written document against the collection's JSON schema")
    }

    /// Restores the previous version and its ETag header.
    async fn rollback(&self, exchange: &mut Exchange, result: &OperationResult) -> GatewayResult<()> {
        tracing::warn!(
            request_id = %exchange.request_id(),
            target = %result.target,
            error = exchange.error_message().unwrap_or_default(),
            "Written document violates its schema, rolling back the write"
        );

        match result.old_data.as_ref().and_then(Etag::of_document) {
            Some(etag) => exchange.set_response_header(ETAG, etag.as_str()),
            None => {
                exchange.response_headers_mut().remove(ETAG);
            }
        }
        docgate_telemetry::metrics::record_rollback("schema_violation");

        match self.store.rollback(result).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!(
                    target = %result.target,
                    "Nothing to roll back, the document changed since the write"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(target = %result.target, error = %e, "Rollback failed");
                Err(GatewayError::from(e))
            }
        }
    }
}

impl Interceptor for JsonSchemaAfterWrite {
    fn resolve(&self, exchange: &Exchange) -> bool {
        !exchange.is_in_error()
            && *exchange.method() == Method::PATCH
            && matches!(exchange.attachment(RESOURCE), Some(ResourceRef::Document(_)))
            && schema_args(exchange).is_some()
            && exchange
                .attachment(DB_OPERATION_RESULT)
                .is_some_and(OperationResult::is_success)
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            let (Some(args), Some(result)) = (
                schema_args(exchange).cloned(),
                exchange.attachment(DB_OPERATION_RESULT).cloned(),
            ) else {
                return Ok(());
            };

            match LoadedSchema::load(self.store.as_ref(), &result.target.db, &args).await? {
                Ok(schema) => {
                    let mut document = result.new_data.clone().unwrap_or_else(|| Value::Object(Map::new()));
                    if let Value::Object(fields) = &mut document {
                        fields.remove(ETAG_FIELD);
                    }
                    if let Some(message) = schema.violation(&document) {
                        exchange.set_in_error(StatusCode::BAD_REQUEST, message);
                    }
                }
                Err(message) => exchange.set_in_error(StatusCode::INTERNAL_SERVER_ERROR, message),
            }

            if exchange.is_in_error() {
                self.rollback(exchange, &result).await?;
            }
            Ok(())
        })
    }
}
