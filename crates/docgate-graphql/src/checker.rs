//! App definition checker.
//!
//! App definitions are written through the document API like any other
//! document, and are validated only once stored: the store is what
//! unflattens dot-notation keys and applies update operators, so a PATCH can
//! only be judged on the resulting document.
//!
//! The checker runs at [`InterceptPoint::Response`] after every successful
//! write to the app definition collection. When the stored document is not a
//! valid definition, or its URI is already served by another definition, the
//! write is rolled back and the response turns into a 400 or a 409. Accepted
//! definitions go to the [`AppDefinitionCache`](crate::AppDefinitionCache).

use crate::cache::SharedAppCache;
use crate::error::AppDefinitionError;
use crate::mapping::MappingLimits;
use crate::model::AppDefinition;
use docgate_config::GraphqlConfig;
use docgate_core::{BoxFuture, Exchange, GatewayError, GatewayResult, InterceptPoint};
use docgate_pipeline::{Interceptor, InterceptorDescriptor};
use docgate_store::{Etag, Filter, OperationResult, SharedDocuments, DB_OPERATION_RESULT};
use http::header::{ETAG, LOCATION};
use http::Method;
use serde_json::{json, Value};

/// Validates written app definitions, rolling back rejected writes.
pub struct AppDefinitionChecker {
    store: SharedDocuments,
    cache: SharedAppCache,
    db: String,
    collection: String,
    limits: MappingLimits,
}

impl AppDefinitionChecker {
    /// Registration name.
    pub const NAME: &'static str = "appDefinitionChecker";

    /// Creates the checker for the configured app definition collection.
    #[must_use]
    pub fn new(store: SharedDocuments, cache: SharedAppCache, config: &GraphqlConfig) -> Self {
        Self {
            store,
            cache,
            db: config.db.clone(),
            collection: config.collection.clone(),
            limits: MappingLimits::from(config),
        }
    }

    /// Returns the registration descriptor.
    #[must_use]
    pub fn descriptor() -> InterceptorDescriptor {
        InterceptorDescriptor::new(Self::NAME, InterceptPoint::Response)
            .description("validates GraphQL app definitions after they are written")
    }

    /// Validates the stored document and checks its URI is free.
    async fn check(&self, result: &OperationResult) -> GatewayResult<Result<AppDefinition, AppDefinitionError>> {
        let Some(document) = &result.new_data else {
            return Ok(Err(AppDefinitionError::NotAnObject { found: "null" }));
        };

        let app = match AppDefinition::build(document, &self.limits) {
            Ok(app) => app,
            Err(e) => return Ok(Err(e)),
        };

        let Some(uri) = app.uri() else {
            return Ok(Ok(app));
        };

        // Best effort: two concurrent writes claiming the same URI can both pass.
        let filter = Filter::parse(&json!({
            "$or": [
                {"descriptor.uri": uri},
                {"descriptor.name": uri},
                {"_id": uri}
            ]
        }))?;
        let others = self
            .store
            .find(&self.db, &self.collection, &filter, &Default::default())
            .await?;

        let taken = others.iter().any(|other| {
            other.get("_id").and_then(Value::as_str) != Some(result.target.id.as_str())
                && stored_uri(other) == Some(uri)
        });

        if taken {
            return Ok(Err(AppDefinitionError::DuplicateUri {
                uri: uri.to_string(),
            }));
        }
        Ok(Ok(app))
    }

    /// Rolls back the write and turns the response into a client error.
    async fn reject(
        &self,
        exchange: &mut Exchange,
        result: &OperationResult,
        err: AppDefinitionError,
    ) -> GatewayResult<()> {
        tracing::warn!(
            request_id = %exchange.request_id(),
            target = %result.target,
            error = %err,
            "Rejecting app definition, rolling back the write"
        );

        exchange.set_in_error(err.status_code(), err.to_string());
        exchange.response_headers_mut().remove(LOCATION);
        match result.old_data.as_ref().and_then(Etag::of_document) {
            Some(etag) => exchange.set_response_header(ETAG, etag.as_str()),
            None => {
                exchange.response_headers_mut().remove(ETAG);
            }
        }

        docgate_telemetry::metrics::record_rollback(if err.is_conflict() {
            "conflict"
        } else {
            "bad_definition"
        });

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

    /// Rolls back a write the checker could not judge, then fails with `err`.
    async fn abort(&self, result: &OperationResult, err: GatewayError) -> GatewayResult<()> {
        tracing::error!(
            target = %result.target,
            error = %err,
            "App definition check failed, rolling back the write"
        );
        docgate_telemetry::metrics::record_rollback("check_failed");

        match self.store.rollback(result).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                target = %result.target,
                "Nothing to roll back, the document changed since the write"
            ),
            Err(e) => tracing::error!(target = %result.target, error = %e, "Rollback failed"),
        }
        Err(err)
    }

    fn forget(&self, result: &OperationResult) {
        if let Some(uri) = result.old_data.as_ref().and_then(stored_uri) {
            if self.cache.invalidate(uri).is_some() {
                tracing::debug!(uri, "App definition evicted");
            }
        }
    }
}

/// The URI a stored definition claims, without validating it.
fn stored_uri(document: &Value) -> Option<&str> {
    let descriptor = document.get("descriptor");
    descriptor
        .and_then(|d| d.get("uri"))
        .and_then(Value::as_str)
        .or_else(|| descriptor.and_then(|d| d.get("name")).and_then(Value::as_str))
        .or_else(|| document.get("_id").and_then(Value::as_str))
}

fn is_write(method: &Method) -> bool {
    *method == Method::PUT || *method == Method::PATCH || *method == Method::POST
}

impl Interceptor for AppDefinitionChecker {
    fn resolve(&self, exchange: &Exchange) -> bool {
        let method = exchange.method();
        if exchange.is_in_error() || !(is_write(method) || *method == Method::DELETE) {
            return false;
        }
        exchange.attachment(DB_OPERATION_RESULT).is_some_and(|result| {
            result.is_success()
                && result.target.db == self.db
                && result.target.collection == self.collection
        })
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            let Some(result) = exchange.attachment(DB_OPERATION_RESULT).cloned() else {
                return Ok(());
            };

            if *exchange.method() == Method::DELETE {
                self.forget(&result);
                return Ok(());
            }

            let checked = match self.check(&result).await {
                Ok(checked) => checked,
                Err(e) => return self.abort(&result, e).await,
            };

            match checked {
                Ok(app) => {
                    self.forget(&result);
                    let app = self.cache.put(app);
                    tracing::info!(
                        request_id = %exchange.request_id(),
                        uri = app.uri().unwrap_or_default(),
                        "App definition accepted"
                    );
                    Ok(())
                }
                Err(err) => self.reject(exchange, &result, err).await,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::AppDefinitionCache;
    use docgate_store::{
        DocumentRef, Documents, FindOptions, InMemoryDocuments, StoreError, StoreResult, WriteMode, WriteRequest,
    };
    use http::StatusCode;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// In-memory store counting rollbacks, with a switchable `find` outage.
    #[derive(Default)]
    struct CountingDocuments {
        inner: InMemoryDocuments,
        rollbacks: AtomicUsize,
        find_unavailable: AtomicBool,
    }

    impl CountingDocuments {
        fn rollbacks(&self) -> usize {
            self.rollbacks.load(Ordering::SeqCst)
        }
    }

    impl Documents for CountingDocuments {
        fn databases(&self) -> BoxFuture<'_, StoreResult<Vec<String>>> {
            self.inner.databases()
        }

        fn collections<'a>(&'a self, db: &'a str) -> BoxFuture<'a, StoreResult<Vec<String>>> {
            self.inner.collections(db)
        }

        fn get_document<'a>(&'a self, target: &'a DocumentRef) -> BoxFuture<'a, StoreResult<Option<Value>>> {
            self.inner.get_document(target)
        }

        fn find<'a>(
            &'a self,
            db: &'a str,
            collection: &'a str,
            filter: &'a Filter,
            options: &'a FindOptions,
        ) -> BoxFuture<'a, StoreResult<Vec<Value>>> {
            if self.find_unavailable.load(Ordering::SeqCst) {
                return Box::pin(async { Err(StoreError::Unavailable("connection reset".to_string())) });
            }
            self.inner.find(db, collection, filter, options)
        }

        fn write_document(&self, request: WriteRequest) -> BoxFuture<'_, StoreResult<OperationResult>> {
            self.inner.write_document(request)
        }

        fn delete_document<'a>(
            &'a self,
            target: &'a DocumentRef,
            if_match: Option<&'a Etag>,
            check_etag: bool,
        ) -> BoxFuture<'a, StoreResult<OperationResult>> {
            self.inner.delete_document(target, if_match, check_etag)
        }

        fn rollback<'a>(&'a self, result: &'a OperationResult) -> BoxFuture<'a, StoreResult<bool>> {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            self.inner.rollback(result)
        }
    }

    fn valid(uri: &str) -> Value {
        json!({
            "descriptor": {"name": uri, "uri": uri},
            "schema": "type Query { hello: String }",
            "mappings": {"Query": {"hello": "greeting"}}
        })
    }

    struct Fixture {
        store: Arc<CountingDocuments>,
        cache: SharedAppCache,
        checker: AppDefinitionChecker,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(CountingDocuments::default());
            let cache: SharedAppCache = Arc::new(AppDefinitionCache::new());
            let shared: SharedDocuments = store.clone();
            let checker = AppDefinitionChecker::new(shared, Arc::clone(&cache), &GraphqlConfig::default());
            Self { store, cache, checker }
        }

        async fn write(&self, method: Method, id: &str, mode: WriteMode, content: Value) -> Exchange {
            let request = WriteRequest::new("docgate", "gqlapps", mode, content.as_object().cloned().unwrap()).id(id);
            let result = self.store.write_document(request).await.unwrap();
            assert!(result.is_success());

            let mut exchange = Exchange::new(method, format!("/docgate/gqlapps/{id}"), "");
            exchange.set_status(result.http_code);
            if let Some(etag) = &result.etag {
                exchange.set_response_header(ETAG, etag.as_str());
            }
            exchange.attach(DB_OPERATION_RESULT, result);
            exchange
        }

        async fn run(&self, exchange: &mut Exchange) {
            assert!(self.checker.resolve(exchange));
            self.checker.handle(exchange).await.unwrap();
        }

        async fn stored(&self, id: &str) -> Option<Value> {
            self.store
                .get_document(&DocumentRef::new("docgate", "gqlapps", id))
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_valid_definition_is_cached() {
        let fixture = Fixture::new();
        let mut exchange = fixture.write(Method::PUT, "a1", WriteMode::Replace, valid("shop")).await;

        fixture.run(&mut exchange).await;

        assert!(!exchange.is_in_error());
        assert_eq!(exchange.status(), Some(StatusCode::CREATED));
        assert!(fixture.cache.get("shop").is_some());
    }

    #[tokio::test]
    async fn test_bad_definition_rolls_back_insert() {
        let fixture = Fixture::new();
        let mut invalid = valid("shop");
        invalid["mappings"] = json!({"Query": {}});
        let mut exchange = fixture.write(Method::PUT, "a1", WriteMode::Replace, invalid).await;

        fixture.run(&mut exchange).await;

        assert!(exchange.is_in_error());
        assert_eq!(exchange.status(), Some(StatusCode::BAD_REQUEST));
        assert!(exchange.error_message().unwrap().contains("Query"));
        assert!(exchange.response_headers().get(ETAG).is_none());
        assert!(fixture.stored("a1").await.is_none());
        assert!(fixture.cache.is_empty());
        assert_eq!(fixture.store.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_bad_patch_restores_previous_version() {
        let fixture = Fixture::new();
        let mut first = fixture.write(Method::PUT, "a1", WriteMode::Replace, valid("shop")).await;
        fixture.run(&mut first).await;
        let before = fixture.stored("a1").await.unwrap();

        let mut exchange = fixture
            .write(Method::PATCH, "a1", WriteMode::Update, json!({"$set": {"schema": "type X { y: Int }"}}))
            .await;
        fixture.run(&mut exchange).await;

        assert_eq!(exchange.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(fixture.stored("a1").await.unwrap(), before);
        assert_eq!(
            exchange.response_headers().get(ETAG).unwrap(),
            before["_etag"].as_str().unwrap()
        );
        assert!(fixture.cache.get("shop").is_some());
    }

    #[tokio::test]
    async fn test_uri_collision_is_a_conflict() {
        let fixture = Fixture::new();
        let mut first = fixture.write(Method::PUT, "a1", WriteMode::Replace, valid("shop")).await;
        fixture.run(&mut first).await;

        let cached = fixture.cache.len();

        let mut exchange = fixture.write(Method::PUT, "a2", WriteMode::Replace, valid("shop")).await;
        fixture.run(&mut exchange).await;

        assert!(exchange.is_in_error());
        assert_eq!(exchange.status(), Some(StatusCode::CONFLICT));
        assert_eq!(fixture.store.rollbacks(), 1);
        assert_eq!(fixture.cache.len(), cached);
        assert!(exchange.error_message().unwrap().contains("'shop'"));
        assert!(fixture.stored("a2").await.is_none());
        assert_eq!(fixture.cache.get("shop").unwrap().id(), Some("a1"));
    }

    #[tokio::test]
    async fn test_store_failure_during_check_rolls_back() {
        let fixture = Fixture::new();
        let mut exchange = fixture.write(Method::PUT, "a1", WriteMode::Replace, valid("shop")).await;
        fixture.store.find_unavailable.store(true, Ordering::SeqCst);

        assert!(fixture.checker.resolve(&exchange));
        let err = fixture.checker.handle(&mut exchange).await.unwrap_err();

        assert!(err.to_string().contains("connection reset"), "{err}");
        assert_eq!(fixture.store.rollbacks(), 1);
        assert!(fixture.stored("a1").await.is_none());
        assert!(fixture.cache.is_empty());
    }

    #[test]
    fn test_stored_uri_skips_non_string_values() {
        let document = json!({"_id": "a1", "descriptor": {"uri": null, "name": "shop"}});
        assert_eq!(stored_uri(&document), Some("shop"));

        let document = json!({"_id": "a1", "descriptor": {"uri": 3, "name": false}});
        assert_eq!(stored_uri(&document), Some("a1"));

        assert_eq!(stored_uri(&json!({"_id": 7})), None);
    }

    #[tokio::test]
    async fn test_rewriting_own_uri_is_not_a_conflict() {
        let fixture = Fixture::new();
        let mut first = fixture.write(Method::PUT, "a1", WriteMode::Replace, valid("shop")).await;
        fixture.run(&mut first).await;

        let mut renamed = valid("store");
        renamed["descriptor"]["description"] = json!("renamed");
        let mut exchange = fixture.write(Method::PUT, "a1", WriteMode::Replace, renamed).await;
        fixture.run(&mut exchange).await;

        assert!(!exchange.is_in_error());
        assert!(fixture.cache.get("shop").is_none());
        assert!(fixture.cache.get("store").is_some());
    }

    #[tokio::test]
    async fn test_resolve_scope() {
        let fixture = Fixture::new();
        let mut exchange = fixture.write(Method::PUT, "a1", WriteMode::Replace, valid("shop")).await;

        let mut elsewhere = exchange.detached_copy();
        let mut result = elsewhere.attachment(DB_OPERATION_RESULT).cloned().unwrap();
        result.target = DocumentRef::new("docgate", "other", "a1");
        elsewhere.attach(DB_OPERATION_RESULT, result);
        assert!(!fixture.checker.resolve(&elsewhere));

        let get = Exchange::new(Method::GET, "/docgate/gqlapps/a1", "");
        assert!(!fixture.checker.resolve(&get));

        exchange.set_in_error(StatusCode::PRECONDITION_FAILED, "etag mismatch");
        assert!(!fixture.checker.resolve(&exchange));
    }

    #[tokio::test]
    async fn test_delete_evicts() {
        let fixture = Fixture::new();
        let mut first = fixture.write(Method::PUT, "a1", WriteMode::Replace, valid("shop")).await;
        fixture.run(&mut first).await;

        let target = DocumentRef::new("docgate", "gqlapps", "a1");
        let result = fixture.store.delete_document(&target, None, false).await.unwrap();
        let mut exchange = Exchange::new(Method::DELETE, "/docgate/gqlapps/a1", "");
        exchange.attach(DB_OPERATION_RESULT, result);
        fixture.run(&mut exchange).await;

        assert!(fixture.cache.get("shop").is_none());
    }

    fn method_strategy() -> impl Strategy<Value = Method> {
        prop_oneof![
            Just(Method::GET),
            Just(Method::PUT),
            Just(Method::PATCH),
            Just(Method::POST),
            Just(Method::DELETE),
            Just(Method::OPTIONS),
        ]
    }

    proptest! {
        #[test]
        fn prop_resolve_is_pure(
            method in method_strategy(),
            collection in prop_oneof![Just("gqlapps"), Just("other")],
            code in prop_oneof![Just(StatusCode::OK), Just(StatusCode::CREATED), Just(StatusCode::CONFLICT)],
            attached in any::<bool>(),
            in_error in any::<bool>(),
        ) {
            let fixture = Fixture::new();
            let mut exchange = Exchange::new(method, "/docgate/gqlapps/a1", "");
            if attached {
                let target = DocumentRef::new("docgate", collection, "a1");
                let mut result = OperationResult::failed(code, "", target);
                result.cause = None;
                exchange.attach(DB_OPERATION_RESULT, result);
            }
            if in_error {
                exchange.set_in_error(StatusCode::BAD_REQUEST, "invalid");
            }

            let snapshot = format!("{exchange:?}");
            let first = fixture.checker.resolve(&exchange);
            for _ in 0..3 {
                prop_assert_eq!(fixture.checker.resolve(&exchange), first);
            }
            prop_assert_eq!(format!("{exchange:?}"), snapshot);
        }
    }
}
