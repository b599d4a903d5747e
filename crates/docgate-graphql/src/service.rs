//! The GraphQL service.
//!
//! Serves `POST {mount}/{app-uri}` with a `{query, variables, operationName}`
//! body. The app definition is looked up through the
//! [`AppDefinitionLoader`]; execution is delegated to a [`QueryEngine`].

use crate::cache::AppDefinitionLoader;
use crate::mapping::DataLoaderSettings;
use crate::model::AppDefinition;
use docgate_core::{Account, BoxFuture, Exchange, GatewayError, GatewayResult};
use docgate_pipeline::{RequestKind, Service, ServiceRequest, ServiceResponse};
use http::{Method, StatusCode};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// A query ready for execution.
#[derive(Debug, Clone)]
pub struct GraphQlQuery {
    /// The GraphQL document.
    pub query: String,
    /// Operation variables.
    pub variables: Map<String, Value>,
    /// Operation to execute.
    pub operation_name: Option<String>,
    /// Authenticated account, if any.
    pub account: Option<Account>,
    /// Data loaders to register, keyed `Type_field`.
    pub data_loaders: BTreeMap<String, DataLoaderSettings>,
}

/// The result of an execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutcome {
    /// The `data` member.
    pub data: Option<Value>,
    /// The `errors` member.
    pub errors: Vec<Value>,
}

impl QueryOutcome {
    /// Returns the response body.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        if !self.errors.is_empty() {
            body.insert("errors".to_string(), Value::Array(self.errors.clone()));
        }
        body.insert("data".to_string(), self.data.clone().unwrap_or(Value::Null));
        Value::Object(body)
    }
}

/// Executes GraphQL queries against an app definition.
pub trait QueryEngine: Send + Sync + 'static {
    /// Returns the engine name, for logs.
    fn name(&self) -> &str;

    /// Executes `query`.
    fn execute<'a>(
        &'a self,
        app: &'a AppDefinition,
        query: &'a GraphQlQuery,
    ) -> BoxFuture<'a, GatewayResult<QueryOutcome>>;
}

/// Engine used when none is configured: every query answers 501.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableQueryEngine;

impl QueryEngine for UnavailableQueryEngine {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn execute<'a>(
        &'a self,
        _app: &'a AppDefinition,
        _query: &'a GraphQlQuery,
    ) -> BoxFuture<'a, GatewayResult<QueryOutcome>> {
        Box::pin(async { Err(GatewayError::not_implemented("no GraphQL query engine is configured")) })
    }
}

/// Typed service answering GraphQL requests.
pub struct GraphQlService {
    loader: AppDefinitionLoader,
    engine: Arc<dyn QueryEngine>,
    verbose: bool,
}

impl GraphQlService {
    /// Creates the service.
    #[must_use]
    pub fn new(loader: AppDefinitionLoader, engine: Arc<dyn QueryEngine>) -> Self {
        Self {
            loader,
            engine,
            verbose: false,
        }
    }

    /// Logs data loader and timing details of every execution.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Errors answered in band rather than through the fault boundary.
fn answer_in_band(e: &GatewayError) -> bool {
    e.is_client_error() || e.status_code() == StatusCode::NOT_IMPLEMENTED
}

impl Service for GraphQlService {
    fn name(&self) -> &str {
        "graphql"
    }

    fn request_kind(&self) -> RequestKind {
        RequestKind::GraphQl
    }

    fn request(&self, exchange: &Exchange) -> GatewayResult<ServiceRequest> {
        if *exchange.method() != Method::POST {
            return Err(GatewayError::method_not_allowed(format!(
                "method {} not allowed, use POST",
                exchange.method()
            )));
        }
        ServiceRequest::from_exchange(self.request_kind(), exchange)
    }

    fn handle<'a>(
        &'a self,
        request: &'a ServiceRequest,
        response: &'a mut ServiceResponse,
    ) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            let ServiceRequest::GraphQl(request) = request else {
                return Err(GatewayError::internal("graphql service received a non GraphQL request"));
            };

            if request.app_uri.is_empty() {
                response.set_in_error(StatusCode::NOT_FOUND, "app uri is missing");
                return Ok(());
            }

            let app = match self.loader.load(&request.app_uri).await {
                Ok(Some(app)) => app,
                Ok(None) => {
                    response.set_in_error(
                        StatusCode::NOT_FOUND,
                        format!("app '{}' not found", request.app_uri),
                    );
                    return Ok(());
                }
                Err(e) if answer_in_band(&e) => {
                    response.set_in_error(e.status_code(), e.message());
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let Some(query) = request.query.clone() else {
                response.set_in_error(StatusCode::BAD_REQUEST, "query cannot be null");
                return Ok(());
            };

            let query = GraphQlQuery {
                query,
                variables: request.variables.clone(),
                operation_name: request.operation_name.clone(),
                account: request.account.clone(),
                data_loaders: app.data_loaders(),
            };

            let started = Instant::now();
            let outcome = match self.engine.execute(&app, &query).await {
                Ok(outcome) => outcome,
                Err(e) if answer_in_band(&e) => {
                    response.set_in_error(e.status_code(), e.message());
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            if self.verbose {
                tracing::debug!(
                    engine = self.engine.name(),
                    app = %request.app_uri,
                    data_loaders = ?query.data_loaders.keys().collect::<Vec<_>>(),
                    errors = outcome.errors.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "GraphQL query executed"
                );
            }

            response.set_content(outcome.to_json());
            if outcome.errors.is_empty() {
                response.set_status(StatusCode::OK);
            } else {
                response.set_in_error(StatusCode::BAD_REQUEST, "Bad Request");
            }
            Ok(())
        })
    }
}

/// Engine answering every query with a fixed outcome.
#[derive(Debug, Clone)]
pub struct StaticQueryEngine {
    outcome: QueryOutcome,
}

impl StaticQueryEngine {
    /// Creates an engine answering `data`.
    #[must_use]
    pub fn new(data: Value) -> Self {
        Self {
            outcome: QueryOutcome {
                data: Some(data),
                errors: Vec::new(),
            },
        }
    }

    /// Creates an engine answering with a single error.
    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self {
            outcome: QueryOutcome {
                data: None,
                errors: vec![json!({"message": message})],
            },
        }
    }
}

impl QueryEngine for StaticQueryEngine {
    fn name(&self) -> &str {
        "static"
    }

    fn execute<'a>(
        &'a self,
        _app: &'a AppDefinition,
        _query: &'a GraphQlQuery,
    ) -> BoxFuture<'a, GatewayResult<QueryOutcome>> {
        Box::pin(async move { Ok(self.outcome.clone()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::AppDefinitionCache;
    use docgate_config::GraphqlConfig;
    use docgate_pipeline::{Handler, WrappingHandler, MOUNT_PATH};
    use docgate_store::{Documents, InMemoryDocuments, SharedDocuments, WriteMode, WriteRequest};

    async fn service(engine: Arc<dyn QueryEngine>) -> Arc<dyn Service> {
        let store = InMemoryDocuments::new();
        let definition = json!({
            "descriptor": {"uri": "shop"},
            "schema": "type Query { hello: String }",
            "mappings": {"Query": {"hello": "greeting"}}
        });
        store
            .write_document(
                WriteRequest::new("docgate", "gqlapps", WriteMode::Replace, definition.as_object().cloned().unwrap())
                    .id("a1"),
            )
            .await
            .unwrap();

        let store: SharedDocuments = Arc::new(store);
        let loader = AppDefinitionLoader::new(store, Arc::new(AppDefinitionCache::new()), &GraphqlConfig::default());
        Arc::new(GraphQlService::new(loader, engine))
    }

    async fn call(service: Arc<dyn Service>, method: Method, path: &str, body: Option<Value>) -> Exchange {
        let mut exchange = Exchange::new(method, path, "");
        if let Some(body) = body {
            exchange = exchange.with_json(&body);
        }
        exchange.attach(MOUNT_PATH, "/graphql".to_string());

        WrappingHandler::wrap_service(service)
            .handle(&mut exchange)
            .await
            .unwrap();
        exchange
    }

    #[tokio::test]
    async fn test_query_executed() {
        let service = service(Arc::new(StaticQueryEngine::new(json!({"hello": "world"})))).await;
        let exchange = call(service, Method::POST, "/graphql/shop", Some(json!({"query": "{ hello }"}))).await;

        assert!(!exchange.is_in_error());
        assert_eq!(exchange.status(), Some(StatusCode::OK));
        assert_eq!(exchange.response_content(), Some(&json!({"data": {"hello": "world"}})));
    }

    #[tokio::test]
    async fn test_query_errors_are_bad_requests() {
        let service = service(Arc::new(StaticQueryEngine::failing("syntax error"))).await;
        let exchange = call(service, Method::POST, "/graphql/shop", Some(json!({"query": "{"}))).await;

        assert!(exchange.is_in_error());
        assert_eq!(exchange.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(
            exchange.response_content(),
            Some(&json!({"data": null, "errors": [{"message": "syntax error"}]}))
        );
    }

    #[tokio::test]
    async fn test_request_rejections() {
        let engine: Arc<dyn QueryEngine> = Arc::new(StaticQueryEngine::new(json!({})));
        for (method, path, body, status) in [
            (Method::GET, "/graphql/shop", None, StatusCode::METHOD_NOT_ALLOWED),
            (Method::POST, "/graphql/shop", Some(json!({"variables": {}})), StatusCode::BAD_REQUEST),
            (Method::POST, "/graphql/nope", Some(json!({"query": "{ a }"})), StatusCode::NOT_FOUND),
            (Method::POST, "/graphql", Some(json!({"query": "{ a }"})), StatusCode::NOT_FOUND),
            (Method::POST, "/graphql/shop", Some(json!({"query": 5})), StatusCode::BAD_REQUEST),
        ] {
            let exchange = call(service(Arc::clone(&engine)).await, method.clone(), path, body).await;
            assert!(exchange.is_in_error(), "{method} {path}");
            assert_eq!(exchange.status(), Some(status), "{method} {path}");
        }
    }

    #[tokio::test]
    async fn test_missing_query_message() {
        let service = service(Arc::new(StaticQueryEngine::new(json!({})))).await;
        let exchange = call(service, Method::POST, "/graphql/shop", Some(json!({}))).await;
        assert_eq!(exchange.error_message(), Some("query cannot be null"));
    }

    #[tokio::test]
    async fn test_unavailable_engine_answers_501() {
        let service = service(Arc::new(UnavailableQueryEngine)).await;
        let exchange = call(service, Method::POST, "/graphql/shop", Some(json!({"query": "{ hello }"}))).await;

        assert!(exchange.is_in_error());
        assert_eq!(exchange.status(), Some(StatusCode::NOT_IMPLEMENTED));
    }
}
