//! End-to-end tests through `Gateway::dispatch`.
//!
//! Each test bootstraps a full gateway (default pipelines, in-memory store)
//! and drives it with plain HTTP requests, without binding a socket.

use bytes::Bytes;
use docgate_config::{GatewayConfig, PermissionConfig, UserConfig};
use docgate_core::{BoxFuture, Exchange, GatewayError, GatewayResult, InterceptPoint};
use docgate_graphql::StaticQueryEngine;
use docgate_pipeline::{Interceptor, InterceptorDescriptor};
use docgate_server::Gateway;
use docgate_store::{DocumentRef, Documents};
use http::header::{CONTENT_TYPE, ETAG, IF_MATCH, LOCATION, WWW_AUTHENTICATE};
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl Reply {
    fn message(&self) -> &str {
        self.body["message"].as_str().unwrap_or_default()
    }

    fn etag(&self) -> String {
        self.headers[ETAG].to_str().unwrap().to_string()
    }
}

async fn send(gateway: &Gateway, method: Method, uri: &str, headers: &[(&str, &str)], body: Option<Value>) -> Reply {
    let mut request = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let body = body.map_or_else(Bytes::new, |body| Bytes::from(serde_json::to_vec(&body).unwrap()));
    let response = gateway.dispatch(request.body(body).unwrap()).await;

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    Reply { status, headers, body }
}

fn gateway() -> Gateway {
    Gateway::new(GatewayConfig::default()).unwrap()
}

fn app_definition(uri: &str) -> Value {
    json!({
        "descriptor": {"name": uri, "uri": uri},
        "schema": "type Query { hello: String }",
        "mappings": {"Query": {"hello": "greeting"}}
    })
}

// ---- ping and routing ----

#[tokio::test]
async fn test_ping() {
    let gateway = gateway();
    let reply = send(&gateway, Method::GET, "/ping", &[], None).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers[CONTENT_TYPE], "application/json");
    assert_eq!(reply.body["message"], GatewayConfig::default().ping.message);
}

#[tokio::test]
async fn test_unmounted_path() {
    let mut config = GatewayConfig::default();
    config.mongo.enabled = false;
    let gateway = Gateway::new(config).unwrap();

    let reply = send(&gateway, Method::GET, "/db/coll", &[], None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["http status code"], 404);
}

// ---- documents ----

#[tokio::test]
async fn test_document_lifecycle() {
    let gateway = gateway();

    let created = send(&gateway, Method::PUT, "/shop/products/p1", &[], Some(json!({"name": "pen"}))).await;
    assert_eq!(created.status, StatusCode::CREATED);
    let etag = created.etag();

    let fetched = send(&gateway, Method::GET, "/shop/products/p1", &[], None).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body["name"], "pen");
    assert_eq!(fetched.etag(), etag);

    let updated = send(
        &gateway,
        Method::PATCH,
        "/shop/products/p1",
        &[(IF_MATCH.as_str(), &etag)],
        Some(json!({"$set": {"price": 2}})),
    )
    .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_ne!(updated.etag(), etag);

    let deleted = send(
        &gateway,
        Method::DELETE,
        "/shop/products/p1",
        &[(IF_MATCH.as_str(), &updated.etag())],
        None,
    )
    .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    assert_eq!(deleted.body, Value::Null);

    let gone = send(&gateway, Method::GET, "/shop/products/p1", &[], None).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_without_if_match_is_a_conflict() {
    let gateway = gateway();
    send(&gateway, Method::PUT, "/shop/products/p1", &[], Some(json!({"name": "pen"}))).await;

    let reply = send(&gateway, Method::PUT, "/shop/products/p1", &[], Some(json!({"name": "ink"}))).await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert!(reply.message().contains("If-Match"), "{}", reply.message());

    let wrong = send(
        &gateway,
        Method::PUT,
        "/shop/products/p1",
        &[(IF_MATCH.as_str(), "not-the-etag")],
        Some(json!({"name": "ink"})),
    )
    .await;
    assert_eq!(wrong.status, StatusCode::PRECONDITION_FAILED);

    let stored = send(&gateway, Method::GET, "/shop/products/p1", &[], None).await;
    assert_eq!(stored.body["name"], "pen");
}

#[tokio::test]
async fn test_mismatched_id_is_rejected_before_writing() {
    let gateway = gateway();
    let created = send(&gateway, Method::PUT, "/shop/products/p1", &[], Some(json!({"name": "pen"}))).await;

    let reply = send(
        &gateway,
        Method::PATCH,
        "/shop/products/p1",
        &[(IF_MATCH.as_str(), &created.etag())],
        Some(json!({"_id": "other"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let stored = gateway
        .store()
        .get_document(&DocumentRef::new("shop", "products", "p1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored["_id"], "p1");
    assert!(gateway
        .store()
        .get_document(&DocumentRef::new("shop", "products", "other"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_post_and_find() {
    let gateway = gateway();
    let created = send(&gateway, Method::POST, "/shop/products", &[], Some(json!({"name": "pen", "qty": 3}))).await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert!(created.headers[LOCATION].to_str().unwrap().starts_with("/shop/products/"));

    send(&gateway, Method::POST, "/shop/products", &[], Some(json!({"name": "ink", "qty": 0}))).await;

    let found = send(&gateway, Method::GET, "/shop/products?filter=%7B%22name%22%3A%22ink%22%7D", &[], None).await;
    assert_eq!(found.status, StatusCode::OK);
    assert_eq!(found.body.as_array().unwrap().len(), 1);
    assert_eq!(found.body[0]["name"], "ink");

    let invalid = send(&gateway, Method::GET, "/shop/products?filter=%7Bnope", &[], None).await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_body() {
    let gateway = gateway();
    let request = Request::builder()
        .method(Method::PUT)
        .uri("/shop/products/p1")
        .body(Bytes::from_static(b"{not json"))
        .unwrap();

    let response = gateway.dispatch(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---- GraphQL app definitions ----

#[tokio::test]
async fn test_valid_app_definition_is_cached() {
    let gateway = gateway();
    let reply = send(&gateway, Method::PUT, "/docgate/gqlapps/a1", &[], Some(app_definition("shop"))).await;

    assert_eq!(reply.status, StatusCode::CREATED);
    assert!(gateway.app_cache().get("shop").is_some());
}

#[tokio::test]
async fn test_malformed_app_definition_is_rolled_back() {
    let gateway = gateway();
    let mut definition = app_definition("shop");
    definition["schema"] = json!("type Product { name: String }");

    let reply = send(&gateway, Method::PUT, "/docgate/gqlapps/a1", &[], Some(definition)).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.message().contains("invalid GraphQL schema"), "{}", reply.message());
    assert!(!reply.headers.contains_key(ETAG));
    assert!(gateway.app_cache().is_empty());
    assert!(gateway
        .store()
        .get_document(&DocumentRef::new("docgate", "gqlapps", "a1"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_duplicate_app_uri_is_a_conflict() {
    let gateway = gateway();
    send(&gateway, Method::PUT, "/docgate/gqlapps/a1", &[], Some(app_definition("shop"))).await;

    let reply = send(&gateway, Method::POST, "/docgate/gqlapps", &[], Some(app_definition("shop"))).await;

    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert!(!reply.headers.contains_key(LOCATION));
    let apps = send(&gateway, Method::GET, "/docgate/gqlapps", &[], None).await;
    assert_eq!(apps.body.as_array().unwrap().len(), 1);
    assert_eq!(gateway.app_cache().get("shop").unwrap().id(), Some("a1"));
}

#[tokio::test]
async fn test_rejected_update_restores_previous_definition() {
    let gateway = gateway();
    let created = send(&gateway, Method::PUT, "/docgate/gqlapps/a1", &[], Some(app_definition("shop"))).await;

    let reply = send(
        &gateway,
        Method::PATCH,
        "/docgate/gqlapps/a1",
        &[(IF_MATCH.as_str(), &created.etag())],
        Some(json!({"mappings": {"Query": {}}})),
    )
    .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.etag(), created.etag());

    let stored = send(&gateway, Method::GET, "/docgate/gqlapps/a1", &[], None).await;
    assert_eq!(stored.body["mappings"]["Query"]["hello"], "greeting");
    assert_eq!(stored.etag(), created.etag());
}

// ---- JSON schema validation ----

#[tokio::test]
async fn test_collection_schema_is_enforced() {
    let gateway = gateway();
    let schema = json!({
        "_$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {"name": {"type": "string"}, "price": {"type": "number"}},
        "required": ["name"]
    });
    let stored = send(&gateway, Method::PUT, "/shop/_schemas/product", &[], Some(schema)).await;
    assert_eq!(stored.status, StatusCode::CREATED);
    let props = json!({"jsonSchema": {"schemaId": "product"}});
    let props = send(&gateway, Method::PUT, "/shop/products", &[], Some(props)).await;
    assert_eq!(props.status, StatusCode::CREATED);

    let invalid = send(&gateway, Method::PUT, "/shop/products/p1", &[], Some(json!({"price": 2}))).await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    assert!(invalid.message().contains("violates schema product"), "{}", invalid.message());

    let created = send(&gateway, Method::PUT, "/shop/products/p1", &[], Some(json!({"name": "pen"}))).await;
    assert_eq!(created.status, StatusCode::CREATED);

    let patched = send(
        &gateway,
        Method::PATCH,
        "/shop/products/p1",
        &[(IF_MATCH.as_str(), &created.etag())],
        Some(json!({"$set": {"price": "free"}})),
    )
    .await;
    assert_eq!(patched.status, StatusCode::BAD_REQUEST);
    assert_eq!(patched.etag(), created.etag());

    let fetched = send(&gateway, Method::GET, "/shop/products/p1", &[], None).await;
    assert_eq!(fetched.body["name"], "pen");
    assert!(fetched.body.get("price").is_none());
    assert_eq!(fetched.etag(), created.etag());
}

// ---- GraphQL queries ----

#[tokio::test]
async fn test_graphql_query() {
    let gateway = Gateway::builder(GatewayConfig::default())
        .query_engine(Arc::new(StaticQueryEngine::new(json!({"hello": "world"}))))
        .build()
        .unwrap();
    send(&gateway, Method::PUT, "/docgate/gqlapps/a1", &[], Some(app_definition("shop"))).await;

    let reply = send(&gateway, Method::POST, "/graphql/shop", &[], Some(json!({"query": "{ hello }"}))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!({"data": {"hello": "world"}}));

    let missing = send(&gateway, Method::POST, "/graphql/nope", &[], Some(json!({"query": "{ hello }"}))).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_graphql_without_engine() {
    let gateway = gateway();
    send(&gateway, Method::PUT, "/docgate/gqlapps/a1", &[], Some(app_definition("shop"))).await;

    let reply = send(&gateway, Method::POST, "/graphql/shop", &[], Some(json!({"query": "{ hello }"}))).await;
    assert_eq!(reply.status, StatusCode::NOT_IMPLEMENTED);

    let get = send(&gateway, Method::GET, "/graphql/shop", &[], None).await;
    assert_eq!(get.status, StatusCode::METHOD_NOT_ALLOWED);
}

// ---- interceptors ----

/// Rewrites `?q=` into a `filter` before the dispatcher runs.
struct SearchAlias;

impl Interceptor for SearchAlias {
    fn resolve(&self, exchange: &Exchange) -> bool {
        exchange.query().contains("q")
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            let term = exchange.query().first("q").unwrap_or_default().to_string();
            exchange.query_mut().remove("q");
            exchange.query_mut().set("filter", json!({"name": term}).to_string());
            Ok(())
        })
    }
}

/// Fails on every request to `/boom`.
struct Exploding;

impl Interceptor for Exploding {
    fn resolve(&self, exchange: &Exchange) -> bool {
        exchange.path().starts_with("/boom")
    }

    fn handle<'a>(&'a self, _exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async { Err(GatewayError::internal("exploded")) })
    }
}

#[tokio::test]
async fn test_request_interceptor_rewrites_query() {
    let gateway = Gateway::builder(GatewayConfig::default())
        .interceptor(
            InterceptorDescriptor::new("searchAlias", InterceptPoint::RequestBeforeAuth),
            SearchAlias,
        )
        .build()
        .unwrap();
    send(&gateway, Method::POST, "/shop/products", &[], Some(json!({"name": "pen"}))).await;
    send(&gateway, Method::POST, "/shop/products", &[], Some(json!({"name": "ink"}))).await;

    let reply = send(&gateway, Method::GET, "/shop/products?q=pen", &[], None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body.as_array().unwrap().len(), 1);
    assert_eq!(reply.body[0]["name"], "pen");
}

#[tokio::test]
async fn test_interceptor_failure_reaches_fault_boundary() {
    let gateway = Gateway::builder(GatewayConfig::default())
        .interceptor(
            InterceptorDescriptor::new("exploding", InterceptPoint::RequestAfterAuth),
            Exploding,
        )
        .build()
        .unwrap();

    let reply = send(&gateway, Method::GET, "/boom/coll", &[], None).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.body["message"], "exploded");

    let other = send(&gateway, Method::GET, "/fine/coll", &[], None).await;
    assert_eq!(other.status, StatusCode::OK);
}

#[tokio::test]
async fn test_disabled_interceptor_is_skipped() {
    let mut config = GatewayConfig::default();
    config
        .plugins_args
        .insert("exploding".to_string(), json!({"enabled": false}));
    let gateway = Gateway::builder(config)
        .interceptor(
            InterceptorDescriptor::new("exploding", InterceptPoint::RequestAfterAuth),
            Exploding,
        )
        .build()
        .unwrap();

    let reply = send(&gateway, Method::GET, "/boom/coll", &[], None).await;
    assert_eq!(reply.status, StatusCode::OK);
}

// ---- security ----

fn secured() -> Gateway {
    let mut config = GatewayConfig::default();
    config.security.enabled = true;
    config.security.users = vec![UserConfig {
        name: "admin".to_string(),
        password: "secret".to_string(),
        roles: vec!["admin".to_string()],
    }];
    config.security.permissions = vec![
        PermissionConfig {
            role: "admin".to_string(),
            methods: vec!["*".to_string()],
            path_prefix: "/".to_string(),
        },
        PermissionConfig {
            role: "$unauthenticated".to_string(),
            methods: vec!["GET".to_string()],
            path_prefix: "/ping".to_string(),
        },
    ];
    Gateway::new(config).unwrap()
}

#[tokio::test]
async fn test_security() {
    let gateway = secured();

    let ping = send(&gateway, Method::GET, "/ping", &[], None).await;
    assert_eq!(ping.status, StatusCode::OK);

    let anonymous = send(&gateway, Method::GET, "/shop/products", &[], None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    assert!(anonymous.headers.contains_key(WWW_AUTHENTICATE));

    // admin:wrong
    let wrong = send(
        &gateway,
        Method::GET,
        "/shop/products",
        &[("Authorization", "Basic YWRtaW46d3Jvbmc=")],
        None,
    )
    .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

    // admin:secret
    let admin = send(
        &gateway,
        Method::GET,
        "/shop/products",
        &[("Authorization", "Basic YWRtaW46c2VjcmV0")],
        None,
    )
    .await;
    assert_eq!(admin.status, StatusCode::OK);
}
