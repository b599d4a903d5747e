//! Document request handlers.
//!
//! | Method | Resource | Outcome |
//! |--------|----------|---------|
//! | GET | `/` | database names |
//! | GET | `/{db}` | collection names |
//! | GET | `/{db}/{coll}` | documents matching `filter`, paged and sorted |
//! | PUT | `/{db}/{coll}` | replaces the collection properties |
//! | POST | `/{db}/{coll}` | inserts a document (201 + `Location`) |
//! | GET | `/{db}/{coll}/{id}` | the document (304 on `If-None-Match`) |
//! | PUT | `/{db}/{coll}/{id}` | replaces or creates the document |
//! | PATCH | `/{db}/{coll}/{id}` | applies update operators |
//! | DELETE | `/{db}/{coll}/{id}` | deletes the document (204) |
//!
//! Every write attaches its [`OperationResult`] under
//! [`DB_OPERATION_RESULT`] so response interceptors can validate it.

use crate::etag_policy::{if_match, ETAG_CHECK};
use crate::json_schema::PROPERTIES_COLLECTION;
use crate::resource::{ResourceRef, RESOURCE};
use docgate_config::MongoConfig;
use docgate_core::{BoxFuture, Exchange, GatewayError, GatewayResult};
use docgate_pipeline::{Handler, Link};
use docgate_store::{
    DocumentRef, Etag, Filter, FindOptions, OperationResult, SharedDocuments, SortKey, WriteMode,
    WriteRequest, DB_OPERATION_RESULT,
};
use http::header::{ETAG, IF_NONE_MATCH, LOCATION};
use http::{Method, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

/// Handler that executes document requests against the store.
pub struct DocumentDispatcher {
    link: Link,
    store: SharedDocuments,
    default_pagesize: usize,
    max_pagesize: usize,
}

impl DocumentDispatcher {
    /// Creates the handler.
    #[must_use]
    pub fn new(store: SharedDocuments, config: &MongoConfig) -> Self {
        Self {
            link: Link::new(),
            store,
            default_pagesize: config.default_pagesize,
            max_pagesize: config.max_pagesize,
        }
    }

    async fn dispatch(&self, exchange: &mut Exchange, resource: ResourceRef) -> GatewayResult<()> {
        let method = exchange.method().clone();
        match (&method, resource) {
            (&Method::GET, ResourceRef::Root) => {
                let names = self.store.databases().await?;
                ok(exchange, json!(names));
                Ok(())
            }
            (&Method::GET, ResourceRef::Database { db }) => {
                let mut names = self.store.collections(&db).await?;
                names.retain(|name| name != PROPERTIES_COLLECTION);
                ok(exchange, json!(names));
                Ok(())
            }
            (&Method::GET, ResourceRef::Collection { db, collection }) => {
                self.find(exchange, &db, &collection).await
            }
            (&Method::PUT, ResourceRef::Collection { db, collection }) => {
                let properties = PROPERTIES_COLLECTION.to_string();
                self.write(exchange, WriteMode::Replace, db, properties, Some(collection)).await
            }
            (&Method::POST, ResourceRef::Collection { db, collection }) => {
                self.write(exchange, WriteMode::Insert, db, collection, None).await
            }
            (&Method::GET, ResourceRef::Document(target)) => self.get(exchange, &target).await,
            (&Method::PUT, ResourceRef::Document(target)) => {
                let DocumentRef { db, collection, id } = target;
                self.write(exchange, WriteMode::Replace, db, collection, Some(id)).await
            }
            (&Method::PATCH, ResourceRef::Document(target)) => {
                let DocumentRef { db, collection, id } = target;
                self.write(exchange, WriteMode::Update, db, collection, Some(id)).await
            }
            (&Method::DELETE, ResourceRef::Document(target)) => self.delete(exchange, &target).await,
            (method, resource) => Err(GatewayError::method_not_allowed(format!(
                "method {method} is not allowed on a {} resource",
                resource.kind()
            ))),
        }
    }

    async fn find(&self, exchange: &mut Exchange, db: &str, collection: &str) -> GatewayResult<()> {
        let filter = parse_filter(exchange)?;
        let options = self.find_options(exchange)?;
        let documents = self.store.find(db, collection, &filter, &options).await?;
        ok(exchange, Value::Array(documents));
        Ok(())
    }

    fn find_options(&self, exchange: &Exchange) -> GatewayResult<FindOptions> {
        let query = exchange.query();

        let page = match query.first("page") {
            None => 1,
            Some(page) => page.parse::<usize>().ok().filter(|p| *p >= 1).ok_or_else(|| {
                GatewayError::validation("illegal page parameter, it must be a number >= 1")
            })?,
        };
        let pagesize = match query.first("pagesize") {
            None => self.default_pagesize,
            Some(size) => size
                .parse::<usize>()
                .ok()
                .filter(|s| *s <= self.max_pagesize)
                .ok_or_else(|| {
                    GatewayError::validation(format!(
                        "illegal pagesize parameter, it must be a number between 0 and {}",
                        self.max_pagesize
                    ))
                })?,
        };
        let sort = query
            .all("sort")
            .flat_map(|value| value.split(','))
            .filter_map(SortKey::parse)
            .collect();

        Ok(FindOptions {
            skip: (page - 1).saturating_mul(pagesize),
            limit: Some(pagesize),
            sort,
        })
    }

    async fn get(&self, exchange: &mut Exchange, target: &DocumentRef) -> GatewayResult<()> {
        let Some(document) = self.store.get_document(target).await? else {
            return Err(GatewayError::not_found("document does not exist"));
        };

        let etag = Etag::of_document(&document);
        if let Some(etag) = &etag {
            exchange.set_response_header(ETAG, etag.as_str());
            let not_modified = exchange
                .header(IF_NONE_MATCH.as_str())
                .and_then(Etag::from_header)
                .is_some_and(|tag| tag == *etag);
            if not_modified {
                exchange.set_status(StatusCode::NOT_MODIFIED);
                return Ok(());
            }
        }

        ok(exchange, document);
        Ok(())
    }

    async fn write(
        &self,
        exchange: &mut Exchange,
        mode: WriteMode,
        db: String,
        collection: String,
        id: Option<String>,
    ) -> GatewayResult<()> {
        let content = match exchange.content()? {
            Some(Value::Object(content)) => content.clone(),
            _ => return Err(GatewayError::not_acceptable("request content must be a JSON object")),
        };

        let mut request = WriteRequest::new(db, collection, mode, content)
            .if_match(if_match(exchange))
            .check_etag(exchange.attachment(ETAG_CHECK).copied().unwrap_or(false));
        if let Some(id) = id {
            request = request.id(id);
        }

        let result = self.store.write_document(request).await?;
        if commit(exchange, &result) && mode == WriteMode::Insert {
            let location = format!("{}/{}", exchange.path().trim_end_matches('/'), result.target.id);
            exchange.set_response_header(LOCATION, &location);
        }
        Ok(())
    }

    async fn delete(&self, exchange: &mut Exchange, target: &DocumentRef) -> GatewayResult<()> {
        let if_match = if_match(exchange);
        let check = exchange.attachment(ETAG_CHECK).copied().unwrap_or(false);
        let result = self
            .store
            .delete_document(target, if_match.as_ref(), check)
            .await?;
        commit(exchange, &result);
        Ok(())
    }
}

fn ok(exchange: &mut Exchange, content: Value) {
    exchange.set_status(StatusCode::OK);
    exchange.set_response_content(Some(content));
}

/// Combines every `filter` query parameter with `$and`.
fn parse_filter(exchange: &Exchange) -> GatewayResult<Filter> {
    let filters = exchange
        .query()
        .all("filter")
        .map(|filter| {
            serde_json::from_str::<Value>(filter)
                .map_err(|e| GatewayError::validation(format!("Invalid filter: not valid JSON: {e}")))
        })
        .collect::<GatewayResult<Vec<_>>>()?;

    let filter = match filters.len() {
        0 => return Ok(Filter::all()),
        1 => Filter::parse(&filters[0]),
        _ => Filter::parse(&json!({ "$and": filters })),
    };
    Ok(filter?)
}

/// Records the write outcome on the exchange. Returns true on success.
fn commit(exchange: &mut Exchange, result: &OperationResult) -> bool {
    exchange.attach(DB_OPERATION_RESULT, result.clone());

    if !result.is_success() {
        let cause = result.cause.clone().unwrap_or_else(|| "write not applied".to_string());
        exchange.set_in_error(result.http_code, cause);
        return false;
    }

    exchange.set_status(result.http_code);
    if let Some(etag) = &result.etag {
        exchange.set_response_header(ETAG, etag.as_str());
    }
    true
}

impl Handler for DocumentDispatcher {
    fn name(&self) -> &str {
        "documentDispatcher"
    }

    fn link(&self) -> &Link {
        &self.link
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            if exchange.is_in_error() {
                return self.link.forward(exchange).await;
            }

            let Some(resource) = exchange.attachment(RESOURCE).cloned() else {
                exchange.set_in_error(StatusCode::NOT_FOUND, "resource not found");
                return self.link.forward(exchange).await;
            };

            debug!(
                request_id = %exchange.request_id(),
                http.method = %exchange.method(),
                resource = %resource,
                kind = resource.kind(),
                "dispatching document request"
            );

            match self.dispatch(exchange, resource).await {
                Ok(()) => {}
                Err(e) if e.is_client_error() => exchange.set_in_error(e.status_code(), e.message()),
                Err(e) => return Err(e),
            }

            self.link.forward(exchange).await
        })
    }
}
