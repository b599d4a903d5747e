//! Request content checks for write requests.

use crate::resource::{ResourceRef, RESOURCE};
use docgate_core::{BoxFuture, Exchange, GatewayResult};
use docgate_pipeline::{Handler, Link};
use docgate_store::update::has_update_operators;
use docgate_store::ETAG_FIELD;
use http::{Method, StatusCode};
use serde_json::Value;

/// Returns true for the methods that carry a document.
pub(crate) fn is_write(method: &Method) -> bool {
    *method == Method::PUT || *method == Method::PATCH || *method == Method::POST
}

/// Validates the content of PUT, PATCH and POST requests.
///
/// | Problem | Status |
/// |---------|--------|
/// | malformed JSON | 400 |
/// | missing or empty body | 406 |
/// | body is not an object | 406 |
/// | body contains `_etag` | 400 |
/// | update operators in PUT or POST | 400 |
/// | `_id` differs from the URL id | 400 |
#[derive(Debug, Default)]
pub struct ContentChecker {
    link: Link,
}

impl ContentChecker {
    /// Creates the handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Returns the status and message for invalid content, if any.
fn check(exchange: &Exchange) -> Option<(StatusCode, String)> {
    let content = match exchange.content() {
        Err(e) => return Some((e.status_code(), e.message().to_string())),
        Ok(None) => {
            return Some((StatusCode::NOT_ACCEPTABLE, "request content is missing".to_string()))
        }
        Ok(Some(content)) => content,
    };

    let Value::Object(content) = content else {
        return Some((
            StatusCode::NOT_ACCEPTABLE,
            "request content must be a JSON object".to_string(),
        ));
    };

    if content.contains_key(ETAG_FIELD) {
        return Some((
            StatusCode::BAD_REQUEST,
            format!("the content cannot contain the reserved field {ETAG_FIELD}"),
        ));
    }

    if *exchange.method() != Method::PATCH && has_update_operators(content) {
        return Some((
            StatusCode::BAD_REQUEST,
            format!("update operators are not allowed in {} requests", exchange.method()),
        ));
    }

    if let (Some(ResourceRef::Document(target)), Some(body_id)) =
        (exchange.attachment(RESOURCE), content.get("_id"))
    {
        if body_id.as_str() != Some(target.id.as_str()) {
            return Some((
                StatusCode::BAD_REQUEST,
                "_id in content body is different than id in URL".to_string(),
            ));
        }
    }

    None
}

impl Handler for ContentChecker {
    fn name(&self) -> &str {
        "contentChecker"
    }

    fn link(&self) -> &Link {
        &self.link
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            if !exchange.is_in_error() && is_write(exchange.method()) {
                if let Some((status, message)) = check(exchange) {
                    exchange.set_in_error(status, message);
                }
            }
            self.link.forward(exchange).await
        })
    }
}
