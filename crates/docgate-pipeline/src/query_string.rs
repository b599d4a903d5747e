//! Preservation of the original query string.
//!
//! Handlers may rewrite the query parameters (for example to apply defaults
//! or strip private parameters). The [`QueryStringRebuilder`] captures the
//! query string as received the first time it runs and then re-encodes the
//! current parameters; [`original_query_string`] returns the captured value.

use crate::handler::{Handler, Link};
use docgate_core::{AttachmentKey, BoxFuture, Exchange, GatewayResult};

/// The query string as received, before any handler rewrote it.
pub const ORIGINAL_QUERY_STRING: AttachmentKey<String> =
    AttachmentKey::new("original-query-string");

/// Captures the original query string once per exchange.
///
/// Returns true if this call captured it.
pub fn capture_original_query_string(exchange: &mut Exchange) -> bool {
    let current = exchange.query_string().to_string();
    exchange.attach_if_absent(ORIGINAL_QUERY_STRING, current)
}

/// Returns the original query string, or the current one if it was never
/// captured.
#[must_use]
pub fn original_query_string(exchange: &Exchange) -> &str {
    exchange
        .attachment(ORIGINAL_QUERY_STRING)
        .map_or_else(|| exchange.query_string(), String::as_str)
}

/// Handler that captures the original query string and re-encodes the
/// current parameters.
#[derive(Debug, Default)]
pub struct QueryStringRebuilder {
    link: Link,
}

impl QueryStringRebuilder {
    /// Creates the rebuilder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Handler for QueryStringRebuilder {
    fn name(&self) -> &str {
        "queryStringRebuilder"
    }

    fn link(&self) -> &Link {
        &self.link
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            if !exchange.is_in_error() {
                capture_original_query_string(exchange);
                exchange.rebuild_query_string();
            }
            self.link.forward(exchange).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    #[test]
    fn test_fallback_to_current() {
        let exchange = Exchange::new(Method::GET, "/db/coll", "page=1");
        assert_eq!(original_query_string(&exchange), "page=1");
    }

    #[test]
    fn test_first_capture_wins() {
        let mut exchange = Exchange::new(Method::GET, "/db/coll", "page=1");
        assert!(capture_original_query_string(&mut exchange));

        exchange.query_mut().set("page", "2");
        exchange.rebuild_query_string();
        assert!(!capture_original_query_string(&mut exchange));

        assert_eq!(original_query_string(&exchange), "page=1");
        assert_eq!(exchange.query_string(), "page=2");
    }

    #[tokio::test]
    async fn test_rebuilder_reentry_keeps_original() {
        let rebuilder = QueryStringRebuilder::new();
        let mut exchange = Exchange::new(Method::GET, "/db/coll", "filter=%7B%7D&secret=x");

        rebuilder.handle(&mut exchange).await.unwrap();
        exchange.query_mut().remove("secret");
        rebuilder.handle(&mut exchange).await.unwrap();

        assert_eq!(exchange.query_string(), "filter=%7B%7D");
        assert_eq!(original_query_string(&exchange), "filter=%7B%7D&secret=x");
    }
}
