//! The terminal handler of every pipeline.

use crate::handler::{Handler, Link};
use docgate_core::{BoxFuture, ErrorBody, Exchange, GatewayResult};
use http::header::CONTENT_TYPE;
use http::StatusCode;

/// Finalizes the response.
///
/// In-error exchanges without content get the error body; the status
/// defaults to 200. The response is then marked complete.
#[derive(Debug, Default)]
pub struct ResponseSender {
    link: Link,
}

impl ResponseSender {
    /// Creates the sender.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Fills in status, error body and content type on a finished exchange.
pub fn finalize_response(exchange: &mut Exchange) {
    if exchange.is_in_error() && exchange.response_content().is_none() {
        let status = exchange.status().unwrap_or(StatusCode::BAD_REQUEST);
        let message = exchange.error_message().unwrap_or_default().to_string();
        exchange.set_status(status);
        exchange.set_response_content(Some(ErrorBody::new(status, message).to_json()));
    }

    if exchange.status().is_none() {
        exchange.set_status(StatusCode::OK);
    }

    if exchange.response_content().is_some()
        && !exchange.response_headers().contains_key(CONTENT_TYPE)
    {
        exchange.set_response_header(CONTENT_TYPE, "application/json");
    }
}

impl Handler for ResponseSender {
    fn name(&self) -> &str {
        "responseSender"
    }

    fn link(&self) -> &Link {
        &self.link
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            if exchange.is_response_complete() {
                return Ok(());
            }
            finalize_response(exchange);
            exchange.mark_response_complete();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use serde_json::json;

    #[tokio::test]
    async fn test_success_response() {
        let mut exchange = Exchange::new(Method::GET, "/db/coll/1", "");
        exchange.set_response_content(Some(json!({"_id": "1"})));

        ResponseSender::new().handle(&mut exchange).await.unwrap();

        assert_eq!(exchange.status(), Some(StatusCode::OK));
        assert_eq!(exchange.response_headers()[CONTENT_TYPE], "application/json");
        assert!(exchange.is_response_complete());
    }

    #[tokio::test]
    async fn test_error_body() {
        let mut exchange = Exchange::new(Method::PUT, "/db/coll/1", "");
        exchange.set_in_error(
            StatusCode::CONFLICT,
            "The ETag must be provided using the 'If-Match' header",
        );

        ResponseSender::new().handle(&mut exchange).await.unwrap();

        let body = exchange.response_content().unwrap();
        assert_eq!(body["http status code"], 409);
        assert_eq!(body["http status description"], "Conflict");
        assert_eq!(
            body["message"],
            "The ETag must be provided using the 'If-Match' header"
        );
    }

    #[tokio::test]
    async fn test_error_without_status_is_400() {
        let mut exchange = Exchange::new(Method::PUT, "/db/coll/1", "");
        exchange.mark_in_error();
        ResponseSender::new().handle(&mut exchange).await.unwrap();
        assert_eq!(exchange.status(), Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn test_complete_response_untouched() {
        let mut exchange = Exchange::new(Method::GET, "/", "");
        exchange.set_status(StatusCode::NO_CONTENT);
        exchange.mark_response_complete();
        ResponseSender::new().handle(&mut exchange).await.unwrap();
        assert!(exchange.response_content().is_none());
        assert!(exchange.response_headers().is_empty());
    }
}
