//! Per-request log lines.

use docgate_config::RequestLogMode;
use docgate_core::{BoxFuture, Exchange, GatewayResult};
use docgate_pipeline::{original_query_string, Handler, Link};

/// Logs one line per request once the rest of the pipeline has run.
///
/// Sits at the head of every service pipeline. Failures propagated by the
/// pipeline are logged too, then passed on to the fault boundary.
#[derive(Debug)]
pub struct RequestLogger {
    link: Link,
    mode: RequestLogMode,
}

impl RequestLogger {
    /// Creates a logger with the given verbosity.
    #[must_use]
    pub fn new(mode: RequestLogMode) -> Self {
        Self {
            link: Link::new(),
            mode,
        }
    }
}

impl Handler for RequestLogger {
    fn name(&self) -> &str {
        "requestLogger"
    }

    fn link(&self) -> &Link {
        &self.link
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            let result = self.link.forward(exchange).await;

            let duration_ms = u64::try_from(exchange.elapsed().as_millis()).unwrap_or(u64::MAX);
            let status = match &result {
                Ok(()) => exchange.status().map_or(200, |s| s.as_u16()),
                Err(e) => e.status_code().as_u16(),
            };

            match self.mode {
                RequestLogMode::Off => {}
                RequestLogMode::Basic => tracing::info!(
                    request_id = %exchange.request_id(),
                    http.method = %exchange.method(),
                    http.path = exchange.path(),
                    http.status_code = status,
                    duration_ms,
                    "request completed"
                ),
                RequestLogMode::Verbose => tracing::info!(
                    request_id = %exchange.request_id(),
                    http.method = %exchange.method(),
                    http.path = exchange.path(),
                    http.query = original_query_string(exchange),
                    http.status_code = status,
                    account = exchange.account().map(|a| a.name()),
                    headers = ?exchange.request_headers().keys().map(|k| k.as_str()).collect::<Vec<_>>(),
                    error = exchange.error_message(),
                    duration_ms,
                    "request completed"
                ),
            }

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgate_core::GatewayError;
    use docgate_pipeline::{pipe, FnHandler, SharedHandler};
    use http::{Method, StatusCode};
    use std::sync::Arc;

    fn chain(last: SharedHandler) -> SharedHandler {
        let logger: SharedHandler = Arc::new(RequestLogger::new(RequestLogMode::Verbose));
        pipe([Some(logger), Some(last)]).unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_forwards_and_keeps_outcome() {
        let head = chain(FnHandler::shared("ok", |exchange: &mut Exchange| {
            exchange.set_status(StatusCode::CREATED);
            Ok(())
        }));

        let mut exchange = Exchange::new(Method::PUT, "/db/coll/1", "a=1");
        head.handle(&mut exchange).await.unwrap();
        assert_eq!(exchange.status(), Some(StatusCode::CREATED));
    }

    #[tokio::test]
    async fn test_propagates_failures() {
        let head = chain(FnHandler::shared("boom", |_: &mut Exchange| {
            Err(GatewayError::internal("boom"))
        }));

        let mut exchange = Exchange::new(Method::GET, "/", "");
        let err = head.handle(&mut exchange).await.unwrap_err();
        assert_eq!(err.message(), "boom");
    }
}
