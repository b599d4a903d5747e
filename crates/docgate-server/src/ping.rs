//! The ping service.

use docgate_core::{BoxFuture, Exchange, GatewayError, GatewayResult};
use docgate_pipeline::{Service, ServiceRequest, ServiceResponse};
use http::{Method, StatusCode};
use serde_json::json;

/// Answers `GET {mount}` with a greeting, for liveness checks.
#[derive(Debug, Clone)]
pub struct PingService {
    message: String,
}

impl PingService {
    /// Creates the service.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Service for PingService {
    fn name(&self) -> &str {
        "ping"
    }

    fn request(&self, exchange: &Exchange) -> GatewayResult<ServiceRequest> {
        let method = exchange.method();
        if method != Method::GET && method != Method::HEAD {
            return Err(GatewayError::method_not_allowed(format!(
                "method {method} not allowed, use GET"
            )));
        }
        ServiceRequest::from_exchange(self.request_kind(), exchange)
    }

    fn handle<'a>(
        &'a self,
        _request: &'a ServiceRequest,
        response: &'a mut ServiceResponse,
    ) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            response.set_status(StatusCode::OK);
            response.set_content(json!({
                "message": self.message,
                "version": env!("CARGO_PKG_VERSION"),
            }));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgate_pipeline::{Handler, WrappingHandler};
    use std::sync::Arc;

    async fn ping(method: Method) -> Exchange {
        let handler = WrappingHandler::wrap_service(Arc::new(PingService::new("hello")));
        let mut exchange = Exchange::new(method, "/ping", "");
        handler.handle(&mut exchange).await.unwrap();
        exchange
    }

    #[tokio::test]
    async fn test_get() {
        let exchange = ping(Method::GET).await;
        assert_eq!(exchange.status(), Some(StatusCode::OK));
        assert_eq!(exchange.response_content().unwrap()["message"], "hello");
    }

    #[tokio::test]
    async fn test_other_methods_rejected() {
        let exchange = ping(Method::DELETE).await;
        assert!(exchange.is_in_error());
        assert_eq!(exchange.status(), Some(StatusCode::METHOD_NOT_ALLOWED));
    }
}
