//! Adapter that places a non-chained unit in a pipeline.
//!
//! The wrapped unit is either a bare [`Handler`] (its own link is never
//! followed) or a typed [`Service`]. After the unit returns, the adapter
//! forwards to its next handler unless the response was completed.

use crate::handler::{Handler, Link, SharedHandler};
use crate::service::Service;
use docgate_core::{BoxFuture, Exchange, GatewayResult};
use std::sync::Arc;
use std::time::Instant;

enum Wrapped {
    Empty,
    Unit(SharedHandler),
    Service(Arc<dyn Service>),
}

/// Places a bare handler or a typed service in a pipeline.
pub struct WrappingHandler {
    link: Link,
    name: String,
    wrapped: Wrapped,
}

impl WrappingHandler {
    /// Creates an adapter that wraps nothing and always forwards.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            link: Link::new(),
            name: "wrapping".to_string(),
            wrapped: Wrapped::Empty,
        }
    }

    /// Wraps a bare handler.
    #[must_use]
    pub fn wrap(unit: SharedHandler) -> Self {
        Self {
            link: Link::new(),
            name: format!("wrapping({})", unit.name()),
            wrapped: Wrapped::Unit(unit),
        }
    }

    /// Wraps a typed service.
    #[must_use]
    pub fn wrap_service(service: Arc<dyn Service>) -> Self {
        Self {
            link: Link::new(),
            name: format!("wrapping({})", service.name()),
            wrapped: Wrapped::Service(service),
        }
    }

    async fn invoke_service(
        &self,
        service: &dyn Service,
        exchange: &mut Exchange,
    ) -> GatewayResult<()> {
        let request = match service.request(exchange) {
            Ok(request) => request,
            Err(e) if e.is_client_error() => {
                exchange.set_in_error(e.status_code(), e.message());
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let mut response = service.response(exchange);

        let started = Instant::now();
        tracing::debug!(
            phase = "service.start",
            service = service.name(),
            service_type = service.type_name(),
            request_id = %exchange.request_id(),
            "Service invoked"
        );

        match service.handle(&request, &mut response).await {
            Ok(()) => {
                tracing::debug!(
                    phase = "service.end",
                    service = service.name(),
                    service_type = service.type_name(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Service returned"
                );
                response.commit(exchange);
                Ok(())
            }
            Err(e) => {
                let thread = std::thread::current();
                tracing::error!(
                    phase = "service.error",
                    service = service.name(),
                    service_type = service.type_name(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    thread = ?thread.id(),
                    thread_name = thread.name().unwrap_or("unnamed"),
                    http.method = %exchange.method(),
                    http.path = exchange.path(),
                    error = %e,
                    "Service failed"
                );
                Err(e)
            }
        }
    }
}

impl Handler for WrappingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn link(&self) -> &Link {
        &self.link
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            match &self.wrapped {
                Wrapped::Empty => {}
                _ if exchange.is_in_error() => {}
                Wrapped::Unit(unit) => unit.handle(exchange).await?,
                Wrapped::Service(service) => {
                    self.invoke_service(service.as_ref(), exchange).await?;
                }
            }

            if exchange.is_response_complete() {
                return Ok(());
            }
            self.link.forward(exchange).await
        })
    }
}
