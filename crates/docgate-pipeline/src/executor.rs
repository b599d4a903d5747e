//! Phase executors.
//!
//! Executors are the handlers that dispatch interceptors. A request executor
//! is placed in the chain once per request interception point; the response
//! executor runs the response phases once per exchange.

use crate::handler::{Handler, Link};
use crate::registry::{InterceptorRegistry, SharedRegistry};
use crate::service::dont_intercept;
use docgate_core::{BoxFuture, Exchange, GatewayResult, InterceptPoint};
use http::StatusCode;
use std::sync::Arc;

/// Runs the interceptors of a request point on the exchange.
///
/// Each interceptor's resolve predicate is evaluated just before it would
/// run, so it observes what earlier interceptors of the same phase did. A
/// failing interceptor marks the exchange in error and stops the phase.
///
/// # Errors
///
/// Returns the first interceptor failure.
pub async fn run_request_phase(
    registry: &InterceptorRegistry,
    point: InterceptPoint,
    exchange: &mut Exchange,
) -> GatewayResult<()> {
    if dont_intercept(exchange, point) {
        return Ok(());
    }

    for entry in registry.interceptors(point) {
        if !entry.applies_to(exchange) {
            continue;
        }

        if let Err(e) = entry.interceptor().handle(exchange).await {
            tracing::error!(
                interceptor = entry.name(),
                intercept_point = %point,
                http.path = exchange.path(),
                error = %e,
                "Error executing interceptor"
            );
            if !exchange.is_in_error() {
                exchange.set_in_error(e.status_code(), e.message());
            }
            return Err(e);
        }
    }

    Ok(())
}

/// Handler that dispatches the interceptors of one request point.
pub struct RequestInterceptorsExecutor {
    link: Link,
    name: String,
    point: InterceptPoint,
    registry: SharedRegistry,
}

impl RequestInterceptorsExecutor {
    /// Creates an executor for a request interception point.
    #[must_use]
    pub fn new(point: InterceptPoint, registry: SharedRegistry) -> Self {
        debug_assert!(point.is_request_phase());
        Self {
            link: Link::new(),
            name: format!("requestInterceptors({point})"),
            point,
            registry,
        }
    }

    /// Returns the interception point.
    #[must_use]
    pub fn point(&self) -> InterceptPoint {
        self.point
    }
}

impl Handler for RequestInterceptorsExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    fn link(&self) -> &Link {
        &self.link
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            if !exchange.is_in_error() {
                run_request_phase(&self.registry, self.point, exchange).await?;
            }

            if exchange.is_in_error() && exchange.status().is_none() {
                exchange.set_status(StatusCode::BAD_REQUEST);
            }

            self.link.forward(exchange).await
        })
    }
}

/// Handler that dispatches the response interceptors.
///
/// Runs at most once per exchange. `Response` interceptors run inline; the
/// `ResponseAsync` interceptors then run on a detached copy of the exchange
/// in a spawned task that the response path never awaits.
pub struct ResponseInterceptorsExecutor {
    link: Link,
    registry: SharedRegistry,
}

impl ResponseInterceptorsExecutor {
    /// Creates the response executor.
    #[must_use]
    pub fn new(registry: SharedRegistry) -> Self {
        Self {
            link: Link::new(),
            registry,
        }
    }

    async fn run_inline(&self, exchange: &mut Exchange) -> GatewayResult<()> {
        if dont_intercept(exchange, InterceptPoint::Response) {
            return Ok(());
        }

        for entry in self.registry.interceptors(InterceptPoint::Response) {
            if !entry.applies_to(exchange) {
                continue;
            }
            if let Err(e) = entry.interceptor().handle(exchange).await {
                tracing::error!(
                    interceptor = entry.name(),
                    intercept_point = %InterceptPoint::Response,
                    http.path = exchange.path(),
                    error = %e,
                    "Error executing interceptor"
                );
                exchange.set_in_error(e.status_code(), e.message());
                return Err(e);
            }
        }
        Ok(())
    }

    fn spawn_async(&self, exchange: &Exchange) {
        if dont_intercept(exchange, InterceptPoint::ResponseAsync)
            || self
                .registry
                .interceptors(InterceptPoint::ResponseAsync)
                .is_empty()
        {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No async runtime; skipping async response interceptors");
            return;
        };

        let registry = Arc::clone(&self.registry);
        let mut detached = exchange.detached_copy();
        runtime.spawn(async move {
            run_async_phase(&registry, &mut detached).await;
        });
    }
}

/// Runs the `ResponseAsync` interceptors; failures are logged only.
async fn run_async_phase(registry: &InterceptorRegistry, exchange: &mut Exchange) {
    for entry in registry.interceptors(InterceptPoint::ResponseAsync) {
        if !entry.applies_to(exchange) {
            continue;
        }
        if let Err(e) = entry.interceptor().handle(exchange).await {
            tracing::error!(
                interceptor = entry.name(),
                intercept_point = %InterceptPoint::ResponseAsync,
                request_id = %exchange.request_id(),
                http.path = exchange.path(),
                error = %e,
                "Error executing async interceptor"
            );
        }
    }
}

impl Handler for ResponseInterceptorsExecutor {
    fn name(&self) -> &str {
        "responseInterceptors"
    }

    fn link(&self) -> &Link {
        &self.link
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            if exchange.response_interceptors_executed() {
                return self.link.forward(exchange).await;
            }
            exchange.mark_response_interceptors_executed();

            let inline = self.run_inline(exchange).await;
            self.spawn_async(exchange);
            inline?;

            self.link.forward(exchange).await
        })
    }
}
