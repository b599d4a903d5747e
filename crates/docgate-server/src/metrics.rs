//! The `requestsMetrics` interceptor.

use docgate_core::{BoxFuture, Exchange, GatewayResult, InterceptPoint};
use docgate_pipeline::{Interceptor, InterceptorDescriptor};
use docgate_telemetry::metrics::record_request;
use http::StatusCode;

/// Records request count and latency after the response is settled.
///
/// Runs at `RESPONSE_ASYNC`, so it observes the final status without
/// delaying the response. Disable it with
/// `plugins-args.requestsMetrics.enabled = false`.
#[derive(Debug, Default)]
pub struct RequestsMetrics;

impl RequestsMetrics {
    /// Registry name of the interceptor.
    pub const NAME: &'static str = "requestsMetrics";

    /// Creates the interceptor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns the descriptor to register the interceptor with.
    #[must_use]
    pub fn descriptor() -> InterceptorDescriptor {
        InterceptorDescriptor::new(Self::NAME, InterceptPoint::ResponseAsync)
            .description("Records request count and duration metrics")
    }
}

impl Interceptor for RequestsMetrics {
    fn resolve(&self, _exchange: &Exchange) -> bool {
        true
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            let status = exchange.status().unwrap_or(StatusCode::OK);
            record_request(exchange.method().as_str(), status.as_u16(), exchange.elapsed());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    #[test]
    fn test_descriptor() {
        let descriptor = RequestsMetrics::descriptor();
        assert_eq!(descriptor.name(), "requestsMetrics");
        assert_eq!(descriptor.point(), InterceptPoint::ResponseAsync);
        assert!(descriptor.is_enabled_by_default());
    }

    #[tokio::test]
    async fn test_records_without_recorder() {
        let interceptor = RequestsMetrics::new();
        let mut exchange = Exchange::new(Method::GET, "/ping", "");
        exchange.set_status(StatusCode::OK);

        assert!(interceptor.resolve(&exchange));
        interceptor.handle(&mut exchange).await.unwrap();
    }
}
