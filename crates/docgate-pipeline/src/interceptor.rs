//! Interceptors.
//!
//! An [`Interceptor`] is a named unit of cross-cutting behavior that is not
//! chained statically. It declares an [`InterceptPoint`] and a resolve
//! predicate; the phase executors invoke it on every request whose exchange
//! the predicate accepts.
//!
//! # Example
//!
//! ```
//! use docgate_core::{BoxFuture, Exchange, GatewayResult, InterceptPoint};
//! use docgate_pipeline::{Interceptor, InterceptorDescriptor};
//!
//! struct AddServerHeader;
//!
//! impl Interceptor for AddServerHeader {
//!     fn resolve(&self, exchange: &Exchange) -> bool {
//!         !exchange.is_in_error()
//!     }
//!
//!     fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>> {
//!         Box::pin(async move {
//!             exchange.set_response_header(http::header::SERVER, "docgate");
//!             Ok(())
//!         })
//!     }
//! }
//!
//! let descriptor = InterceptorDescriptor::new("serverHeader", InterceptPoint::Response)
//!     .description("adds the Server header");
//! assert!(descriptor.is_enabled_by_default());
//! ```

use docgate_config::{ConfigError, ConfigScope, PluginArgs};
use docgate_core::{BoxFuture, Exchange, GatewayResult, InterceptPoint};

/// A phase-tagged, predicate-gated unit of behavior.
///
/// Interceptors are instantiated once at startup and shared by all requests;
/// per-request state must live on the [`Exchange`].
pub trait Interceptor: Send + Sync + 'static {
    /// Receives the plugin arguments, exactly once, before first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments are unusable. Absent arguments are
    /// not an error: fall back to defaults.
    fn init(&mut self, args: &PluginArgs) -> Result<(), ConfigError> {
        let _ = args;
        Ok(())
    }

    /// Decides whether this interceptor applies to the exchange.
    ///
    /// Must not mutate anything: calling it repeatedly on the same exchange
    /// returns the same answer.
    fn resolve(&self, exchange: &Exchange) -> bool;

    /// Runs the interceptor.
    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>>;
}

/// Registration metadata of an interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptorDescriptor {
    name: String,
    description: String,
    point: InterceptPoint,
    enabled_by_default: bool,
    priority: i32,
    scope: ConfigScope,
}

impl InterceptorDescriptor {
    /// Creates a descriptor, enabled by default with priority 10.
    pub fn new(name: impl Into<String>, point: InterceptPoint) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            point,
            enabled_by_default: true,
            priority: 10,
            scope: ConfigScope::Plugin,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets whether the interceptor runs when not configured explicitly.
    #[must_use]
    pub fn enabled_by_default(mut self, enabled: bool) -> Self {
        self.enabled_by_default = enabled;
        self
    }

    /// Sets the priority. Lower values run first.
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets which configuration the interceptor receives at init.
    #[must_use]
    pub fn scope(mut self, scope: ConfigScope) -> Self {
        self.scope = scope;
        self
    }

    /// Returns the name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description.
    #[must_use]
    pub fn get_description(&self) -> &str {
        &self.description
    }

    /// Returns the interception point.
    #[must_use]
    pub fn point(&self) -> InterceptPoint {
        self.point
    }

    /// Returns the default enabled flag.
    #[must_use]
    pub fn is_enabled_by_default(&self) -> bool {
        self.enabled_by_default
    }

    /// Returns the priority.
    #[must_use]
    pub fn get_priority(&self) -> i32 {
        self.priority
    }

    /// Returns the configuration scope.
    #[must_use]
    pub fn get_scope(&self) -> ConfigScope {
        self.scope
    }
}

/// An interceptor built from a synchronous predicate and action.
pub struct FnInterceptor<R, H> {
    resolve: R,
    handle: H,
}

impl<R, H> FnInterceptor<R, H>
where
    R: Fn(&Exchange) -> bool + Send + Sync + 'static,
    H: Fn(&mut Exchange) -> GatewayResult<()> + Send + Sync + 'static,
{
    /// Creates a function-based interceptor.
    pub const fn new(resolve: R, handle: H) -> Self {
        Self { resolve, handle }
    }
}

impl<R, H> Interceptor for FnInterceptor<R, H>
where
    R: Fn(&Exchange) -> bool + Send + Sync + 'static,
    H: Fn(&mut Exchange) -> GatewayResult<()> + Send + Sync + 'static,
{
    fn resolve(&self, exchange: &Exchange) -> bool {
        (self.resolve)(exchange)
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move { (self.handle)(exchange) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};

    #[test]
    fn test_descriptor_defaults() {
        let descriptor = InterceptorDescriptor::new("x", InterceptPoint::RequestAfterAuth);
        assert_eq!(descriptor.name(), "x");
        assert_eq!(descriptor.get_description(), "");
        assert_eq!(descriptor.point(), InterceptPoint::RequestAfterAuth);
        assert!(descriptor.is_enabled_by_default());
        assert_eq!(descriptor.get_priority(), 10);
        assert_eq!(descriptor.get_scope(), ConfigScope::Plugin);
    }

    #[test]
    fn test_descriptor_builder() {
        let descriptor = InterceptorDescriptor::new("x", InterceptPoint::ResponseAsync)
            .description("records metrics")
            .enabled_by_default(false)
            .priority(-5)
            .scope(ConfigScope::Global);
        assert_eq!(descriptor.get_description(), "records metrics");
        assert!(!descriptor.is_enabled_by_default());
        assert_eq!(descriptor.get_priority(), -5);
        assert_eq!(descriptor.get_scope(), ConfigScope::Global);
    }

    #[tokio::test]
    async fn test_fn_interceptor() {
        let interceptor = FnInterceptor::new(
            |exchange: &Exchange| exchange.method() == Method::DELETE,
            |exchange: &mut Exchange| {
                exchange.set_status(StatusCode::ACCEPTED);
                Ok(())
            },
        );

        let mut get = Exchange::new(Method::GET, "/db/coll/1", "");
        let mut delete = Exchange::new(Method::DELETE, "/db/coll/1", "");
        assert!(!interceptor.resolve(&get));
        assert!(interceptor.resolve(&delete));

        interceptor.handle(&mut delete).await.unwrap();
        assert_eq!(delete.status(), Some(StatusCode::ACCEPTED));

        interceptor.handle(&mut get).await.unwrap();
        assert_eq!(get.status(), Some(StatusCode::ACCEPTED));
    }

    #[test]
    fn test_default_init_accepts_anything() {
        let mut interceptor = FnInterceptor::new(|_: &Exchange| true, |_: &mut Exchange| Ok(()));
        let args = PluginArgs::from_map("x", serde_json::Map::new());
        assert!(interceptor.init(&args).is_ok());
    }
}
