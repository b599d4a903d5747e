//! Logging of failed authentication attempts.

use crate::handlers::AUTH_FAILURE;
use docgate_config::{ConfigError, PluginArgs};
use docgate_core::{BoxFuture, Exchange, GatewayResult, InterceptPoint};
use docgate_pipeline::{Interceptor, InterceptorDescriptor};
use tracing::warn;

/// Logs failed authentication attempts.
///
/// Runs at `REQUEST_AFTER_FAILED_AUTH`, disabled by default. Enable it with
/// `plugins-args.failedAuthLogger.enabled = true`; set `include-username`
/// to `false` to omit the presented user name from the log.
#[derive(Debug)]
pub struct FailedAuthLogger {
    include_username: bool,
}

impl FailedAuthLogger {
    /// Registry name of the interceptor.
    pub const NAME: &'static str = "failedAuthLogger";

    /// Creates the interceptor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            include_username: true,
        }
    }

    /// Returns the descriptor to register the interceptor with.
    #[must_use]
    pub fn descriptor() -> InterceptorDescriptor {
        InterceptorDescriptor::new(Self::NAME, InterceptPoint::RequestAfterFailedAuth)
            .description("Logs failed authentication attempts")
            .enabled_by_default(false)
    }
}

impl Default for FailedAuthLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Interceptor for FailedAuthLogger {
    fn init(&mut self, args: &PluginArgs) -> Result<(), ConfigError> {
        self.include_username = args.get_or("include-username", true);
        Ok(())
    }

    fn resolve(&self, exchange: &Exchange) -> bool {
        exchange.has_attachment(AUTH_FAILURE)
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            if let Some(failure) = exchange.attachment(AUTH_FAILURE) {
                let username = if self.include_username {
                    failure.username.as_deref().unwrap_or("<none>")
                } else {
                    "<hidden>"
                };
                warn!(
                    request_id = %exchange.request_id(),
                    authenticator = %failure.authenticator,
                    username,
                    reason = %failure.reason,
                    http.method = %exchange.method(),
                    http.path = exchange.path(),
                    "authentication failed"
                );
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::AuthFailure;
    use docgate_config::GatewayConfig;
    use docgate_pipeline::InterceptorRegistry;
    use http::{Method, StatusCode};
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_disabled_by_default() {
        let registry = InterceptorRegistry::builder()
            .register(FailedAuthLogger::descriptor(), FailedAuthLogger::new())
            .build(&GatewayConfig::default())
            .unwrap();
        assert!(!registry.get(FailedAuthLogger::NAME).unwrap().is_enabled());
    }

    #[test]
    fn test_init_reads_plugin_args() {
        let mut logger = FailedAuthLogger::new();
        let args = PluginArgs::from_map(
            FailedAuthLogger::NAME,
            json!({"enabled": true, "include-username": false})
                .as_object()
                .cloned()
                .unwrap(),
        );
        logger.init(&args).unwrap();
        assert!(!logger.include_username);
    }

    #[tokio::test]
    async fn test_resolves_only_on_failure() {
        let logger = FailedAuthLogger::new();
        let mut exchange = Exchange::new(Method::GET, "/db", "");
        assert!(!logger.resolve(&exchange));

        exchange.attach(
            AUTH_FAILURE,
            AuthFailure {
                authenticator: "basicAuthenticator".into(),
                username: Some("eve".into()),
                reason: "wrong credentials".into(),
            },
        );
        assert!(logger.resolve(&exchange));
        logger.handle(&mut exchange).await.unwrap();
    }

    proptest! {
        #[test]
        fn prop_resolve_is_pure(
            username in proptest::option::of("[a-z]{1,8}"),
            failed in any::<bool>(),
            in_error in any::<bool>(),
        ) {
            let logger = FailedAuthLogger::new();
            let mut exchange = Exchange::new(Method::GET, "/db", "");
            if failed {
                exchange.attach(
                    AUTH_FAILURE,
                    AuthFailure {
                        authenticator: "basicAuthenticator".into(),
                        username,
                        reason: "wrong credentials".into(),
                    },
                );
            }
            if in_error {
                exchange.set_in_error(StatusCode::UNAUTHORIZED, "authentication failed");
            }

            let snapshot = format!("{exchange:?}");
            for _ in 0..3 {
                prop_assert_eq!(logger.resolve(&exchange), failed);
            }
            prop_assert_eq!(format!("{exchange:?}"), snapshot);
        }
    }
}
