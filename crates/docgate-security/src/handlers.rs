//! Authentication and authorization handlers.
//!
//! # Pipeline Position
//!
//! ```text
//! RequestInterceptors(REQUEST_BEFORE_AUTH) → [Authentication] → [Authorization]
//!   → RequestInterceptors(REQUEST_AFTER_AUTH) → service
//! ```
//!
//! Both handlers answer in band: a rejected request is marked in error and
//! forwarded, so that response interceptors still observe it.

use crate::authenticator::{AuthOutcome, Authenticator};
use crate::authorizer::Authorizer;
use docgate_core::{AttachmentKey, BoxFuture, Exchange, GatewayResult, InterceptPoint};
use docgate_pipeline::{run_request_phase, Handler, Link, SharedRegistry};
use http::header::WWW_AUTHENTICATE;
use http::StatusCode;
use std::sync::Arc;
use tracing::debug;

/// Details of a failed authentication attempt.
///
/// Attached before the `REQUEST_AFTER_FAILED_AUTH` interceptors run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    /// Authenticator that rejected the request.
    pub authenticator: String,
    /// User name presented, when known.
    pub username: Option<String>,
    /// Why authentication failed.
    pub reason: String,
}

/// Attachment holding the [`AuthFailure`] of the exchange.
pub const AUTH_FAILURE: AttachmentKey<AuthFailure> = AttachmentKey::new("auth-failure");

/// Handler that authenticates the request.
pub struct AuthenticationHandler {
    link: Link,
    authenticator: Arc<dyn Authenticator>,
    registry: SharedRegistry,
}

impl AuthenticationHandler {
    /// Creates the handler.
    ///
    /// The registry provides the `REQUEST_AFTER_FAILED_AUTH` interceptors.
    #[must_use]
    pub fn new(authenticator: Arc<dyn Authenticator>, registry: SharedRegistry) -> Self {
        Self {
            link: Link::new(),
            authenticator,
            registry,
        }
    }
}

impl Handler for AuthenticationHandler {
    fn name(&self) -> &str {
        "authentication"
    }

    fn link(&self) -> &Link {
        &self.link
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            if exchange.is_in_error() {
                return self.link.forward(exchange).await;
            }

            match self.authenticator.authenticate(exchange).await {
                AuthOutcome::Authenticated(account) => {
                    debug!(
                        authenticator = self.authenticator.name(),
                        account = account.name(),
                        "request authenticated"
                    );
                    exchange.set_account(Some(account));
                }
                AuthOutcome::NotAttempted => {}
                AuthOutcome::Failed { username, reason } => {
                    exchange.set_in_error(StatusCode::UNAUTHORIZED, "Unauthorized");
                    if let Some(challenge) = self.authenticator.challenge() {
                        exchange.set_response_header(WWW_AUTHENTICATE, &challenge);
                    }
                    exchange.attach(
                        AUTH_FAILURE,
                        AuthFailure {
                            authenticator: self.authenticator.name().to_string(),
                            username,
                            reason,
                        },
                    );
                    run_request_phase(&self.registry, InterceptPoint::RequestAfterFailedAuth, exchange)
                        .await?;
                }
            }

            self.link.forward(exchange).await
        })
    }
}

/// Handler that authorizes the request.
pub struct AuthorizationHandler {
    link: Link,
    authorizer: Arc<dyn Authorizer>,
    challenge: Option<String>,
}

impl AuthorizationHandler {
    /// Creates the handler.
    #[must_use]
    pub fn new(authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            link: Link::new(),
            authorizer,
            challenge: None,
        }
    }

    /// Sets the challenge sent when an anonymous request is denied.
    #[must_use]
    pub fn with_challenge(mut self, challenge: Option<String>) -> Self {
        self.challenge = challenge;
        self
    }
}

impl Handler for AuthorizationHandler {
    fn name(&self) -> &str {
        "authorization"
    }

    fn link(&self) -> &Link {
        &self.link
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            if !exchange.is_in_error() && !self.authorizer.is_allowed(exchange) {
                debug!(
                    authorizer = self.authorizer.name(),
                    http.method = %exchange.method(),
                    http.path = exchange.path(),
                    "request denied"
                );
                if exchange.account().is_some() {
                    exchange.set_in_error(StatusCode::FORBIDDEN, "Forbidden");
                } else {
                    exchange.set_in_error(StatusCode::UNAUTHORIZED, "Unauthorized");
                    if let Some(challenge) = &self.challenge {
                        exchange.set_response_header(WWW_AUTHENTICATE, challenge);
                    }
                }
            }

            self.link.forward(exchange).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticator::BasicAuthenticator;
    use crate::authorizer::AclAuthorizer;
    use docgate_config::{GatewayConfig, UserConfig};
    use docgate_pipeline::{InterceptorRegistry, PipelineBuilder, SharedHandler};
    use http::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static FAILED_AUTH_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn chain() -> SharedHandler {
        let registry = Arc::new(
            InterceptorRegistry::builder()
                .register_fn(
                    "countFailures",
                    InterceptPoint::RequestAfterFailedAuth,
                    |exchange: &Exchange| exchange.has_attachment(AUTH_FAILURE),
                    |_: &mut Exchange| {
                        FAILED_AUTH_CALLS.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    },
                )
                .build(&GatewayConfig::default())
                .unwrap(),
        );
        let authenticator = Arc::new(
            BasicAuthenticator::new(
                "docgate",
                &[UserConfig {
                    name: "ann".into(),
                    password: "pw".into(),
                    roles: vec!["reader".into()],
                }],
            )
            .unwrap(),
        );
        let acl = Arc::new(
            AclAuthorizer::builder()
                .allow_role("reader", ["GET"], "/")
                .build()
                .unwrap(),
        );
        let challenge = authenticator.challenge();

        PipelineBuilder::new()
            .then(Arc::new(AuthenticationHandler::new(authenticator, registry)))
            .then(Arc::new(AuthorizationHandler::new(acl).with_challenge(challenge)))
            .build()
            .unwrap()
            .unwrap()
    }

    fn request(method: Method, authorization: Option<&str>) -> Exchange {
        let exchange = Exchange::new(method, "/db/coll", "");
        match authorization {
            Some(value) => exchange.with_header("authorization", value),
            None => exchange,
        }
    }

    #[tokio::test]
    async fn test_authenticated_and_allowed() {
        let mut exchange = request(Method::GET, Some("Basic YW5uOnB3"));
        chain().handle(&mut exchange).await.unwrap();
        assert!(!exchange.is_in_error());
        assert_eq!(exchange.account().unwrap().name(), "ann");
    }

    #[tokio::test]
    async fn test_authenticated_but_forbidden() {
        let mut exchange = request(Method::DELETE, Some("Basic YW5uOnB3"));
        chain().handle(&mut exchange).await.unwrap();
        assert_eq!(exchange.status(), Some(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn test_anonymous_denied_with_challenge() {
        let mut exchange = request(Method::GET, None);
        chain().handle(&mut exchange).await.unwrap();
        assert_eq!(exchange.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(
            exchange.response_headers().get(WWW_AUTHENTICATE).unwrap(),
            "Basic realm=\"docgate\""
        );
    }

    #[tokio::test]
    async fn test_wrong_credentials_run_failed_auth_phase() {
        let before = FAILED_AUTH_CALLS.load(Ordering::SeqCst);
        let mut exchange = request(Method::GET, Some("Basic YW5uOmJhZA=="));
        chain().handle(&mut exchange).await.unwrap();

        assert_eq!(exchange.status(), Some(StatusCode::UNAUTHORIZED));
        assert!(exchange.account().is_none());
        assert_eq!(exchange.attachment(AUTH_FAILURE).unwrap().username.as_deref(), Some("ann"));
        assert_eq!(FAILED_AUTH_CALLS.load(Ordering::SeqCst), before + 1);
    }
}
