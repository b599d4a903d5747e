//! ETag check policy.
//!
//! Decides, per request, whether the write handlers must enforce the ETag
//! precondition. The client can always force the check by sending
//! `If-Match` or the `checkEtag` query parameter; otherwise the configured
//! policy for the addressed resource kind applies.

use crate::resource::{ResourceRef, RESOURCE};
use docgate_config::{EtagCheckPolicy, EtagPolicy};
use docgate_core::{AttachmentKey, BoxFuture, Exchange, GatewayResult};
use docgate_pipeline::{Handler, Link};
use docgate_store::Etag;
use http::header::IF_MATCH;
use http::Method;

/// Whether the ETag precondition is enforced for this exchange.
pub const ETAG_CHECK: AttachmentKey<bool> = AttachmentKey::new("etag-check");

/// Query parameter forcing the ETag check.
pub const CHECK_ETAG_PARAM: &str = "checkEtag";

/// Returns the `If-Match` tag sent by the client.
#[must_use]
pub fn if_match(exchange: &Exchange) -> Option<Etag> {
    exchange.header(IF_MATCH.as_str()).and_then(Etag::from_header)
}

fn policy_for(policies: &EtagCheckPolicy, resource: &ResourceRef) -> EtagPolicy {
    match resource {
        ResourceRef::Root | ResourceRef::Database { .. } => policies.db,
        ResourceRef::Collection { .. } => policies.coll,
        ResourceRef::Document(_) => policies.doc,
    }
}

/// Returns true if `policy` requires the check for `method`.
#[must_use]
pub fn requires_check(policy: EtagPolicy, method: &Method) -> bool {
    match policy {
        EtagPolicy::Required => {
            *method == Method::PUT
                || *method == Method::PATCH
                || *method == Method::POST
                || *method == Method::DELETE
        }
        EtagPolicy::RequiredForDelete => *method == Method::DELETE,
        EtagPolicy::Optional => false,
    }
}

/// Handler that attaches the [`ETAG_CHECK`] decision.
#[derive(Debug)]
pub struct EtagPolicyInjector {
    link: Link,
    policies: EtagCheckPolicy,
}

impl EtagPolicyInjector {
    /// Creates the handler.
    #[must_use]
    pub fn new(policies: EtagCheckPolicy) -> Self {
        Self {
            link: Link::new(),
            policies,
        }
    }

    fn decide(&self, exchange: &Exchange) -> bool {
        if exchange.header(IF_MATCH.as_str()).is_some()
            || exchange.query().contains(CHECK_ETAG_PARAM)
        {
            return true;
        }
        exchange
            .attachment(RESOURCE)
            .is_some_and(|resource| requires_check(policy_for(&self.policies, resource), exchange.method()))
    }
}

impl Handler for EtagPolicyInjector {
    fn name(&self) -> &str {
        "etagPolicyInjector"
    }

    fn link(&self) -> &Link {
        &self.link
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            let check = self.decide(exchange);
            exchange.attach(ETAG_CHECK, check);
            self.link.forward(exchange).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgate_store::DocumentRef;

    async fn decision(policies: EtagCheckPolicy, exchange: Exchange) -> bool {
        let mut exchange = exchange;
        exchange.attach(
            RESOURCE,
            ResourceRef::Document(DocumentRef::new("db", "coll", "d1")),
        );
        EtagPolicyInjector::new(policies).handle(&mut exchange).await.unwrap();
        *exchange.attachment(ETAG_CHECK).unwrap()
    }

    #[test]
    fn test_requires_check() {
        assert!(requires_check(EtagPolicy::Required, &Method::PUT));
        assert!(!requires_check(EtagPolicy::Required, &Method::GET));
        assert!(requires_check(EtagPolicy::RequiredForDelete, &Method::DELETE));
        assert!(!requires_check(EtagPolicy::RequiredForDelete, &Method::PATCH));
        assert!(!requires_check(EtagPolicy::Optional, &Method::DELETE));
    }

    #[tokio::test]
    async fn test_default_policy_requires_document_etag() {
        let put = Exchange::new(Method::PUT, "/db/coll/d1", "");
        assert!(decision(EtagCheckPolicy::default(), put).await);
    }

    #[tokio::test]
    async fn test_client_forces_check() {
        let optional = EtagCheckPolicy {
            doc: EtagPolicy::Optional,
            ..EtagCheckPolicy::default()
        };

        let plain = Exchange::new(Method::PUT, "/db/coll/d1", "");
        assert!(!decision(optional, plain).await);

        let with_header = Exchange::new(Method::PUT, "/db/coll/d1", "").with_header("if-match", "\"e1\"");
        assert!(decision(optional, with_header).await);

        let with_param = Exchange::new(Method::PUT, "/db/coll/d1", "checkEtag");
        assert!(decision(optional, with_param).await);
    }

    #[test]
    fn test_if_match_parsing() {
        let exchange = Exchange::new(Method::PUT, "/", "").with_header("if-match", "W/\"e1\"");
        assert_eq!(if_match(&exchange), Some(Etag::from("e1")));
    }
}
