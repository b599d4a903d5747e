//! Interception points.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A lifecycle phase at which interceptors may run.
///
/// The variants are declared in lifecycle order:
///
/// ```text
/// RequestBeforeAuth → (auth) → RequestAfterAuth → write → Response → ResponseAsync
///                        └──→ RequestAfterFailedAuth
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterceptPoint {
    /// Before authentication runs.
    RequestBeforeAuth,
    /// After authentication failed, before the 401 response is sent.
    RequestAfterFailedAuth,
    /// After authentication and authorization succeeded.
    RequestAfterAuth,
    /// After the service produced a response, before it is sent.
    Response,
    /// After the response, detached from the request task.
    ResponseAsync,
}

impl InterceptPoint {
    /// Returns every interception point in lifecycle order.
    #[must_use]
    pub const fn all() -> [Self; 5] {
        [
            Self::RequestBeforeAuth,
            Self::RequestAfterFailedAuth,
            Self::RequestAfterAuth,
            Self::Response,
            Self::ResponseAsync,
        ]
    }

    /// Returns the configuration name of this point.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RequestBeforeAuth => "REQUEST_BEFORE_AUTH",
            Self::RequestAfterFailedAuth => "REQUEST_AFTER_FAILED_AUTH",
            Self::RequestAfterAuth => "REQUEST_AFTER_AUTH",
            Self::Response => "RESPONSE",
            Self::ResponseAsync => "RESPONSE_ASYNC",
        }
    }

    /// Returns true for the phases that run before the service.
    #[must_use]
    pub const fn is_request_phase(&self) -> bool {
        matches!(
            self,
            Self::RequestBeforeAuth | Self::RequestAfterFailedAuth | Self::RequestAfterAuth
        )
    }
}

impl fmt::Display for InterceptPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_order() {
        let all = InterceptPoint::all();
        let mut sorted = all;
        sorted.sort();
        assert_eq!(all, sorted);
        assert_eq!(all[0], InterceptPoint::RequestBeforeAuth);
        assert_eq!(all[4], InterceptPoint::ResponseAsync);
    }

    #[test]
    fn test_request_phases() {
        assert!(InterceptPoint::RequestAfterAuth.is_request_phase());
        assert!(!InterceptPoint::Response.is_request_phase());
        assert!(!InterceptPoint::ResponseAsync.is_request_phase());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&InterceptPoint::ResponseAsync).unwrap();
        assert_eq!(json, "\"RESPONSE_ASYNC\"");
        let point: InterceptPoint = serde_json::from_str("\"REQUEST_AFTER_AUTH\"").unwrap();
        assert_eq!(point, InterceptPoint::RequestAfterAuth);
        assert_eq!(point.to_string(), "REQUEST_AFTER_AUTH");
    }
}
