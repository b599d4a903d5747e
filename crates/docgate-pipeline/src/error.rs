//! Pipeline construction errors.
//!
//! These errors are raised while the pipelines and the interceptor registry
//! are assembled at bootstrap. Request-time failures use
//! [`GatewayError`](docgate_core::GatewayError).

use docgate_config::ConfigError;
use thiserror::Error;

/// Errors raised while building pipelines or the interceptor registry.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A handler already has a next handler.
    #[error("Handler '{handler}' is already linked to a next handler")]
    AlreadyLinked {
        /// The handler name.
        handler: String,
    },

    /// The same handler instance appears twice in one chain.
    #[error("Handler '{handler}' appears more than once in the chain")]
    DuplicateHandler {
        /// The handler name.
        handler: String,
    },

    /// Two interceptors were registered under the same name.
    #[error("Interceptor '{name}' is registered more than once")]
    DuplicateInterceptor {
        /// The interceptor name.
        name: String,
    },

    /// An interceptor rejected its configuration.
    #[error("Interceptor '{name}' failed to initialize: {source}")]
    InterceptorInit {
        /// The interceptor name.
        name: String,
        /// The configuration error.
        #[source]
        source: ConfigError,
    },
}

impl PipelineError {
    /// Creates an already-linked error.
    pub fn already_linked(handler: impl Into<String>) -> Self {
        Self::AlreadyLinked {
            handler: handler.into(),
        }
    }

    /// Creates a duplicate handler error.
    pub fn duplicate_handler(handler: impl Into<String>) -> Self {
        Self::DuplicateHandler {
            handler: handler.into(),
        }
    }

    /// Creates a duplicate interceptor error.
    pub fn duplicate_interceptor(name: impl Into<String>) -> Self {
        Self::DuplicateInterceptor { name: name.into() }
    }
}
