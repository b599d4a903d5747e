//! Error types for docgate.
//!
//! This module provides [`GatewayError`], the error type returned by handlers,
//! interceptors and services, and [`ErrorBody`], the JSON body sent to
//! clients for failed requests.
//!
//! Recoverable client errors are usually not returned as `Err`: the handler
//! that detects them calls [`Exchange::set_in_error`](crate::Exchange::set_in_error)
//! and lets the chain continue. `GatewayError` is for failures that must
//! abort the current handler and reach the server's fault boundary.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Result type alias using [`GatewayError`].
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Categories of errors for classification and status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed or invalid client input.
    Validation,
    /// Missing or invalid credentials.
    Authentication,
    /// Permission denied.
    Authorization,
    /// Resource not found.
    NotFound,
    /// HTTP method not supported by the resource.
    MethodNotAllowed,
    /// Request content is not acceptable (missing or wrong shape).
    NotAcceptable,
    /// Conflicting state, e.g. missing ETag or identity collision.
    Conflict,
    /// ETag precondition did not match.
    PreconditionFailed,
    /// Internal server errors.
    Internal,
    /// Functionality not available in this deployment.
    NotImplemented,
    /// A collaborator (store, query engine) failed.
    External,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this error category.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::Authorization => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            Self::Conflict => StatusCode::CONFLICT,
            Self::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            Self::External => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Standard error type for docgate.
///
/// # Example
///
/// ```
/// use docgate_core::GatewayError;
/// use http::StatusCode;
///
/// let err = GatewayError::conflict("The ETag must be provided using the 'If-Match' header");
/// assert_eq!(err.status_code(), StatusCode::CONFLICT);
/// ```
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Client input failed validation.
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable error message.
        message: String,
    },

    /// Authentication failed.
    #[error("Authentication error: {message}")]
    Authentication {
        /// Human-readable error message.
        message: String,
    },

    /// Authorization denied.
    #[error("Authorization denied: {message}")]
    Authorization {
        /// Human-readable error message.
        message: String,
    },

    /// Resource not found.
    #[error("Not found: {message}")]
    NotFound {
        /// Human-readable error message.
        message: String,
    },

    /// Method not allowed.
    #[error("Method not allowed: {message}")]
    MethodNotAllowed {
        /// Human-readable error message.
        message: String,
    },

    /// Content not acceptable.
    #[error("Not acceptable: {message}")]
    NotAcceptable {
        /// Human-readable error message.
        message: String,
    },

    /// Conflicting state.
    #[error("Conflict: {message}")]
    Conflict {
        /// Human-readable error message.
        message: String,
    },

    /// Precondition failed.
    #[error("Precondition failed: {message}")]
    PreconditionFailed {
        /// Human-readable error message.
        message: String,
    },

    /// Not implemented.
    #[error("Not implemented: {message}")]
    NotImplemented {
        /// Human-readable error message.
        message: String,
    },

    /// A collaborator failed.
    #[error("External error: {message}")]
    External {
        /// Human-readable error message.
        message: String,
        /// The name of the collaborator.
        collaborator: Option<String>,
    },

    /// Internal server error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl GatewayError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an authentication error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates an authorization error.
    #[must_use]
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a method not allowed error.
    #[must_use]
    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::MethodNotAllowed {
            message: message.into(),
        }
    }

    /// Creates a not acceptable error.
    #[must_use]
    pub fn not_acceptable(message: impl Into<String>) -> Self {
        Self::NotAcceptable {
            message: message.into(),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a precondition failed error.
    #[must_use]
    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            message: message.into(),
        }
    }

    /// Creates a not implemented error.
    #[must_use]
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::NotImplemented {
            message: message.into(),
        }
    }

    /// Creates a collaborator error.
    #[must_use]
    pub fn external(message: impl Into<String>, collaborator: Option<impl Into<String>>) -> Self {
        Self::External {
            message: message.into(),
            collaborator: collaborator.map(Into::into),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::Authentication { .. } => ErrorCategory::Authentication,
            Self::Authorization { .. } => ErrorCategory::Authorization,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::MethodNotAllowed { .. } => ErrorCategory::MethodNotAllowed,
            Self::NotAcceptable { .. } => ErrorCategory::NotAcceptable,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::PreconditionFailed { .. } => ErrorCategory::PreconditionFailed,
            Self::NotImplemented { .. } => ErrorCategory::NotImplemented,
            Self::External { .. } => ErrorCategory::External,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.category().default_status_code()
    }

    /// Returns the human-readable message without the category prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message }
            | Self::Authentication { message }
            | Self::Authorization { message }
            | Self::NotFound { message }
            | Self::MethodNotAllowed { message }
            | Self::NotAcceptable { message }
            | Self::Conflict { message }
            | Self::PreconditionFailed { message }
            | Self::NotImplemented { message }
            | Self::External { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    /// Returns true for errors caused by the client (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Builds the error body sent to the client.
    ///
    /// Internal details (the source chain) are only included for server
    /// errors and only when `include_trace` is set.
    #[must_use]
    pub fn to_body(&self, include_trace: bool) -> ErrorBody {
        let body = ErrorBody::new(self.status_code(), self.message());
        let class = format!("{:?}", self.category());
        if include_trace && !self.is_client_error() {
            let trace = cause_chain(self);
            body.with_exception(class, Some(trace))
        } else {
            body.with_exception(class, None)
        }
    }
}

fn cause_chain(error: &GatewayError) -> Vec<String> {
    let mut chain = vec![error.to_string()];
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    chain
}

/// The JSON body returned for failed requests.
///
/// Serialized with the field names clients of the gateway expect:
///
/// ```json
/// {
///   "http status code": 409,
///   "http status description": "Conflict",
///   "message": "The ETag must be provided using the 'If-Match' header"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Numeric status code.
    #[serde(rename = "http status code")]
    pub status: u16,
    /// Canonical reason phrase of the status.
    #[serde(rename = "http status description")]
    pub description: String,
    /// Human-readable message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Exception details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionInfo>,
}

/// Exception details embedded in an [`ErrorBody`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    /// Error class.
    pub class: String,
    /// Cause chain, outermost first.
    #[serde(rename = "stack trace", skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<Vec<String>>,
}

impl ErrorBody {
    /// Creates an error body for the given status and message.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: status.as_u16(),
            description: status.canonical_reason().unwrap_or("Unknown").to_string(),
            message: (!message.is_empty()).then_some(message),
            exception: None,
        }
    }

    /// Adds exception details.
    #[must_use]
    pub fn with_exception(mut self, class: impl Into<String>, stack_trace: Option<Vec<String>>) -> Self {
        self.exception = Some(ExceptionInfo {
            class: class.into(),
            stack_trace,
        });
        self
    }

    /// Converts the body to a JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            let mut fallback = Map::new();
            fallback.insert("http status code".into(), json!(self.status));
            Value::Object(fallback)
        })
    }
}
