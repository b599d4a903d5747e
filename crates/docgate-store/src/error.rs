//! Store error types.

use docgate_core::GatewayError;
use thiserror::Error;

/// Errors raised by a document store.
///
/// ETag failures and missing documents are not errors: they are reported
/// through [`OperationResult`](crate::OperationResult) status codes.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The query filter is malformed.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// The update document is malformed or cannot be applied.
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    /// The document content is malformed.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// The store cannot be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Creates an invalid filter error.
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter(message.into())
    }

    /// Creates an invalid update error.
    pub fn invalid_update(message: impl Into<String>) -> Self {
        Self::InvalidUpdate(message.into())
    }

    /// Creates an invalid document error.
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument(message.into())
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidFilter(_)
            | StoreError::InvalidUpdate(_)
            | StoreError::InvalidDocument(_) => GatewayError::validation(err.to_string()),
            StoreError::Unavailable(_) => GatewayError::external(err.to_string(), Some("store")),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
