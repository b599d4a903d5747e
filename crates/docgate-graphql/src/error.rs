//! GraphQL error types.

use docgate_core::GatewayError;
use http::StatusCode;
use thiserror::Error;

/// Result type for app definition parsing.
pub type AppDefinitionResult<T> = Result<T, AppDefinitionError>;

/// Why an app definition document was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppDefinitionError {
    /// The definition is not a JSON object.
    #[error("app definition must be an object but was {found}")]
    NotAnObject {
        /// JSON type found.
        found: &'static str,
    },

    /// `descriptor` has the wrong shape.
    #[error("error with GraphQL app descriptor: {reason}")]
    InvalidDescriptor {
        /// Description of the problem.
        reason: String,
    },

    /// `schema` is absent.
    #[error("missing schema: please provide a GraphQL schema")]
    MissingSchema,

    /// `schema` is not valid SDL.
    #[error("invalid GraphQL schema: {reason}")]
    InvalidSchema {
        /// Description of the problem.
        reason: String,
    },

    /// `mappings` is absent.
    #[error("missing mappings: please provide a mapping for at least one Query")]
    MissingMappings,

    /// `mappings` is not an object.
    #[error("'mappings' field must be an object but was {found}")]
    InvalidMappings {
        /// JSON type found.
        found: &'static str,
    },

    /// `Query` has no field mapping.
    #[error("missing or empty mappings for type Query: please provide a mapping for at least one Query field")]
    MissingQueryMappings,

    /// A mapped type is not declared in the schema.
    #[error("error with mappings of type {type_name}: the type is not declared in the schema")]
    UndeclaredType {
        /// Mapped type.
        type_name: String,
    },

    /// A mapping entry has the wrong shape.
    #[error("error with field {field} of type {type_name}: {reason}")]
    InvalidMapping {
        /// Mapped type.
        type_name: String,
        /// Mapped field.
        field: String,
        /// Description of the problem.
        reason: String,
    },

    /// Another stored definition already uses the URI.
    #[error("an app definition with uri '{uri}' already exists")]
    DuplicateUri {
        /// The colliding URI.
        uri: String,
    },
}

impl AppDefinitionError {
    pub(crate) fn descriptor(reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            reason: reason.into(),
        }
    }

    pub(crate) fn schema(reason: impl Into<String>) -> Self {
        Self::InvalidSchema {
            reason: reason.into(),
        }
    }

    pub(crate) fn mapping(
        type_name: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidMapping {
            type_name: type_name.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the definition collides with another one.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::DuplicateUri { .. })
    }

    /// Returns the status answered for this rejection: 409 for a collision,
    /// 400 for a malformed definition.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        if self.is_conflict() {
            StatusCode::CONFLICT
        } else {
            StatusCode::BAD_REQUEST
        }
    }
}

impl From<AppDefinitionError> for GatewayError {
    fn from(err: AppDefinitionError) -> Self {
        if err.is_conflict() {
            Self::conflict(err.to_string())
        } else {
            Self::validation(err.to_string())
        }
    }
}

/// Failure to resolve a `$arg` or `$fk` placeholder.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InterpolationError {
    /// No value for the placeholder.
    #[error("variable {name} not bound")]
    NotBound {
        /// Argument name or foreign key path.
        name: String,
    },

    /// A foreign key path indexes past the end of an array.
    #[error("index out of bounds in {path}")]
    IndexOutOfBounds {
        /// The foreign key path.
        path: String,
    },

    /// A placeholder operand is not a string.
    #[error("{operator} value must be a string")]
    InvalidOperand {
        /// `$arg` or `$fk`.
        operator: &'static str,
    },
}

impl From<InterpolationError> for GatewayError {
    fn from(err: InterpolationError) -> Self {
        Self::validation(err.to_string())
    }
}
