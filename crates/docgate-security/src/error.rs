//! Error types for the security crate.

use thiserror::Error;

/// Result type for security setup.
pub type SecurityResult<T> = Result<T, SecurityError>;

/// Errors raised while building authenticators and authorizers from
/// configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SecurityError {
    /// A permission entry is malformed.
    #[error("invalid permission for role '{role}': {reason}")]
    InvalidPermission {
        /// Role of the offending entry.
        role: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A user entry is malformed.
    #[error("invalid user '{name}': {reason}")]
    InvalidUser {
        /// User name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl SecurityError {
    /// Creates an invalid permission error.
    pub fn invalid_permission(role: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPermission {
            role: role.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid user error.
    pub fn invalid_user(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUser {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SecurityError::invalid_permission("reader", "unknown method 'FETCH'");
        assert_eq!(
            err.to_string(),
            "invalid permission for role 'reader': unknown method 'FETCH'"
        );
    }
}
