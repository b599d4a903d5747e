//! Server errors.

use docgate_config::ConfigError;
use docgate_pipeline::PipelineError;
use docgate_security::SecurityError;
use docgate_telemetry::TelemetryError;
use thiserror::Error;

/// Result type for server setup and operation.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that stop the gateway from starting or serving.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Logging or metrics could not be initialized.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// The security section cannot be turned into an authenticator or
    /// authorizer.
    #[error("security setup failed: {0}")]
    Security(#[from] SecurityError),

    /// An interceptor rejected its arguments or a pipeline is malformed.
    #[error("pipeline setup failed: {0}")]
    Pipeline(#[from] PipelineError),

    /// The listen address is not a socket address.
    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was tried.
        addr: String,
        /// Underlying cause.
        #[source]
        source: std::io::Error,
    },

    /// Accepting connections failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ServerError::InvalidAddress("nowhere".to_string());
        assert_eq!(err.to_string(), "invalid listen address 'nowhere'");

        let err = ServerError::Bind {
            addr: "127.0.0.1:1".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().starts_with("failed to bind 127.0.0.1:1"));

        let err = ServerError::from(SecurityError::invalid_user("bob", "empty password"));
        assert!(err.to_string().contains("invalid user 'bob'"));
    }
}
