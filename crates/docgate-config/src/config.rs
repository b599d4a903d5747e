//! Main configuration type.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;

use crate::{
    ConfigError, GraphqlConfig, LoggingConfig, MetricsConfig, MongoConfig, PingConfig,
    SecurityConfig, ServerConfig,
};

const KNOWN_METHODS: [&str; 8] = [
    "GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS", "HEAD", "*",
];

/// Complete gateway configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use docgate_config::GatewayConfig;
///
/// let config = GatewayConfig::default();
/// assert_eq!(config.graphql.mount, "/graphql");
/// assert!(config.plugins_args.is_empty());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Document API configuration.
    #[serde(default)]
    pub mongo: MongoConfig,

    /// GraphQL configuration.
    #[serde(default)]
    pub graphql: GraphqlConfig,

    /// Ping service configuration.
    #[serde(default)]
    pub ping: PingConfig,

    /// Security configuration.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Free-form per-plugin arguments, keyed by plugin name.
    #[serde(default, rename = "plugins-args")]
    pub plugins_args: BTreeMap<String, Value>,
}

impl GatewayConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - A bind address is not a socket address
    /// - A mount path does not start with `/`
    /// - Two enabled services share a mount path
    /// - The GraphQL default limit exceeds its maximum
    /// - A user name is declared twice
    /// - A permission names an unknown HTTP method
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.http_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }

        if self.metrics.enabled && self.metrics.addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "metrics.addr",
                format!("invalid socket address: {}", self.metrics.addr),
            ));
        }

        let mut mounts = HashSet::new();
        for (field, enabled, mount) in [
            ("mongo.mount", self.mongo.enabled, &self.mongo.mount),
            ("graphql.mount", self.graphql.enabled, &self.graphql.mount),
            ("ping.mount", self.ping.enabled, &self.ping.mount),
        ] {
            if !mount.starts_with('/') {
                return Err(ConfigError::invalid_value(field, "must start with '/'"));
            }
            if enabled && !mounts.insert(mount.trim_end_matches('/').to_string()) {
                return Err(ConfigError::invalid_value(
                    field,
                    format!("mount path {mount} is already used"),
                ));
            }
        }

        if self.mongo.default_pagesize > self.mongo.max_pagesize {
            return Err(ConfigError::invalid_value(
                "mongo.default_pagesize",
                "cannot be greater than mongo.max_pagesize",
            ));
        }

        if self.graphql.default_limit > self.graphql.max_limit {
            return Err(ConfigError::invalid_value(
                "graphql.default_limit",
                "cannot be greater than graphql.max_limit",
            ));
        }

        let mut names = HashSet::new();
        for user in &self.security.users {
            if !names.insert(user.name.as_str()) {
                return Err(ConfigError::validation_error(format!(
                    "user {} is declared more than once",
                    user.name
                )));
            }
        }

        for permission in &self.security.permissions {
            if let Some(method) = permission
                .methods
                .iter()
                .find(|m| !KNOWN_METHODS.contains(&m.to_uppercase().as_str()))
            {
                return Err(ConfigError::invalid_value(
                    "security.permissions.methods",
                    format!("unknown method {method} for role {}", permission.role),
                ));
            }
        }

        Ok(())
    }

    /// Returns the configuration as a JSON tree.
    ///
    /// Interceptors declared with global configuration scope receive this tree.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
