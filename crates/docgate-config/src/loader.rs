//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, and environment variables.

use std::env;
use std::fs;
use std::path::Path;

use crate::{ConfigError, EtagPolicy, GatewayConfig, LogFormat, RequestLogMode};

/// Configuration loader with layered approach.
///
/// The loader applies configuration in layers, with later layers overriding
/// earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables
///
/// # Example
///
/// ```no_run
/// use docgate_config::ConfigLoader;
///
/// # fn main() -> Result<(), docgate_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_file("docgate.toml")?
///     .with_env_prefix("DOCGATE")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: GatewayConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
            env_prefix: None,
        }
    }

    /// Start with default configuration values.
    ///
    /// This is called automatically by `new()`, but can be chained for clarity.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = GatewayConfig::default();
        self
    }

    /// Load configuration from a file.
    ///
    /// Supports TOML (.toml) and JSON (.json) formats, chosen by extension.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The file contains invalid TOML/JSON
    /// - The file contains unknown fields
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        Ok(self)
    }

    /// Load configuration from an optional file.
    ///
    /// If the file exists, loads it. If not, silently continues.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the given format ("toml" or "json").
    ///
    /// # Example
    ///
    /// ```
    /// use docgate_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [server]
    ///     http_addr = "127.0.0.1:3000"
    ///
    ///     [plugins-args.requestsMetrics]
    ///     enabled = false
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.server.http_addr, "127.0.0.1:3000");
    /// assert_eq!(config.plugins_args["requestsMetrics"]["enabled"], false);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "unsupported configuration format: {format}"
                )))
            }
        };
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Environment variables use the format `PREFIX__SECTION__KEY`, e.g.
    /// `DOCGATE__SERVER__HTTP_ADDR=0.0.0.0:9000`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file into the process environment, if present.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "failed to load .env file");
            }
        }
        self
    }

    /// Finalize and return the loaded configuration.
    ///
    /// Applies environment variable overrides (if a prefix was set) and
    /// validates the final configuration.
    pub fn load(mut self) -> Result<GatewayConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Finalize without validation.
    #[must_use]
    pub fn load_unvalidated(self) -> GatewayConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<GatewayConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::validation_error(format!(
                "unsupported configuration file format: {}",
                path.display()
            ))),
        }
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let mut vars: Vec<(String, String)> = env::vars()
            .filter(|(k, _)| k.starts_with(prefix))
            .collect();
        vars.sort();

        for (key, value) in vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(key_without_prefix) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__"))
        else {
            return Ok(());
        };

        let parts: Vec<&str> = key_without_prefix.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            ["SERVER", "HTTP_ADDR"] => config.server.http_addr = value.to_string(),
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                config.server.shutdown_timeout_secs = parse_number(key, value)?;
            }
            ["SERVER", "REQUEST_TIMEOUT_MS"] => {
                config.server.request_timeout_ms = parse_number(key, value)?;
            }
            ["SERVER", "MAX_BODY_BYTES"] => {
                config.server.max_body_bytes = parse_number(key, value)?;
            }
            ["SERVER", "INCLUDE_ERROR_TRACE"] => {
                config.server.include_error_trace = parse_flag(key, value)?;
            }

            ["LOGGING", "ENABLED"] => config.logging.enabled = parse_flag(key, value)?,
            ["LOGGING", "LEVEL"] => config.logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                config.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => return Err(ConfigError::env_parse_error(key, "expected 'json' or 'pretty'")),
                };
            }
            ["LOGGING", "ANSI_ENABLED"] => config.logging.ansi_enabled = parse_flag(key, value)?,
            ["LOGGING", "REQUESTS"] => {
                config.logging.requests = match value.to_lowercase().as_str() {
                    "off" => RequestLogMode::Off,
                    "basic" => RequestLogMode::Basic,
                    "verbose" => RequestLogMode::Verbose,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'off', 'basic' or 'verbose'",
                        ))
                    }
                };
            }

            ["METRICS", "ENABLED"] => config.metrics.enabled = parse_flag(key, value)?,
            ["METRICS", "ADDR"] => config.metrics.addr = value.to_string(),

            ["MONGO", "ENABLED"] => config.mongo.enabled = parse_flag(key, value)?,
            ["MONGO", "MOUNT"] => config.mongo.mount = value.to_string(),
            ["MONGO", "ETAG_CHECK_POLICY", kind] => {
                let policy = parse_policy(key, value)?;
                match *kind {
                    "DB" => config.mongo.etag_check_policy.db = policy,
                    "COLL" => config.mongo.etag_check_policy.coll = policy,
                    "DOC" => config.mongo.etag_check_policy.doc = policy,
                    _ => return Err(ConfigError::env_parse_error(key, "expected DB, COLL or DOC")),
                }
            }

            ["GRAPHQL", "ENABLED"] => config.graphql.enabled = parse_flag(key, value)?,
            ["GRAPHQL", "MOUNT"] => config.graphql.mount = value.to_string(),
            ["GRAPHQL", "DB"] => config.graphql.db = value.to_string(),
            ["GRAPHQL", "COLLECTION"] => config.graphql.collection = value.to_string(),
            ["GRAPHQL", "DEFAULT_LIMIT"] => config.graphql.default_limit = parse_number(key, value)?,
            ["GRAPHQL", "MAX_LIMIT"] => config.graphql.max_limit = parse_number(key, value)?,

            ["PING", "ENABLED"] => config.ping.enabled = parse_flag(key, value)?,
            ["PING", "MESSAGE"] => config.ping.message = value.to_string(),

            ["SECURITY", "ENABLED"] => config.security.enabled = parse_flag(key, value)?,
            ["SECURITY", "REALM"] => config.security.realm = value.to_string(),

            _ => tracing::debug!(var = key, "ignoring unknown configuration variable"),
        }

        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

fn parse_policy(key: &str, value: &str) -> Result<EtagPolicy, ConfigError> {
    match value.to_uppercase().as_str() {
        "REQUIRED" => Ok(EtagPolicy::Required),
        "REQUIRED_FOR_DELETE" => Ok(EtagPolicy::RequiredForDelete),
        "OPTIONAL" => Ok(EtagPolicy::Optional),
        _ => Err(ConfigError::env_parse_error(
            key,
            "expected REQUIRED, REQUIRED_FOR_DELETE or OPTIONAL",
        )),
    }
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config.server.http_addr, "0.0.0.0:8080");
        assert_eq!(config.mongo.etag_check_policy.doc, EtagPolicy::Required);
    }

    #[test]
    fn test_loader_with_string_toml() {
        let toml = r#"
            [mongo.etag_check_policy]
            doc = "OPTIONAL"

            [graphql]
            db = "apps"

            [[security.users]]
            name = "admin"
            password = "secret"
            roles = ["admin"]
        "#;

        let config = ConfigLoader::new()
            .with_string(toml, "toml")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.mongo.etag_check_policy.doc, EtagPolicy::Optional);
        assert_eq!(config.mongo.etag_check_policy.coll, EtagPolicy::RequiredForDelete);
        assert_eq!(config.graphql.db, "apps");
        assert_eq!(config.graphql.collection, "gqlapps");
        assert_eq!(config.security.users[0].roles, vec!["admin".to_string()]);
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"ping": {"message": "pong"}, "plugins-args": {"x": {"a": 1}}}"#;

        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.ping.message, "pong");
        assert_eq!(config.plugins_args["x"]["a"], 1);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let result = ConfigLoader::new().with_string("[server]\nport = 1\n", "toml");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_unsupported_format() {
        assert!(ConfigLoader::new().with_string("", "yaml").is_err());
    }

    #[test]
    fn test_loader_with_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[server]\nhttp_addr = \"127.0.0.1:4000\"").unwrap();

        let config = ConfigLoader::new()
            .with_file(file.path())
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.server.http_addr, "127.0.0.1:4000");
    }

    #[test]
    fn test_loader_with_file_wrong_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(ConfigLoader::new().with_file(file.path()).is_err());
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/docgate.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/docgate.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.server.http_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_load_validates() {
        let result = ConfigLoader::new()
            .with_string("[server]\nhttp_addr = \"nope\"\n", "toml")
            .unwrap()
            .load();
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    // Environment overrides are exercised through apply_env_var directly,
    // since mutating the process environment requires unsafe code.

    #[test]
    fn test_apply_env_var_server_addr() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__SERVER__HTTP_ADDR", "192.168.1.1:9000", "TEST")
            .unwrap();
        assert_eq!(loader.config.server.http_addr, "192.168.1.1:9000");
    }

    #[test]
    fn test_apply_env_var_etag_policy() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__MONGO__ETAG_CHECK_POLICY__DOC", "optional", "TEST")
            .unwrap();
        assert_eq!(loader.config.mongo.etag_check_policy.doc, EtagPolicy::Optional);

        let err = loader
            .apply_env_var("TEST__MONGO__ETAG_CHECK_POLICY__DOC", "sometimes", "TEST")
            .unwrap_err();
        assert!(err.to_string().contains("TEST__MONGO__ETAG_CHECK_POLICY__DOC"));
    }

    #[test]
    fn test_apply_env_var_type_errors() {
        let mut loader = ConfigLoader::new();
        assert!(loader
            .apply_env_var("TEST__SERVER__SHUTDOWN_TIMEOUT_SECS", "soon", "TEST")
            .is_err());
        assert!(loader
            .apply_env_var("TEST__SECURITY__ENABLED", "maybe", "TEST")
            .is_err());
        assert!(loader
            .apply_env_var("TEST__LOGGING__REQUESTS", "loud", "TEST")
            .is_err());
    }

    #[test]
    fn test_apply_env_var_unknown_is_ignored() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__NOPE__KEY", "value", "TEST")
            .unwrap();
        loader.apply_env_var("TESTING", "value", "TEST").unwrap();
    }
}
