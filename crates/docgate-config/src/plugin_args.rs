//! Per-plugin configuration views.
//!
//! Interceptors and services read their arguments from the
//! `plugins-args.<name>` sub-tree at one-time initialization. A missing
//! sub-tree or key is not an error: readers fall back to their documented
//! defaults.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ConfigError, GatewayConfig};

/// Which part of the configuration a plugin receives at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigScope {
    /// Only the plugin's own `plugins-args.<name>` sub-tree.
    #[default]
    Plugin,
    /// The plugin's sub-tree plus the whole configuration.
    Global,
}

/// Arguments handed to a plugin at initialization.
///
/// # Example
///
/// ```
/// use docgate_config::{GatewayConfig, PluginArgs};
/// use serde_json::json;
///
/// let mut config = GatewayConfig::default();
/// config
///     .plugins_args
///     .insert("greeter".into(), json!({"message": "hi", "enabled": true}));
///
/// let args = PluginArgs::scoped(&config, "greeter");
/// assert_eq!(args.enabled(), Some(true));
/// assert_eq!(args.get_or("message", "hello".to_string()), "hi");
/// assert_eq!(args.get_or("retries", 3u32), 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PluginArgs {
    name: String,
    args: Map<String, Value>,
    global: Option<Value>,
}

impl PluginArgs {
    /// Creates a view of the plugin's own sub-tree.
    #[must_use]
    pub fn scoped(config: &GatewayConfig, name: &str) -> Self {
        let args = match config.plugins_args.get(name) {
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                tracing::warn!(
                    plugin = name,
                    value = %other,
                    "plugin arguments must be an object; using defaults"
                );
                Map::new()
            }
            None => Map::new(),
        };

        Self {
            name: name.to_string(),
            args,
            global: None,
        }
    }

    /// Creates a view with the given configuration scope.
    #[must_use]
    pub fn for_scope(config: &GatewayConfig, name: &str, scope: ConfigScope) -> Self {
        let mut args = Self::scoped(config, name);
        if scope == ConfigScope::Global {
            args.global = Some(config.to_json());
        }
        args
    }

    /// Creates arguments from a bare JSON object, without configuration.
    #[must_use]
    pub fn from_map(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            args,
            global: None,
        }
    }

    /// Returns the plugin name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the raw argument map.
    #[must_use]
    pub fn args(&self) -> &Map<String, Value> {
        &self.args
    }

    /// Returns the whole configuration for globally scoped plugins.
    #[must_use]
    pub fn global(&self) -> Option<&Value> {
        self.global.as_ref()
    }

    /// Returns the explicit `enabled` flag, if configured.
    ///
    /// A non-boolean value is ignored with a warning.
    #[must_use]
    pub fn enabled(&self) -> Option<bool> {
        match self.args.get("enabled") {
            Some(Value::Bool(enabled)) => Some(*enabled),
            Some(other) => {
                tracing::warn!(plugin = %self.name, value = %other, "ignoring non-boolean 'enabled'");
                None
            }
            None => None,
        }
    }

    /// Reads a typed argument.
    ///
    /// Returns `Ok(None)` if the key is absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.args
            .get(key)
            .map(|value| {
                serde_json::from_value(value.clone())
                    .map_err(|e| ConfigError::plugin_arg(&self.name, key, e.to_string()))
            })
            .transpose()
    }

    /// Reads a typed argument, falling back to `default` when it is absent
    /// or has the wrong type.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.get(key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                tracing::warn!(error = %e, "using default plugin argument");
                default
            }
        }
    }
}
