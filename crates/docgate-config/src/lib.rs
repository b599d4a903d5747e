//! Typed configuration for docgate.
//!
//! This crate provides a strongly-typed configuration system with support for:
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - Strict validation (fails on unknown fields outside `plugins-args`)
//! - Layered configuration (defaults → file → env)
//! - Scoped per-plugin argument views ([`PluginArgs`])
//!
//! # Example
//!
//! ```no_run
//! use docgate_config::ConfigLoader;
//!
//! # fn main() -> Result<(), docgate_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_file("docgate.toml")?
//!     .with_env_prefix("DOCGATE")
//!     .load()?;
//!
//! println!("Gateway will listen on: {}", config.server.http_addr);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//!
//! [logging]
//! level = "info"
//! format = "json"
//! requests = "basic"
//!
//! [mongo.etag_check_policy]
//! db = "REQUIRED_FOR_DELETE"
//! coll = "REQUIRED_FOR_DELETE"
//! doc = "REQUIRED"
//!
//! [graphql]
//! mount = "/graphql"
//! db = "docgate"
//! collection = "gqlapps"
//!
//! [security]
//! enabled = true
//!
//! [[security.users]]
//! name = "admin"
//! password = "changeit"
//! roles = ["admin"]
//!
//! [[security.permissions]]
//! role = "admin"
//! methods = ["*"]
//! path_prefix = "/"
//!
//! [plugins-args.failedAuthLogger]
//! enabled = true
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden via environment variables using the format
//! `PREFIX__SECTION__KEY`, for example:
//!
//! - `DOCGATE__SERVER__HTTP_ADDR=0.0.0.0:9000`
//! - `DOCGATE__MONGO__ETAG_CHECK_POLICY__DOC=OPTIONAL`
//! - `DOCGATE__SECURITY__ENABLED=false`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod plugin_args;
mod schema;

pub use config::GatewayConfig;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use plugin_args::{ConfigScope, PluginArgs};
pub use schema::*;
