//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections.

use serde::{Deserialize, Serialize};

/// Server configuration section.
///
/// # Example
///
/// ```
/// use docgate_config::ServerConfig;
///
/// let config = ServerConfig::default();
/// assert_eq!(config.http_addr, "0.0.0.0:8080");
/// assert_eq!(config.max_body_bytes, 10 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// HTTP server bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Timeout for reading a request body, in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Maximum accepted request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Include the cause chain of 5xx errors in response bodies.
    #[serde(default)]
    pub include_error_trace: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            request_timeout_ms: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
            include_error_trace: false,
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    30000
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// How much the request logger records per request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestLogMode {
    /// No request log lines.
    Off,
    /// Method, path, status and duration.
    #[default]
    Basic,
    /// Basic fields plus query string, account and request headers.
    Verbose,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level or `EnvFilter` directive (e.g. "info,docgate_pipeline=debug").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include ANSI color codes in output.
    #[serde(default)]
    pub ansi_enabled: bool,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,

    /// Per-request log line verbosity.
    #[serde(default)]
    pub requests: RequestLogMode,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            ansi_enabled: false,
            include_location: false,
            requests: RequestLogMode::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Enable the Prometheus exporter.
    #[serde(default)]
    pub enabled: bool,

    /// Prometheus metrics endpoint address.
    #[serde(default = "default_metrics_addr")]
    pub addr: String,

    /// Histogram bucket boundaries for request duration.
    #[serde(default = "default_histogram_buckets")]
    pub histogram_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_metrics_addr(),
            histogram_buckets: default_histogram_buckets(),
        }
    }
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_histogram_buckets() -> Vec<f64> {
    vec![
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ]
}

/// When a write must carry a matching `If-Match` header.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EtagPolicy {
    /// Every write to an existing resource requires the ETag.
    Required,
    /// Only deletes require the ETag.
    RequiredForDelete,
    /// The ETag is checked only when the client sends one.
    Optional,
}

/// ETag check policy per resource kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EtagCheckPolicy {
    /// Policy for databases.
    #[serde(default = "default_container_policy")]
    pub db: EtagPolicy,

    /// Policy for collections.
    #[serde(default = "default_container_policy")]
    pub coll: EtagPolicy,

    /// Policy for documents.
    #[serde(default = "default_doc_policy")]
    pub doc: EtagPolicy,
}

impl Default for EtagCheckPolicy {
    fn default() -> Self {
        Self {
            db: default_container_policy(),
            coll: default_container_policy(),
            doc: default_doc_policy(),
        }
    }
}

fn default_container_policy() -> EtagPolicy {
    EtagPolicy::RequiredForDelete
}

fn default_doc_policy() -> EtagPolicy {
    EtagPolicy::Required
}

/// Document API configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MongoConfig {
    /// Enable the document API.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Path prefix of the document API.
    #[serde(default = "default_mongo_mount")]
    pub mount: String,

    /// ETag check policies.
    #[serde(default)]
    pub etag_check_policy: EtagCheckPolicy,

    /// Page size used when the client does not send `pagesize`.
    #[serde(default = "default_pagesize")]
    pub default_pagesize: usize,

    /// Largest `pagesize` a client may request.
    #[serde(default = "default_max_pagesize")]
    pub max_pagesize: usize,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mount: default_mongo_mount(),
            etag_check_policy: EtagCheckPolicy::default(),
            default_pagesize: default_pagesize(),
            max_pagesize: default_max_pagesize(),
        }
    }
}

fn default_mongo_mount() -> String {
    "/".to_string()
}

fn default_pagesize() -> usize {
    100
}

fn default_max_pagesize() -> usize {
    1000
}

/// GraphQL configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GraphqlConfig {
    /// Enable the GraphQL service.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Path prefix of the GraphQL service.
    #[serde(default = "default_graphql_mount")]
    pub mount: String,

    /// Database holding app definitions.
    #[serde(default = "default_app_def_db")]
    pub db: String,

    /// Collection holding app definitions.
    #[serde(default = "default_app_def_collection")]
    pub collection: String,

    /// Limit applied to query mappings that do not declare one.
    #[serde(default = "default_graphql_limit")]
    pub default_limit: u64,

    /// Largest literal limit a query mapping may declare.
    #[serde(default = "default_graphql_max_limit")]
    pub max_limit: u64,

    /// Log query engine statistics.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GraphqlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mount: default_graphql_mount(),
            db: default_app_def_db(),
            collection: default_app_def_collection(),
            default_limit: default_graphql_limit(),
            max_limit: default_graphql_max_limit(),
            verbose: false,
        }
    }
}

fn default_graphql_mount() -> String {
    "/graphql".to_string()
}

fn default_app_def_db() -> String {
    "docgate".to_string()
}

fn default_app_def_collection() -> String {
    "gqlapps".to_string()
}

fn default_graphql_limit() -> u64 {
    100
}

fn default_graphql_max_limit() -> u64 {
    1000
}

/// Ping service configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PingConfig {
    /// Enable the ping service.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Path of the ping service.
    #[serde(default = "default_ping_mount")]
    pub mount: String,

    /// Message returned by the ping service.
    #[serde(default = "default_ping_message")]
    pub message: String,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mount: default_ping_mount(),
            message: default_ping_message(),
        }
    }
}

fn default_ping_mount() -> String {
    "/ping".to_string()
}

fn default_ping_message() -> String {
    "Greetings from docgate!".to_string()
}

/// A user known to the basic authenticator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct UserConfig {
    /// User name.
    pub name: String,

    /// Password, compared in constant time.
    pub password: String,

    /// Roles granted to the user.
    #[serde(default)]
    pub roles: Vec<String>,
}

/// A permission granted to a role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PermissionConfig {
    /// Role the permission applies to. `$unauthenticated` matches anonymous
    /// requests.
    pub role: String,

    /// Allowed HTTP methods. `*` allows every method.
    #[serde(default = "default_all_methods")]
    pub methods: Vec<String>,

    /// Path prefix the permission covers.
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
}

fn default_all_methods() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_path_prefix() -> String {
    "/".to_string()
}

/// Security configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    /// Enable authentication and authorization.
    #[serde(default)]
    pub enabled: bool,

    /// Realm announced in `WWW-Authenticate`.
    #[serde(default = "default_realm")]
    pub realm: String,

    /// Known users.
    #[serde(default)]
    pub users: Vec<UserConfig>,

    /// Role permissions.
    #[serde(default)]
    pub permissions: Vec<PermissionConfig>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            realm: default_realm(),
            users: Vec::new(),
            permissions: Vec::new(),
        }
    }
}

fn default_realm() -> String {
    "docgate".to_string()
}

fn default_true() -> bool {
    true
}
