//! Authorizers.
//!
//! The bundled [`AclAuthorizer`] grants requests by role. Each permission
//! allows a set of methods under a path prefix; anonymous requests are
//! checked against the [`UNAUTHENTICATED_ROLE`] permissions.
//!
//! # Example
//!
//! ```
//! use docgate_security::{AclAuthorizer, Authorizer};
//! use docgate_core::{Account, Exchange};
//! use http::Method;
//!
//! let acl = AclAuthorizer::builder()
//!     .allow_role("admin", ["*"], "/")
//!     .allow_role("reader", ["GET"], "/db")
//!     .build()
//!     .unwrap();
//!
//! let mut exchange = Exchange::new(Method::GET, "/db/coll", "");
//! exchange.set_account(Some(Account::new("ann", ["reader"])));
//! assert!(acl.is_allowed(&exchange));
//! ```

use crate::error::{SecurityError, SecurityResult};
use docgate_config::SecurityConfig;
use docgate_core::Exchange;
use http::Method;
use std::collections::HashMap;

/// Role matched by requests without an account.
pub const UNAUTHENTICATED_ROLE: &str = "$unauthenticated";

/// Decides whether an exchange may proceed.
pub trait Authorizer: Send + Sync + 'static {
    /// Returns the authorizer name.
    fn name(&self) -> &str;

    /// Returns true if the exchange is allowed.
    fn is_allowed(&self, exchange: &Exchange) -> bool;
}

#[derive(Debug, Clone)]
enum Methods {
    Any,
    Only(Vec<Method>),
}

#[derive(Debug, Clone)]
struct Permission {
    methods: Methods,
    path_prefix: String,
}

impl Permission {
    fn permits(&self, method: &Method, path: &str) -> bool {
        let method_ok = match &self.methods {
            Methods::Any => true,
            Methods::Only(methods) => methods.contains(method),
        };
        method_ok && under_prefix(path, &self.path_prefix)
    }
}

/// Returns true if `path` is `prefix` or lies below it.
fn under_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Role-based access control list.
#[derive(Debug, Clone, Default)]
pub struct AclAuthorizer {
    permissions: HashMap<String, Vec<Permission>>,
}

impl AclAuthorizer {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> AclBuilder {
        AclBuilder::default()
    }

    /// Builds the ACL from the security configuration.
    pub fn from_config(config: &SecurityConfig) -> SecurityResult<Self> {
        config
            .permissions
            .iter()
            .fold(Self::builder(), |builder, permission| {
                builder.allow_role(
                    &permission.role,
                    permission.methods.iter().map(String::as_str),
                    &permission.path_prefix,
                )
            })
            .build()
    }

    fn role_permits(&self, role: &str, method: &Method, path: &str) -> bool {
        self.permissions
            .get(role)
            .is_some_and(|permissions| permissions.iter().any(|p| p.permits(method, path)))
    }
}

impl Authorizer for AclAuthorizer {
    fn name(&self) -> &str {
        "aclAuthorizer"
    }

    fn is_allowed(&self, exchange: &Exchange) -> bool {
        let method = exchange.method();
        let path = exchange.path();
        match exchange.account() {
            Some(account) => account
                .roles()
                .iter()
                .any(|role| self.role_permits(role, method, path)),
            None => self.role_permits(UNAUTHENTICATED_ROLE, method, path),
        }
    }
}

/// Builder for [`AclAuthorizer`].
#[derive(Debug, Default)]
pub struct AclBuilder {
    entries: Vec<(String, Vec<String>, String)>,
}

impl AclBuilder {
    /// Allows a role to use `methods` under `path_prefix`.
    ///
    /// Use `["*"]` to allow every method.
    #[must_use]
    pub fn allow_role<S, I>(mut self, role: S, methods: I, path_prefix: &str) -> Self
    where
        S: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.entries.push((
            role.into(),
            methods.into_iter().map(Into::into).collect(),
            path_prefix.to_string(),
        ));
        self
    }

    /// Allows anonymous requests to use `methods` under `path_prefix`.
    #[must_use]
    pub fn allow_anonymous<I>(self, methods: I, path_prefix: &str) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.allow_role(UNAUTHENTICATED_ROLE, methods, path_prefix)
    }

    /// Builds the authorizer.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown method or a relative path prefix.
    pub fn build(self) -> SecurityResult<AclAuthorizer> {
        let mut permissions: HashMap<String, Vec<Permission>> = HashMap::new();
        for (role, methods, path_prefix) in self.entries {
            if !path_prefix.starts_with('/') {
                return Err(SecurityError::invalid_permission(
                    &role,
                    format!("path prefix '{path_prefix}' must start with '/'"),
                ));
            }
            let methods = if methods.iter().any(|m| m == "*") {
                Methods::Any
            } else {
                let parsed = methods
                    .iter()
                    .map(|m| {
                        m.to_ascii_uppercase()
                            .parse::<Method>()
                            .map_err(|_| SecurityError::invalid_permission(&role, format!("unknown method '{m}'")))
                    })
                    .collect::<SecurityResult<Vec<_>>>()?;
                Methods::Only(parsed)
            };
            permissions.entry(role).or_default().push(Permission {
                methods,
                path_prefix,
            });
        }
        Ok(AclAuthorizer { permissions })
    }
}
