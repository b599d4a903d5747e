//! Authenticators.
//!
//! An [`Authenticator`] inspects the request credentials and reports one of
//! three outcomes: the request carries valid credentials, it carries none,
//! or the credentials it carries are wrong. Only the last one is a failure;
//! a request without credentials proceeds as anonymous and is left to the
//! authorizer.

use crate::error::{SecurityError, SecurityResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use docgate_config::{SecurityConfig, UserConfig};
use docgate_core::{Account, BoxFuture, Exchange};
use http::header::AUTHORIZATION;
use std::collections::HashMap;
use subtle::ConstantTimeEq;

/// Result of an authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The credentials are valid.
    Authenticated(Account),
    /// The request carries no credentials this authenticator understands.
    NotAttempted,
    /// The credentials are wrong.
    Failed {
        /// The user name presented, when known.
        username: Option<String>,
        /// Why authentication failed.
        reason: String,
    },
}

/// Verifies request credentials.
pub trait Authenticator: Send + Sync + 'static {
    /// Returns the authenticator name.
    fn name(&self) -> &str;

    /// Authenticates the exchange.
    fn authenticate<'a>(&'a self, exchange: &'a Exchange) -> BoxFuture<'a, AuthOutcome>;

    /// Returns the `WWW-Authenticate` challenge sent with 401 responses.
    fn challenge(&self) -> Option<String> {
        None
    }
}

/// Credentials carried by an `Authorization: Basic` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl BasicCredentials {
    /// Parses an `Authorization` header value.
    ///
    /// Returns `None` if the header does not use the Basic scheme or is not
    /// valid base64-encoded `user:password`.
    pub fn parse(header: &str) -> Option<Self> {
        let (scheme, encoded) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

struct Identity {
    password: Vec<u8>,
    account: Account,
}

/// Authenticates `Authorization: Basic` credentials against a fixed set of
/// users.
pub struct BasicAuthenticator {
    realm: String,
    users: HashMap<String, Identity>,
}

impl BasicAuthenticator {
    /// Creates an authenticator for the given realm and users.
    pub fn new(realm: impl Into<String>, users: &[UserConfig]) -> SecurityResult<Self> {
        let mut identities = HashMap::with_capacity(users.len());
        for user in users {
            if user.name.is_empty() || user.name.contains(':') {
                return Err(SecurityError::invalid_user(
                    &user.name,
                    "user names must be non-empty and cannot contain ':'",
                ));
            }
            let identity = Identity {
                password: user.password.as_bytes().to_vec(),
                account: Account::new(&user.name, user.roles.iter().cloned()),
            };
            if identities.insert(user.name.clone(), identity).is_some() {
                return Err(SecurityError::invalid_user(&user.name, "user is defined more than once"));
            }
        }

        Ok(Self {
            realm: realm.into(),
            users: identities,
        })
    }

    /// Creates an authenticator from the security configuration.
    pub fn from_config(config: &SecurityConfig) -> SecurityResult<Self> {
        Self::new(&config.realm, &config.users)
    }

    fn verify(&self, credentials: &BasicCredentials) -> AuthOutcome {
        let verified = self.users.get(&credentials.username).and_then(|identity| {
            let matches: bool = identity.password.ct_eq(credentials.password.as_bytes()).into();
            matches.then(|| identity.account.clone())
        });

        match verified {
            Some(account) => AuthOutcome::Authenticated(account),
            None => AuthOutcome::Failed {
                username: Some(credentials.username.clone()),
                reason: "wrong credentials".to_string(),
            },
        }
    }
}

impl std::fmt::Debug for BasicAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuthenticator")
            .field("realm", &self.realm)
            .field("users", &self.users.len())
            .finish()
    }
}

impl Authenticator for BasicAuthenticator {
    fn name(&self) -> &str {
        "basicAuthenticator"
    }

    fn authenticate<'a>(&'a self, exchange: &'a Exchange) -> BoxFuture<'a, AuthOutcome> {
        Box::pin(async move {
            let Some(header) = exchange.header(AUTHORIZATION.as_str()) else {
                return AuthOutcome::NotAttempted;
            };
            match BasicCredentials::parse(header) {
                Some(credentials) => self.verify(&credentials),
                None if header.trim_start().to_ascii_lowercase().starts_with("basic") => {
                    AuthOutcome::Failed {
                        username: None,
                        reason: "malformed basic credentials".to_string(),
                    }
                }
                None => AuthOutcome::NotAttempted,
            }
        })
    }

    fn challenge(&self) -> Option<String> {
        Some(format!("Basic realm=\"{}\"", self.realm))
    }
}
