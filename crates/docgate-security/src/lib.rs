//! # Docgate Security
//!
//! Authentication and authorization for the docgate gateway.
//!
//! - [`Authenticator`] / [`BasicAuthenticator`]: verify request credentials
//! - [`Authorizer`] / [`AclAuthorizer`]: role-based access control
//! - [`AuthenticationHandler`] / [`AuthorizationHandler`]: the pipeline units
//! - [`FailedAuthLogger`]: `REQUEST_AFTER_FAILED_AUTH` interceptor
//!
//! Rejections are in band: the exchange is marked in error with 401 or 403
//! and continues to the response phase.

#![doc(html_root_url = "https://docs.rs/docgate-security/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod authenticator;
pub mod authorizer;
pub mod error;
pub mod failed_auth;
pub mod handlers;

pub use authenticator::{AuthOutcome, Authenticator, BasicAuthenticator, BasicCredentials};
pub use authorizer::{AclAuthorizer, AclBuilder, Authorizer, UNAUTHENTICATED_ROLE};
pub use error::{SecurityError, SecurityResult};
pub use failed_auth::FailedAuthLogger;
pub use handlers::{AuthFailure, AuthenticationHandler, AuthorizationHandler, AUTH_FAILURE};
