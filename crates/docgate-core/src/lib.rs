//! # Docgate Core
//!
//! Core types shared by every docgate crate.
//!
//! This crate provides the per-request [`Exchange`] that is threaded through
//! the handler pipeline, the typed [`AttachmentKey`] side channel, the fixed
//! set of [`InterceptPoint`]s, and the [`GatewayError`] taxonomy.
//!
//! ## Key Types
//!
//! - [`Exchange`]: Mutable request/response state for one request
//! - [`AttachmentKey`]: Typed key for exchange-scoped side data
//! - [`InterceptPoint`]: Lifecycle phases at which interceptors run
//! - [`GatewayError`]: Standard error type with HTTP status mapping
//! - [`Account`]: The authenticated principal
//! - [`RequestId`]: Unique, time-ordered request identifier
//!
//! ## Example
//!
//! ```
//! use docgate_core::{AttachmentKey, Exchange};
//! use http::Method;
//!
//! const TENANT: AttachmentKey<String> = AttachmentKey::new("tenant");
//!
//! let mut exchange = Exchange::new(Method::GET, "/db/coll", "page=2");
//! exchange.attach(TENANT, "acme".to_string());
//!
//! assert_eq!(exchange.attachment(TENANT).map(String::as_str), Some("acme"));
//! assert_eq!(exchange.query().first("page"), Some("2"));
//! ```

#![doc(html_root_url = "https://docs.rs/docgate-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod attachment;
mod error;
mod exchange;
mod identity;
mod intercept;
mod query;
mod request_id;

use std::future::Future;
use std::pin::Pin;

pub use attachment::{AttachmentKey, Attachments};
pub use error::{ErrorBody, ErrorCategory, GatewayError, GatewayResult};
pub use exchange::Exchange;
pub use identity::Account;
pub use intercept::InterceptPoint;
pub use query::QueryParams;
pub use request_id::RequestId;

/// A boxed, sendable future.
///
/// Handlers, interceptors and store collaborators return this type so they
/// can be used as trait objects.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
