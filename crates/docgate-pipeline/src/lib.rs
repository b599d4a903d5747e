//! # Docgate Pipeline
//!
//! The request pipeline and interceptor dispatch engine.
//!
//! A pipeline is an immutable chain of [`Handler`]s built at bootstrap with
//! [`pipe`] and shared by all requests. An [`Exchange`](docgate_core::Exchange)
//! flows through it by mutable reference. Interceptors are not chained: they
//! are registered once in the [`InterceptorRegistry`] and dispatched by the
//! phase executors placed in the chain.
//!
//! ## Document pipeline
//!
//! ```text
//! RequestInterceptors(REQUEST_BEFORE_AUTH) → QueryStringRebuilder
//!   → authentication → authorization
//!   → RequestInterceptors(REQUEST_AFTER_AUTH) → QueryStringRebuilder
//!   → service (WrappingHandler or document handlers)
//!   → ResponseInterceptors(RESPONSE, RESPONSE_ASYNC) → ResponseSender
//! ```
//!
//! ## Key Types
//!
//! - [`Handler`] / [`Link`]: a node of the chain and its next reference
//! - [`WrappingHandler`]: places a bare handler or a typed [`Service`] in a chain
//! - [`Interceptor`]: phase-tagged, predicate-gated behavior
//! - [`InterceptorRegistry`]: frozen, ordered interceptors per point
//! - [`RequestInterceptorsExecutor`] / [`ResponseInterceptorsExecutor`]
//! - [`ResponseSender`]: terminal handler

#![doc(html_root_url = "https://docs.rs/docgate-pipeline/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod executor;
pub mod handler;
pub mod interceptor;
pub mod query_string;
pub mod registry;
pub mod sender;
pub mod service;
pub mod wrapping;

pub use error::PipelineError;
pub use executor::{run_request_phase, RequestInterceptorsExecutor, ResponseInterceptorsExecutor};
pub use handler::{chain_names, pipe, FnHandler, Handler, Link, PipelineBuilder, SharedHandler};
pub use interceptor::{FnInterceptor, Interceptor, InterceptorDescriptor};
pub use query_string::{original_query_string, QueryStringRebuilder, ORIGINAL_QUERY_STRING};
pub use registry::{InterceptorRegistry, InterceptorRegistryBuilder, RegisteredInterceptor, SharedRegistry};
pub use sender::{finalize_response, ResponseSender};
pub use service::{
    dont_intercept, relative_path, GraphQlRequest, JsonRequest, RequestKind, Service, ServiceInitializer,
    ServiceRequest, ServiceResponse, DONT_INTERCEPT, MOUNT_PATH,
};
pub use wrapping::WrappingHandler;
