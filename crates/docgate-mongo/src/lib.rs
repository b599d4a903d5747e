//! # Docgate Mongo
//!
//! The REST document API: handlers that resolve `/{db}/{coll}/{id}` paths,
//! check write content, decide the ETag policy, and execute requests
//! against the [`Documents`](docgate_store::Documents) store.
//!
//! ## Document pipeline
//!
//! ```text
//! ResourceResolver → … authentication / authorization …
//!   → ContentChecker → EtagPolicyInjector
//!   → RequestInterceptors(REQUEST_AFTER_AUTH) → DocumentDispatcher
//!   → ResponseInterceptors → ResponseSender
//! ```
//!
//! Collections with a `jsonSchema` property additionally get their writes
//! validated by the interceptors of [`json_schema`].
//!
//! All handlers skip their work when the exchange is already in error and
//! report client errors in band.

#![doc(html_root_url = "https://docs.rs/docgate-mongo/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod content;
pub mod etag_policy;
pub mod handlers;
pub mod json_schema;
pub mod resource;

pub use content::ContentChecker;
pub use etag_policy::{if_match, requires_check, EtagPolicyInjector, CHECK_ETAG_PARAM, ETAG_CHECK};
pub use handlers::DocumentDispatcher;
pub use json_schema::{
    CollectionPropsInjector, JsonSchemaAfterWrite, JsonSchemaBeforeWrite, COLLECTION_PROPS,
    PROPERTIES_COLLECTION, SCHEMAS_COLLECTION,
};
pub use resource::{InvalidResource, ResourceRef, ResourceResolver, RESOURCE};
