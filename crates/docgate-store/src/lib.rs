//! # Docgate Store
//!
//! The document store collaborator used by the REST handlers and the
//! write-validating interceptors.
//!
//! ## Key Types
//!
//! - [`Documents`]: CRUD with an ETag precondition, find, and rollback
//! - [`OperationResult`]: status, ETag and before/after images of a write
//! - [`Filter`]: parsed query filter
//! - [`InMemoryDocuments`]: the bundled implementation
//!
//! ## Example
//!
//! ```
//! use docgate_store::{Documents, InMemoryDocuments, WriteMode, WriteRequest};
//! use serde_json::{json, Map};
//!
//! # tokio_test::block_on(async {
//! let store = InMemoryDocuments::new();
//! let content: Map<_, _> = json!({"name": "Ada"}).as_object().cloned().unwrap();
//!
//! let result = store
//!     .write_document(WriteRequest::new("db", "people", WriteMode::Replace, content).id("ada"))
//!     .await
//!     .unwrap();
//! assert!(result.is_created());
//! assert!(store.rollback(&result).await.unwrap());
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/docgate-store/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod documents;
pub mod error;
pub mod etag;
pub mod filter;
pub mod keys;
pub mod memory;
pub mod update;

pub use documents::{
    DocumentRef, Documents, FindOptions, OperationResult, SharedDocuments, SortKey, WriteMode,
    WriteRequest, DB_OPERATION_RESULT,
};
pub use error::{StoreError, StoreResult};
pub use etag::{Etag, ETAG_FIELD};
pub use filter::Filter;
pub use keys::{escape_keys, needs_escaping, unescape_keys};
pub use memory::InMemoryDocuments;
