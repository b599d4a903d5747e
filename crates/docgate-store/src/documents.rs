//! The document store collaborator.
//!
//! Handlers and interceptors never talk to a database directly: they go
//! through the [`Documents`] trait, which exposes per-document CRUD with an
//! ETag precondition and a rollback scoped to a prior write.

use crate::error::StoreResult;
use crate::etag::Etag;
use crate::filter::Filter;
use docgate_core::{AttachmentKey, BoxFuture};
use http::StatusCode;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// The result of the last write performed for an exchange.
///
/// Set by the document write handlers, read by response interceptors that
/// validate the materialized write.
pub const DB_OPERATION_RESULT: AttachmentKey<OperationResult> =
    AttachmentKey::new("db-operation-result");

/// Addresses a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    /// Database name.
    pub db: String,
    /// Collection name.
    pub collection: String,
    /// Document id.
    pub id: String,
}

impl DocumentRef {
    /// Creates a document reference.
    pub fn new(db: impl Into<String>, collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}/{}", self.db, self.collection, self.id)
    }
}

/// How a write combines the request content with the stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replaces the whole document, creating it if missing (PUT).
    Replace,
    /// Applies update operators, creating the document if missing (PATCH).
    Update,
    /// Inserts a new document, generating its id when absent (POST).
    Insert,
}

/// A document write.
#[derive(Debug, Clone)]
pub struct WriteRequest {
    /// Database name.
    pub db: String,
    /// Collection name.
    pub collection: String,
    /// Document id; required unless the mode is [`WriteMode::Insert`].
    pub id: Option<String>,
    /// The request content.
    pub content: Map<String, Value>,
    /// Write mode.
    pub mode: WriteMode,
    /// The `If-Match` tag sent by the client.
    pub if_match: Option<Etag>,
    /// Whether the ETag precondition is enforced.
    pub check_etag: bool,
}

impl WriteRequest {
    /// Creates a write without an id or ETag precondition.
    pub fn new(
        db: impl Into<String>,
        collection: impl Into<String>,
        mode: WriteMode,
        content: Map<String, Value>,
    ) -> Self {
        Self {
            db: db.into(),
            collection: collection.into(),
            id: None,
            content,
            mode,
            if_match: None,
            check_etag: false,
        }
    }

    /// Sets the document id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the client's `If-Match` tag.
    pub fn if_match(mut self, etag: Option<Etag>) -> Self {
        self.if_match = etag;
        self
    }

    /// Enables or disables the ETag precondition.
    pub fn check_etag(mut self, check: bool) -> Self {
        self.check_etag = check;
        self
    }
}

/// The outcome of a write or delete.
///
/// Precondition failures and missing documents are reported through
/// `http_code` and `cause`, not as errors.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    /// Status to answer with.
    pub http_code: StatusCode,
    /// The document's new tag, for successful writes.
    pub etag: Option<Etag>,
    /// The document before the operation.
    pub old_data: Option<Value>,
    /// The document after the operation.
    pub new_data: Option<Value>,
    /// Why the operation was not applied.
    pub cause: Option<String>,
    /// The addressed document.
    pub target: DocumentRef,
}

impl OperationResult {
    /// A result for an operation that was not applied.
    pub fn failed(http_code: StatusCode, cause: impl Into<String>, target: DocumentRef) -> Self {
        Self {
            http_code,
            etag: None,
            old_data: None,
            new_data: None,
            cause: Some(cause.into()),
            target,
        }
    }

    /// Returns true if the operation was applied.
    pub fn is_success(&self) -> bool {
        self.http_code.is_success()
    }

    /// Returns true if the operation created the document.
    pub fn is_created(&self) -> bool {
        self.http_code == StatusCode::CREATED
    }
}

/// A sort key; `-field` sorts descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Dot-notation field path.
    pub path: String,
    /// Descending order.
    pub descending: bool,
}

impl SortKey {
    /// Parses `field`, `+field` or `-field`.
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        let (path, descending) = match spec.strip_prefix('-') {
            Some(path) => (path, true),
            None => (spec.strip_prefix('+').unwrap_or(spec), false),
        };
        (!path.is_empty()).then(|| Self {
            path: path.to_string(),
            descending,
        })
    }
}

/// Paging and ordering of a find.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Documents to skip.
    pub skip: usize,
    /// Maximum number of documents returned.
    pub limit: Option<usize>,
    /// Sort keys, most significant first. Documents are ordered by `_id`
    /// when empty.
    pub sort: Vec<SortKey>,
}

/// Document store collaborator.
pub trait Documents: Send + Sync + 'static {
    /// Lists database names.
    fn databases(&self) -> BoxFuture<'_, StoreResult<Vec<String>>>;

    /// Lists the collections of a database.
    fn collections<'a>(&'a self, db: &'a str) -> BoxFuture<'a, StoreResult<Vec<String>>>;

    /// Reads a single document.
    fn get_document<'a>(&'a self, target: &'a DocumentRef) -> BoxFuture<'a, StoreResult<Option<Value>>>;

    /// Finds the documents of a collection matching `filter`.
    fn find<'a>(
        &'a self,
        db: &'a str,
        collection: &'a str,
        filter: &'a Filter,
        options: &'a FindOptions,
    ) -> BoxFuture<'a, StoreResult<Vec<Value>>>;

    /// Finds the first document matching `filter`.
    fn find_one<'a>(
        &'a self,
        db: &'a str,
        collection: &'a str,
        filter: &'a Filter,
    ) -> BoxFuture<'a, StoreResult<Option<Value>>> {
        Box::pin(async move {
            let options = FindOptions {
                limit: Some(1),
                ..FindOptions::default()
            };
            Ok(self.find(db, collection, filter, &options).await?.into_iter().next())
        })
    }

    /// Writes a document, enforcing the ETag precondition when requested.
    fn write_document(&self, request: WriteRequest) -> BoxFuture<'_, StoreResult<OperationResult>>;

    /// Deletes a document, enforcing the ETag precondition when requested.
    fn delete_document<'a>(
        &'a self,
        target: &'a DocumentRef,
        if_match: Option<&'a Etag>,
        check_etag: bool,
    ) -> BoxFuture<'a, StoreResult<OperationResult>>;

    /// Reverts a successful write or delete.
    ///
    /// Returns `false` when there is nothing to revert: the operation failed,
    /// was already reverted, or the document changed since.
    fn rollback<'a>(&'a self, result: &'a OperationResult) -> BoxFuture<'a, StoreResult<bool>>;
}

/// A shared store.
pub type SharedDocuments = Arc<dyn Documents>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_key_parse() {
        assert_eq!(
            SortKey::parse("-age"),
            Some(SortKey { path: "age".into(), descending: true })
        );
        assert_eq!(
            SortKey::parse("+name"),
            Some(SortKey { path: "name".into(), descending: false })
        );
        assert_eq!(SortKey::parse(" - "), None);
    }

    #[test]
    fn test_failed_result() {
        let result = OperationResult::failed(
            StatusCode::CONFLICT,
            "missing tag",
            DocumentRef::new("db", "coll", "d1"),
        );
        assert!(!result.is_success());
        assert!(!result.is_created());
        assert_eq!(result.target.to_string(), "/db/coll/d1");
    }
}
