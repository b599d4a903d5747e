//! Entity tags.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Name of the document field holding the ETag.
pub const ETAG_FIELD: &str = "_etag";

/// An opaque document version token.
///
/// New tags are time-ordered UUIDs rendered without hyphens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Etag(String);

impl Etag {
    /// Generates a new, unique tag.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().simple().to_string())
    }

    /// Parses an `If-Match` / `If-None-Match` header value.
    ///
    /// Surrounding quotes and a weak `W/` prefix are ignored. Returns `None`
    /// for an empty value.
    #[must_use]
    pub fn from_header(value: &str) -> Option<Self> {
        let value = value.trim();
        let value = value.strip_prefix("W/").unwrap_or(value);
        let value = value.trim_matches('"');
        (!value.is_empty()).then(|| Self(value.to_string()))
    }

    /// Reads the tag stored in a document.
    #[must_use]
    pub fn of_document(document: &Value) -> Option<Self> {
        match document.get(ETAG_FIELD) {
            Some(Value::String(tag)) => Some(Self(tag.clone())),
            _ => None,
        }
    }

    /// Returns the tag as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Etag {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Etag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
