//! Resource resolution.
//!
//! Maps the request path, relative to the mount, onto the addressed
//! resource: the root, a database, a collection, or a document.

use crate::json_schema::SCHEMAS_COLLECTION;
use docgate_core::{AttachmentKey, BoxFuture, Exchange, GatewayResult};
use docgate_pipeline::{relative_path, Handler, Link};
use docgate_store::DocumentRef;
use http::StatusCode;
use std::fmt;

/// The resource addressed by the exchange.
pub const RESOURCE: AttachmentKey<ResourceRef> = AttachmentKey::new("resource");

/// A resource of the document API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRef {
    /// `/`
    Root,
    /// `/{db}`
    Database {
        /// Database name.
        db: String,
    },
    /// `/{db}/{coll}`
    Collection {
        /// Database name.
        db: String,
        /// Collection name.
        collection: String,
    },
    /// `/{db}/{coll}/{id}`
    Document(DocumentRef),
}

/// Why a path does not address a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidResource {
    /// Status to answer with.
    pub status: StatusCode,
    /// Message for the client.
    pub message: String,
}

impl ResourceRef {
    /// Parses a path relative to the mount.
    ///
    /// # Errors
    ///
    /// Paths with more than three segments are not found; reserved names
    /// (starting with `_`) are rejected with 400, except the schema store
    /// collection.
    pub fn parse(path: &str) -> Result<Self, InvalidResource> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let reserved = segments
            .iter()
            .take(2)
            .enumerate()
            .find(|(i, s)| s.starts_with('_') && !(*i == 1 && **s == SCHEMAS_COLLECTION));
        if let Some((_, reserved)) = reserved {
            return Err(InvalidResource {
                status: StatusCode::BAD_REQUEST,
                message: format!("'{reserved}' is a reserved name"),
            });
        }

        Ok(match segments.as_slice() {
            [] => Self::Root,
            [db] => Self::Database { db: (*db).to_string() },
            [db, collection] => Self::Collection {
                db: (*db).to_string(),
                collection: (*collection).to_string(),
            },
            [db, collection, id] => Self::Document(DocumentRef::new(*db, *collection, *id)),
            _ => {
                return Err(InvalidResource {
                    status: StatusCode::NOT_FOUND,
                    message: "resource not found".to_string(),
                })
            }
        })
    }

    /// Returns the resource kind, as used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Database { .. } => "db",
            Self::Collection { .. } => "collection",
            Self::Document(_) => "document",
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("/"),
            Self::Database { db } => write!(f, "/{db}"),
            Self::Collection { db, collection } => write!(f, "/{db}/{collection}"),
            Self::Document(target) => write!(f, "{target}"),
        }
    }
}

/// Handler that resolves and attaches the [`ResourceRef`].
#[derive(Debug, Default)]
pub struct ResourceResolver {
    link: Link,
}

impl ResourceResolver {
    /// Creates the handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Handler for ResourceResolver {
    fn name(&self) -> &str {
        "resourceResolver"
    }

    fn link(&self) -> &Link {
        &self.link
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            match ResourceRef::parse(relative_path(exchange)) {
                Ok(resource) => exchange.attach(RESOURCE, resource),
                Err(invalid) => exchange.set_in_error(invalid.status, invalid.message),
            }
            self.link.forward(exchange).await
        })
    }
}
