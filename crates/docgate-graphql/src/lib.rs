//! # Docgate GraphQL
//!
//! GraphQL apps for the gateway. An app is a document in the configured app
//! definition collection: a descriptor, an SDL schema and the mappings that
//! bind schema fields to queries and aggregations on stored documents.
//!
//! ## Key Types
//!
//! - [`AppDefinition`]: the validated model of a stored app definition
//! - [`AppDefinitionChecker`]: `RESPONSE` interceptor that validates each
//!   write to the app definition collection and rolls back rejected writes
//! - [`AppDefinitionCache`] / [`AppDefinitionLoader`]: lookup by app URI
//! - [`GraphQlService`]: the typed service, executing through a [`QueryEngine`]
//!
//! ## Write lifecycle of an app definition
//!
//! ```text
//! PUT /docgate/gqlapps/shop
//!   → DocumentDispatcher writes the document (201, ETag)
//!   → AppDefinitionChecker
//!        valid            → cached, 201 stands
//!        malformed        → rolled back, 400
//!        URI already used → rolled back, 409
//! ```

#![doc(html_root_url = "https://docs.rs/docgate-graphql/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod checker;
pub mod error;
pub mod interpolate;
pub mod mapping;
pub mod model;
pub mod schema;
pub mod service;

pub use cache::{AppDefinitionCache, AppDefinitionLoader, SharedAppCache};
pub use checker::AppDefinitionChecker;
pub use error::{AppDefinitionError, AppDefinitionResult, InterpolationError};
pub use interpolate::{interpolate, Bindings};
pub use mapping::{
    AggregationMapping, DataLoaderSettings, FieldMapping, MappingLimits, QueryMapping, ResolvedQuery,
    TypeMapping,
};
pub use model::{AppDefinition, AppDescriptor};
pub use schema::{SchemaDocument, TypeDefinition, TypeKind};
pub use service::{
    GraphQlQuery, GraphQlService, QueryEngine, QueryOutcome, StaticQueryEngine, UnavailableQueryEngine,
};
