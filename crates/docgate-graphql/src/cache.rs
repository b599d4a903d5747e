//! App definition cache and loader.

use crate::mapping::MappingLimits;
use crate::model::AppDefinition;
use docgate_config::GraphqlConfig;
use docgate_core::{GatewayError, GatewayResult};
use docgate_store::{Filter, SharedDocuments};
use parking_lot::RwLock;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// Validated app definitions by URI.
///
/// Filled by the app definition checker after each accepted write and by
/// the loader on a miss.
#[derive(Debug, Default)]
pub struct AppDefinitionCache {
    apps: RwLock<HashMap<String, Arc<AppDefinition>>>,
}

/// A shared cache.
pub type SharedAppCache = Arc<AppDefinitionCache>;

impl AppDefinitionCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the app served under `uri`.
    #[must_use]
    pub fn get(&self, uri: &str) -> Option<Arc<AppDefinition>> {
        self.apps.read().get(uri).cloned()
    }

    /// Stores an app under its URI, replacing any previous version.
    ///
    /// Apps without a URI are not cached.
    pub fn put(&self, app: AppDefinition) -> Arc<AppDefinition> {
        let app = Arc::new(app);
        if let Some(uri) = app.uri() {
            self.apps.write().insert(uri.to_string(), Arc::clone(&app));
        }
        app
    }

    /// Drops the app served under `uri`.
    pub fn invalidate(&self, uri: &str) -> Option<Arc<AppDefinition>> {
        self.apps.write().remove(uri)
    }

    /// Returns the number of cached apps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.apps.read().len()
    }

    /// Returns true if no app is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.apps.read().is_empty()
    }
}

/// Reads app definitions from the store, through the cache.
#[derive(Clone)]
pub struct AppDefinitionLoader {
    store: SharedDocuments,
    cache: SharedAppCache,
    db: String,
    collection: String,
    limits: MappingLimits,
}

impl std::fmt::Debug for AppDefinitionLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppDefinitionLoader")
            .field("db", &self.db)
            .field("collection", &self.collection)
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl AppDefinitionLoader {
    /// Creates a loader for the configured app definition collection.
    #[must_use]
    pub fn new(store: SharedDocuments, cache: SharedAppCache, config: &GraphqlConfig) -> Self {
        Self {
            store,
            cache,
            db: config.db.clone(),
            collection: config.collection.clone(),
            limits: MappingLimits::from(config),
        }
    }

    /// Returns the cache.
    #[must_use]
    pub fn cache(&self) -> &SharedAppCache {
        &self.cache
    }

    /// Returns the app served under `uri`, loading it on a cache miss.
    ///
    /// Disabled apps are reported as absent.
    ///
    /// # Errors
    ///
    /// Returns a 400 if the stored definition is invalid and a 502 if the
    /// store is unavailable.
    pub async fn load(&self, uri: &str) -> GatewayResult<Option<Arc<AppDefinition>>> {
        if let Some(app) = self.cache.get(uri) {
            return Ok(app.is_enabled().then_some(app));
        }

        let filter = Filter::parse(&json!({
            "$or": [
                {"descriptor.uri": uri},
                {"descriptor.name": uri},
                {"_id": uri}
            ]
        }))?;
        let candidates = self
            .store
            .find(&self.db, &self.collection, &filter, &Default::default())
            .await?;

        for document in candidates {
            let app = AppDefinition::build(&document, &self.limits).map_err(|e| {
                tracing::error!(uri, error = %e, "Stored app definition is invalid");
                GatewayError::from(e)
            })?;
            if app.uri() == Some(uri) {
                tracing::debug!(uri, "App definition loaded");
                let app = self.cache.put(app);
                return Ok(app.is_enabled().then_some(app));
            }
        }

        Ok(None)
    }
}
