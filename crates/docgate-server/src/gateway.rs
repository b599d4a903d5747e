//! The gateway context.
//!
//! [`Gateway`] holds everything built at bootstrap: configuration, the
//! frozen interceptor registry, the document store, the app definition cache
//! and the mounted pipelines. It is built once, shared behind an `Arc` by
//! every connection, and never mutated afterwards.
//!
//! Every mounted pipeline has the same frame:
//!
//! ```text
//! requestLogger → serviceInitializer → [service specific pre-auth handlers]
//!   → requestInterceptors(REQUEST_BEFORE_AUTH) → queryStringRebuilder
//!   → authentication → authorization              (when security is enabled)
//!   → [service specific checks]
//!   → requestInterceptors(REQUEST_AFTER_AUTH) → queryStringRebuilder
//!   → service → responseInterceptors → responseSender
//! ```

use crate::convert::{error_response, exchange_from_request, response_from_exchange, HttpResponse};
use crate::error::ServerResult;
use crate::logging::RequestLogger;
use crate::metrics::RequestsMetrics;
use crate::mounts::MountTable;
use crate::ping::PingService;
use bytes::Bytes;
use docgate_config::GatewayConfig;
use docgate_core::{GatewayError, InterceptPoint};
use docgate_graphql::{
    AppDefinitionCache, AppDefinitionChecker, AppDefinitionLoader, GraphQlService, QueryEngine,
    SharedAppCache, UnavailableQueryEngine,
};
use docgate_mongo::{
    CollectionPropsInjector, ContentChecker, DocumentDispatcher, EtagPolicyInjector, JsonSchemaAfterWrite,
    JsonSchemaBeforeWrite, ResourceResolver,
};
use docgate_pipeline::{
    finalize_response, Interceptor, InterceptorDescriptor, InterceptorRegistry, InterceptorRegistryBuilder,
    PipelineBuilder, PipelineError, QueryStringRebuilder, RequestInterceptorsExecutor,
    ResponseInterceptorsExecutor, ResponseSender, Service, ServiceInitializer, SharedHandler, SharedRegistry,
    WrappingHandler,
};
use docgate_security::{
    AclAuthorizer, Authenticator, AuthenticationHandler, AuthorizationHandler, Authorizer,
    BasicAuthenticator, FailedAuthLogger,
};
use docgate_store::{InMemoryDocuments, SharedDocuments};
use docgate_telemetry::metrics::InFlightGuard;
use http::Request;
use std::sync::Arc;

/// The bootstrapped gateway.
pub struct Gateway {
    config: Arc<GatewayConfig>,
    registry: SharedRegistry,
    store: SharedDocuments,
    app_cache: SharedAppCache,
    mounts: MountTable,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("mounts", &self.mounts)
            .field("interceptors", &self.registry.len())
            .field("cached_apps", &self.app_cache.len())
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Starts building a gateway.
    #[must_use]
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    /// Builds a gateway with the bundled in-memory store and no GraphQL
    /// query engine.
    ///
    /// # Errors
    ///
    /// See [`GatewayBuilder::build`].
    pub fn new(config: GatewayConfig) -> ServerResult<Self> {
        Self::builder(config).build()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Returns the interceptor registry.
    #[must_use]
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Returns the document store.
    #[must_use]
    pub fn store(&self) -> &SharedDocuments {
        &self.store
    }

    /// Returns the app definition cache.
    #[must_use]
    pub fn app_cache(&self) -> &SharedAppCache {
        &self.app_cache
    }

    /// Returns the mount table.
    #[must_use]
    pub fn mounts(&self) -> &MountTable {
        &self.mounts
    }

    /// Runs a request through the pipeline mounted at its path.
    ///
    /// This is the fault boundary: an error escaping the pipeline becomes a
    /// response with the error's status.
    pub async fn dispatch(&self, request: Request<Bytes>) -> HttpResponse {
        let _in_flight = InFlightGuard::new();
        let mut exchange = exchange_from_request(request);
        let include_trace = self.config.server.include_error_trace;

        let Some(mount) = self.mounts.resolve(exchange.path()) else {
            let err = GatewayError::not_found(format!("no service is mounted at {}", exchange.path()));
            return error_response(&err, false, exchange.request_id());
        };

        match mount.head().handle(&mut exchange).await {
            Ok(()) => {
                if !exchange.is_response_complete() {
                    finalize_response(&mut exchange);
                }
                response_from_exchange(&exchange)
            }
            Err(e) => {
                tracing::error!(
                    request_id = %exchange.request_id(),
                    http.method = %exchange.method(),
                    http.path = exchange.path(),
                    service = mount.name(),
                    duration_ms = u64::try_from(exchange.elapsed().as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "request failed"
                );
                error_response(&e, include_trace, exchange.request_id())
            }
        }
    }
}

/// Builder for [`Gateway`].
pub struct GatewayBuilder {
    config: GatewayConfig,
    store: Option<SharedDocuments>,
    engine: Option<Arc<dyn QueryEngine>>,
    interceptors: InterceptorRegistryBuilder,
}

impl GatewayBuilder {
    fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            store: None,
            engine: None,
            interceptors: InterceptorRegistry::builder(),
        }
    }

    /// Uses `store` instead of a fresh in-memory store.
    #[must_use]
    pub fn store(mut self, store: SharedDocuments) -> Self {
        self.store = Some(store);
        self
    }

    /// Executes GraphQL queries with `engine`.
    #[must_use]
    pub fn query_engine(mut self, engine: Arc<dyn QueryEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Registers an additional interceptor.
    #[must_use]
    pub fn interceptor(mut self, descriptor: InterceptorDescriptor, interceptor: impl Interceptor) -> Self {
        self.interceptors = self.interceptors.register(descriptor, interceptor);
        self
    }

    /// Validates the configuration, initializes the interceptors and builds
    /// the pipelines.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, an interceptor
    /// rejects its arguments or the security section is malformed.
    pub fn build(self) -> ServerResult<Gateway> {
        let config = Arc::new(self.config);
        config.validate()?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryDocuments::new()) as SharedDocuments);
        let app_cache: SharedAppCache = Arc::new(AppDefinitionCache::new());

        let mut interceptors = self
            .interceptors
            .register(FailedAuthLogger::descriptor(), FailedAuthLogger::new())
            .register(RequestsMetrics::descriptor(), RequestsMetrics::new());
        if config.graphql.enabled {
            interceptors = interceptors.register(
                AppDefinitionChecker::descriptor(),
                AppDefinitionChecker::new(Arc::clone(&store), Arc::clone(&app_cache), &config.graphql),
            );
        }
        if config.mongo.enabled {
            interceptors = interceptors
                .register(CollectionPropsInjector::descriptor(), CollectionPropsInjector::new(Arc::clone(&store)))
                .register(JsonSchemaBeforeWrite::descriptor(), JsonSchemaBeforeWrite::new(Arc::clone(&store)))
                .register(JsonSchemaAfterWrite::descriptor(), JsonSchemaAfterWrite::new(Arc::clone(&store)));
        }
        let registry: SharedRegistry = Arc::new(interceptors.build(&config)?);

        let security = if config.security.enabled {
            let authenticator: Arc<dyn Authenticator> =
                Arc::new(BasicAuthenticator::from_config(&config.security)?);
            let authorizer: Arc<dyn Authorizer> = Arc::new(AclAuthorizer::from_config(&config.security)?);
            Some((authenticator, authorizer))
        } else {
            None
        };

        let frame = Frame {
            config: &config,
            registry: &registry,
            security: security.as_ref(),
        };

        let mut mounts = MountTable::new();

        if config.mongo.enabled {
            let mount = config.mongo.mount.as_str();
            let head = frame.pipeline(
                ServiceInitializer::new(mount, &[]),
                vec![Arc::new(ResourceResolver::new())],
                vec![
                    Arc::new(ContentChecker::new()),
                    Arc::new(EtagPolicyInjector::new(config.mongo.etag_check_policy)),
                ],
                Arc::new(DocumentDispatcher::new(Arc::clone(&store), &config.mongo)),
            )?;
            if let Some(head) = head {
                mounts.mount(mount, "documents", head);
            }
        }

        if config.graphql.enabled {
            let loader = AppDefinitionLoader::new(Arc::clone(&store), Arc::clone(&app_cache), &config.graphql);
            let engine = self
                .engine
                .unwrap_or_else(|| Arc::new(UnavailableQueryEngine) as Arc<dyn QueryEngine>);
            let service: Arc<dyn Service> =
                Arc::new(GraphQlService::new(loader, engine).verbose(config.graphql.verbose));
            let mount = config.graphql.mount.as_str();
            let head = frame.pipeline(
                ServiceInitializer::for_service(mount, service.as_ref()),
                Vec::new(),
                Vec::new(),
                Arc::new(WrappingHandler::wrap_service(service)),
            )?;
            if let Some(head) = head {
                mounts.mount(mount, "graphql", head);
            }
        }

        if config.ping.enabled {
            let service: Arc<dyn Service> = Arc::new(PingService::new(config.ping.message.clone()));
            let mount = config.ping.mount.as_str();
            let head = frame.pipeline(
                ServiceInitializer::for_service(mount, service.as_ref()),
                Vec::new(),
                Vec::new(),
                Arc::new(WrappingHandler::wrap_service(service)),
            )?;
            if let Some(head) = head {
                mounts.mount(mount, "ping", head);
            }
        }

        for mount in mounts.iter() {
            tracing::info!(mount = mount.prefix(), service = mount.name(), "Service mounted");
        }
        tracing::info!(
            request_before_auth = ?registry.names(InterceptPoint::RequestBeforeAuth),
            request_after_auth = ?registry.names(InterceptPoint::RequestAfterAuth),
            response = ?registry.names(InterceptPoint::Response),
            response_async = ?registry.names(InterceptPoint::ResponseAsync),
            "Interceptors registered"
        );

        Ok(Gateway {
            config,
            registry,
            store,
            app_cache,
            mounts,
        })
    }
}

/// What every pipeline shares.
struct Frame<'a> {
    config: &'a GatewayConfig,
    registry: &'a SharedRegistry,
    security: Option<&'a (Arc<dyn Authenticator>, Arc<dyn Authorizer>)>,
}

impl Frame<'_> {
    fn pipeline(
        &self,
        initializer: ServiceInitializer,
        before_auth: Vec<SharedHandler>,
        after_auth: Vec<SharedHandler>,
        service: SharedHandler,
    ) -> Result<Option<SharedHandler>, PipelineError> {
        let mut builder = PipelineBuilder::new()
            .then(Arc::new(RequestLogger::new(self.config.logging.requests)))
            .then(Arc::new(initializer));
        for handler in before_auth {
            builder = builder.then(handler);
        }
        builder = builder
            .then(Arc::new(RequestInterceptorsExecutor::new(
                InterceptPoint::RequestBeforeAuth,
                Arc::clone(self.registry),
            )))
            .then(Arc::new(QueryStringRebuilder::new()));

        if let Some((authenticator, authorizer)) = self.security {
            builder = builder
                .then(Arc::new(AuthenticationHandler::new(
                    Arc::clone(authenticator),
                    Arc::clone(self.registry),
                )))
                .then(Arc::new(
                    AuthorizationHandler::new(Arc::clone(authorizer))
                        .with_challenge(authenticator.challenge()),
                ));
        }

        for handler in after_auth {
            builder = builder.then(handler);
        }
        builder
            .then(Arc::new(RequestInterceptorsExecutor::new(
                InterceptPoint::RequestAfterAuth,
                Arc::clone(self.registry),
            )))
            .then(Arc::new(QueryStringRebuilder::new()))
            .then(service)
            .then(Arc::new(ResponseInterceptorsExecutor::new(Arc::clone(self.registry))))
            .then(Arc::new(ResponseSender::new()))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgate_pipeline::chain_names;

    #[test]
    fn test_default_mounts() {
        let gateway = Gateway::new(GatewayConfig::default()).unwrap();
        let prefixes: Vec<&str> = gateway.mounts().iter().map(|m| m.prefix()).collect();
        assert_eq!(prefixes, ["/graphql", "/ping", "/"]);
        assert!(gateway.registry().get(AppDefinitionChecker::NAME).is_some());
        assert!(gateway.registry().get(RequestsMetrics::NAME).is_some());
        assert!(gateway.registry().get(CollectionPropsInjector::NAME).is_some());
        assert!(gateway.registry().get(JsonSchemaBeforeWrite::NAME).is_some());
        assert!(gateway.registry().get(JsonSchemaAfterWrite::NAME).is_some());
    }

    #[test]
    fn test_document_pipeline_layout() {
        let gateway = Gateway::new(GatewayConfig::default()).unwrap();
        let documents = gateway.mounts().resolve("/db/coll").unwrap();
        assert_eq!(
            chain_names(documents.head()),
            [
                "requestLogger",
                "serviceInitializer",
                "resourceResolver",
                "requestInterceptors(REQUEST_BEFORE_AUTH)",
                "queryStringRebuilder",
                "contentChecker",
                "etagPolicyInjector",
                "requestInterceptors(REQUEST_AFTER_AUTH)",
                "queryStringRebuilder",
                "documentDispatcher",
                "responseInterceptors",
                "responseSender",
            ]
        );
    }

    #[test]
    fn test_security_adds_auth_handlers() {
        let mut config = GatewayConfig::default();
        config.security.enabled = true;
        let gateway = Gateway::new(config).unwrap();

        let graphql = gateway.mounts().resolve("/graphql/shop").unwrap();
        let names = chain_names(graphql.head());
        assert!(names.contains(&"authentication".to_string()));
        assert!(names.contains(&"authorization".to_string()));
        assert!(names.contains(&"wrapping(graphql)".to_string()));
    }

    #[test]
    fn test_disabled_services_are_not_mounted() {
        let mut config = GatewayConfig::default();
        config.graphql.enabled = false;
        config.ping.enabled = false;
        let gateway = Gateway::new(config).unwrap();

        assert_eq!(gateway.mounts().len(), 1);
        assert!(gateway.registry().get(AppDefinitionChecker::NAME).is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = GatewayConfig::default();
        config.ping.mount = "/graphql".to_string();
        assert!(Gateway::new(config).is_err());
    }
}
