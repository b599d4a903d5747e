//! The interceptor registry.
//!
//! Interceptors are declared once at bootstrap through an
//! [`InterceptorRegistryBuilder`]. Building the registry resolves each
//! interceptor's enabled flag from configuration, initializes the enabled
//! ones exactly once, orders each interception point by priority and then
//! registration order, and freezes the result. The frozen registry is read
//! concurrently without locking.

use crate::error::PipelineError;
use crate::interceptor::{FnInterceptor, Interceptor, InterceptorDescriptor};
use docgate_config::{GatewayConfig, PluginArgs};
use docgate_core::{Exchange, GatewayResult, InterceptPoint};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// An interceptor together with its registration metadata.
pub struct RegisteredInterceptor {
    descriptor: InterceptorDescriptor,
    enabled: bool,
    interceptor: Box<dyn Interceptor>,
}

impl RegisteredInterceptor {
    /// Returns the interceptor name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Returns the registration metadata.
    #[must_use]
    pub fn descriptor(&self) -> &InterceptorDescriptor {
        &self.descriptor
    }

    /// Returns the effective enabled flag.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the interceptor.
    #[must_use]
    pub fn interceptor(&self) -> &dyn Interceptor {
        self.interceptor.as_ref()
    }

    /// Evaluates the resolve predicate, guarded by the enabled flag.
    #[must_use]
    pub fn applies_to(&self, exchange: &Exchange) -> bool {
        self.enabled && self.interceptor.resolve(exchange)
    }
}

impl std::fmt::Debug for RegisteredInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredInterceptor")
            .field("descriptor", &self.descriptor)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Process-wide, frozen collection of interceptors.
#[derive(Debug, Default)]
pub struct InterceptorRegistry {
    by_point: BTreeMap<InterceptPoint, Vec<RegisteredInterceptor>>,
}

impl InterceptorRegistry {
    /// Creates a registry builder.
    #[must_use]
    pub fn builder() -> InterceptorRegistryBuilder {
        InterceptorRegistryBuilder::new()
    }

    /// Creates a registry without interceptors.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the interceptors of a point, in execution order.
    #[must_use]
    pub fn interceptors(&self, point: InterceptPoint) -> &[RegisteredInterceptor] {
        self.by_point.get(&point).map_or(&[], Vec::as_slice)
    }

    /// Returns the interceptors of a point that apply to the exchange.
    ///
    /// Every resolve predicate is evaluated on the exchange as it is now.
    #[must_use]
    pub fn resolve(&self, point: InterceptPoint, exchange: &Exchange) -> Vec<&RegisteredInterceptor> {
        self.interceptors(point)
            .iter()
            .filter(|entry| entry.applies_to(exchange))
            .collect()
    }

    /// Returns the names of the interceptors of a point, in execution order.
    #[must_use]
    pub fn names(&self, point: InterceptPoint) -> Vec<&str> {
        self.interceptors(point)
            .iter()
            .map(RegisteredInterceptor::name)
            .collect()
    }

    /// Looks up an interceptor by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RegisteredInterceptor> {
        self.by_point
            .values()
            .flatten()
            .find(|entry| entry.name() == name)
    }

    /// Returns the total number of registered interceptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_point.values().map(Vec::len).sum()
    }

    /// Returns true if no interceptor is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builder for an [`InterceptorRegistry`].
///
/// # Example
///
/// ```
/// use docgate_config::GatewayConfig;
/// use docgate_core::{Exchange, InterceptPoint};
/// use docgate_pipeline::InterceptorRegistry;
///
/// let registry = InterceptorRegistry::builder()
///     .register_fn(
///         "tagDeletes",
///         InterceptPoint::RequestAfterAuth,
///         |exchange: &Exchange| exchange.method() == http::Method::DELETE,
///         |_: &mut Exchange| Ok(()),
///     )
///     .build(&GatewayConfig::default())
///     .unwrap();
///
/// assert_eq!(registry.names(InterceptPoint::RequestAfterAuth), ["tagDeletes"]);
/// ```
#[derive(Default)]
pub struct InterceptorRegistryBuilder {
    entries: Vec<(InterceptorDescriptor, Box<dyn Interceptor>)>,
}

impl InterceptorRegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an interceptor.
    #[must_use]
    pub fn register(
        mut self,
        descriptor: InterceptorDescriptor,
        interceptor: impl Interceptor,
    ) -> Self {
        self.entries.push((descriptor, Box::new(interceptor)));
        self
    }

    /// Registers an interceptor built from closures.
    #[must_use]
    pub fn register_fn<R, H>(
        self,
        name: impl Into<String>,
        point: InterceptPoint,
        resolve: R,
        handle: H,
    ) -> Self
    where
        R: Fn(&Exchange) -> bool + Send + Sync + 'static,
        H: Fn(&mut Exchange) -> GatewayResult<()> + Send + Sync + 'static,
    {
        self.register(
            InterceptorDescriptor::new(name, point),
            FnInterceptor::new(resolve, handle),
        )
    }

    /// Initializes the interceptors and freezes the registry.
    ///
    /// `plugins-args.<name>.enabled` overrides an interceptor's default
    /// enabled flag. Disabled interceptors stay registered but are neither
    /// initialized nor invoked.
    ///
    /// # Errors
    ///
    /// Returns an error if two interceptors share a name or an enabled
    /// interceptor rejects its configuration.
    pub fn build(self, config: &GatewayConfig) -> Result<InterceptorRegistry, PipelineError> {
        let mut names = HashSet::new();
        for (descriptor, _) in &self.entries {
            if !names.insert(descriptor.name().to_string()) {
                return Err(PipelineError::duplicate_interceptor(descriptor.name()));
            }
        }

        let mut by_point: BTreeMap<InterceptPoint, Vec<RegisteredInterceptor>> = BTreeMap::new();
        for (descriptor, mut interceptor) in self.entries {
            let args = PluginArgs::for_scope(config, descriptor.name(), descriptor.get_scope());
            let enabled = args
                .enabled()
                .unwrap_or_else(|| descriptor.is_enabled_by_default());

            if enabled {
                interceptor
                    .init(&args)
                    .map_err(|source| PipelineError::InterceptorInit {
                        name: descriptor.name().to_string(),
                        source,
                    })?;
            }

            tracing::debug!(
                interceptor = descriptor.name(),
                intercept_point = %descriptor.point(),
                priority = descriptor.get_priority(),
                enabled,
                "Interceptor registered"
            );

            by_point
                .entry(descriptor.point())
                .or_default()
                .push(RegisteredInterceptor {
                    descriptor,
                    enabled,
                    interceptor,
                });
        }

        // Stable sort keeps registration order among equal priorities.
        for entries in by_point.values_mut() {
            entries.sort_by_key(|entry| entry.descriptor.get_priority());
        }

        Ok(InterceptorRegistry { by_point })
    }
}

/// A registry shared by the pipelines.
pub type SharedRegistry = Arc<InterceptorRegistry>;
