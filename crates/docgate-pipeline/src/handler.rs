//! The handler chain.
//!
//! A pipeline is a singly linked, acyclic chain of [`Handler`]s built once at
//! bootstrap with [`pipe`] and shared by every request afterwards. Each
//! handler either forwards the exchange to its next handler, returns without
//! forwarding to short-circuit, or fails.
//!
//! # Bypass convention
//!
//! A handler that finds the exchange already in error must not perform its
//! own work and must forward instead, so that downstream observers (response
//! interceptors, logging, the response sender) still see the request.
//!
//! # Example
//!
//! ```
//! use docgate_pipeline::{pipe, FnHandler, Handler};
//!
//! let head = pipe([
//!     Some(FnHandler::shared("first", |_| Ok(()))),
//!     None,
//!     Some(FnHandler::shared("second", |_| Ok(()))),
//! ])
//! .unwrap()
//! .unwrap();
//!
//! assert_eq!(docgate_pipeline::chain_names(&head), ["first", "second"]);
//! ```

use crate::error::PipelineError;
use docgate_core::{BoxFuture, Exchange, GatewayResult};
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

/// A type-erased handler that can be linked into a chain.
pub type SharedHandler = Arc<dyn Handler>;

/// A composable unit of request processing.
///
/// Handlers are shared across concurrent requests, so they must not keep
/// per-request state in their fields; that belongs on the [`Exchange`].
pub trait Handler: Send + Sync + 'static {
    /// Returns the handler name, used in logs and diagnostics.
    fn name(&self) -> &str;

    /// Returns the link to the next handler.
    fn link(&self) -> &Link;

    /// Processes the exchange.
    ///
    /// Implementations usually end with `self.link().forward(exchange)` to
    /// continue the chain.
    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>>;

    /// Returns the next handler, if any.
    fn next(&self) -> Option<&SharedHandler> {
        self.link().get()
    }
}

/// The "next" reference of a handler.
///
/// A link is set at most once, when the chain is built.
#[derive(Default)]
pub struct Link {
    next: OnceLock<SharedHandler>,
}

impl Link {
    /// Creates an unset link.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: OnceLock::new(),
        }
    }

    /// Returns the next handler.
    #[must_use]
    pub fn get(&self) -> Option<&SharedHandler> {
        self.next.get()
    }

    fn set(&self, next: SharedHandler) -> bool {
        self.next.set(next).is_ok()
    }

    /// Forwards the exchange to the next handler.
    ///
    /// Does nothing at the end of the chain or once the response is
    /// complete.
    pub async fn forward(&self, exchange: &mut Exchange) -> GatewayResult<()> {
        match self.next.get() {
            Some(next) if !exchange.is_response_complete() => next.handle(exchange).await,
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("next", &self.next.get().map(|next| next.name().to_string()))
            .finish()
    }
}

/// Links the given handlers into a chain and returns its head.
///
/// `None` entries are skipped; the surviving handlers are linked in input
/// order. An empty or all-`None` input yields `Ok(None)`.
///
/// # Errors
///
/// Returns [`PipelineError::AlreadyLinked`] if any handler, the last one
/// included, already has a next handler, and
/// [`PipelineError::DuplicateHandler`] if the same instance appears twice.
/// Both would make the chain cyclic. Nothing is linked when an error is
/// returned.
pub fn pipe<I>(handlers: I) -> Result<Option<SharedHandler>, PipelineError>
where
    I: IntoIterator<Item = Option<SharedHandler>>,
{
    let handlers: Vec<SharedHandler> = handlers.into_iter().flatten().collect();

    let mut seen = HashSet::new();
    for handler in &handlers {
        if !seen.insert(Arc::as_ptr(handler).cast::<()>()) {
            return Err(PipelineError::duplicate_handler(handler.name()));
        }
        if handler.next().is_some() {
            return Err(PipelineError::already_linked(handler.name()));
        }
    }

    for pair in handlers.windows(2) {
        if !pair[0].link().set(Arc::clone(&pair[1])) {
            return Err(PipelineError::already_linked(pair[0].name()));
        }
    }

    Ok(handlers.into_iter().next())
}

/// Returns the names of the handlers of a chain, starting at `head`.
#[must_use]
pub fn chain_names(head: &SharedHandler) -> Vec<String> {
    let mut names = vec![head.name().to_string()];
    let mut current = head.next();
    while let Some(handler) = current {
        names.push(handler.name().to_string());
        current = handler.next();
    }
    names
}

/// Builder for a handler chain.
///
/// ```
/// use docgate_pipeline::{FnHandler, PipelineBuilder};
///
/// let verbose = false;
/// let head = PipelineBuilder::new()
///     .then(FnHandler::shared("resolve", |_| Ok(())))
///     .then_if(verbose, || FnHandler::shared("trace", |_| Ok(())))
///     .then(FnHandler::shared("send", |_| Ok(())))
///     .build()
///     .unwrap();
///
/// assert!(head.is_some());
/// ```
#[derive(Default)]
pub struct PipelineBuilder {
    handlers: Vec<Option<SharedHandler>>,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler.
    #[must_use]
    pub fn then(mut self, handler: SharedHandler) -> Self {
        self.handlers.push(Some(handler));
        self
    }

    /// Appends an optional handler.
    #[must_use]
    pub fn then_opt(mut self, handler: Option<SharedHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Appends a handler only when `condition` holds.
    #[must_use]
    pub fn then_if(self, condition: bool, handler: impl FnOnce() -> SharedHandler) -> Self {
        let handler = condition.then(handler);
        self.then_opt(handler)
    }

    /// Links the handlers and returns the head.
    ///
    /// # Errors
    ///
    /// See [`pipe`].
    pub fn build(self) -> Result<Option<SharedHandler>, PipelineError> {
        pipe(self.handlers)
    }
}

/// A handler built from a synchronous closure.
///
/// The closure is skipped when the exchange is already in error; the
/// exchange is forwarded in every case.
pub struct FnHandler<F> {
    name: String,
    link: Link,
    func: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&mut Exchange) -> GatewayResult<()> + Send + Sync + 'static,
{
    /// Creates a function-based handler.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            link: Link::new(),
            func,
        }
    }

    /// Creates a function-based handler ready to be piped.
    pub fn shared(name: impl Into<String>, func: F) -> SharedHandler {
        Arc::new(Self::new(name, func))
    }
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(&mut Exchange) -> GatewayResult<()> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn link(&self) -> &Link {
        &self.link
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            if !exchange.is_in_error() {
                (self.func)(exchange)?;
            }
            self.link.forward(exchange).await
        })
    }
}
