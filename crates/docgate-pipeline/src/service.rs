//! Typed services and their request/response views.
//!
//! A [`Service`] is a unit of behavior that is not part of a chain. It sees
//! the exchange only through a typed [`ServiceRequest`] built before the call
//! and writes its outcome into a [`ServiceResponse`] that is committed back to
//! the exchange afterwards. Services are placed in a pipeline by the
//! [`WrappingHandler`](crate::WrappingHandler).

use crate::handler::{Handler, Link};
use docgate_core::{
    Account, AttachmentKey, BoxFuture, Exchange, GatewayResult, InterceptPoint, QueryParams,
};
use http::header::HeaderName;
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde_json::{Map, Value};

/// The mount prefix under which the current pipeline was matched.
pub const MOUNT_PATH: AttachmentKey<String> = AttachmentKey::new("mount-path");

/// Interception points the target service opted out of.
pub const DONT_INTERCEPT: AttachmentKey<Vec<InterceptPoint>> =
    AttachmentKey::new("dont-intercept");

/// Returns the request path relative to the mount prefix.
///
/// The result always starts with `/`.
#[must_use]
pub fn relative_path(exchange: &Exchange) -> &str {
    let path = exchange.path();
    let relative = exchange
        .attachment(MOUNT_PATH)
        .map(|mount| mount.trim_end_matches('/'))
        .and_then(|mount| path.strip_prefix(mount))
        .unwrap_or(path);

    if relative.is_empty() {
        "/"
    } else {
        relative
    }
}

/// Returns true if interceptors must not run at `point` for this exchange.
#[must_use]
pub fn dont_intercept(exchange: &Exchange, point: InterceptPoint) -> bool {
    exchange
        .attachment(DONT_INTERCEPT)
        .is_some_and(|points| points.contains(&point))
}

/// The shape of request a service consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestKind {
    /// A JSON document request.
    #[default]
    Json,
    /// A GraphQL request: `{query, variables, operationName}`.
    GraphQl,
}

/// Typed view of a JSON request.
#[derive(Debug, Clone)]
pub struct JsonRequest {
    /// Request method.
    pub method: Method,
    /// Path relative to the mount prefix.
    pub path: String,
    /// Query parameters.
    pub query: QueryParams,
    /// Authenticated account, if any.
    pub account: Option<Account>,
    /// Parsed request content.
    pub content: Option<Value>,
}

impl JsonRequest {
    /// Builds the view from the exchange.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the request body is not valid JSON.
    pub fn from_exchange(exchange: &Exchange) -> GatewayResult<Self> {
        Ok(Self {
            method: exchange.method().clone(),
            path: relative_path(exchange).to_string(),
            query: exchange.query().clone(),
            account: exchange.account().cloned(),
            content: exchange.content()?.cloned(),
        })
    }
}

/// Typed view of a GraphQL request.
#[derive(Debug, Clone)]
pub struct GraphQlRequest {
    /// Request method.
    pub method: Method,
    /// The application URI: the path after the mount prefix, without slashes.
    pub app_uri: String,
    /// The GraphQL document.
    pub query: Option<String>,
    /// Operation variables.
    pub variables: Map<String, Value>,
    /// Operation to execute.
    pub operation_name: Option<String>,
    /// Authenticated account, if any.
    pub account: Option<Account>,
}

impl GraphQlRequest {
    /// Builds the view from the exchange.
    ///
    /// Missing members are left empty; it is up to the service to reject a
    /// request without a query.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the body is not JSON, not an object, or
    /// has members of the wrong type.
    pub fn from_exchange(exchange: &Exchange) -> GatewayResult<Self> {
        let app_uri = relative_path(exchange).trim_matches('/').to_string();

        let body = match exchange.content()? {
            None => Map::new(),
            Some(Value::Object(body)) => body.clone(),
            Some(other) => {
                return Err(docgate_core::GatewayError::validation(format!(
                    "GraphQL request must be an object but was {}",
                    json_type(other)
                )))
            }
        };

        let query = optional_string(&body, "query")?;
        let operation_name = optional_string(&body, "operationName")?;
        let variables = match body.get("variables") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(variables)) => variables.clone(),
            Some(other) => {
                return Err(docgate_core::GatewayError::validation(format!(
                    "variables must be an object but was {}",
                    json_type(other)
                )))
            }
        };

        Ok(Self {
            method: exchange.method().clone(),
            app_uri,
            query,
            variables,
            operation_name,
            account: exchange.account().cloned(),
        })
    }
}

fn optional_string(body: &Map<String, Value>, key: &str) -> GatewayResult<Option<String>> {
    match body.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(docgate_core::GatewayError::validation(format!(
            "{key} must be a string but was {}",
            json_type(other)
        ))),
    }
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Typed request handed to a service.
#[derive(Debug, Clone)]
pub enum ServiceRequest {
    /// A JSON document request.
    Json(JsonRequest),
    /// A GraphQL request.
    GraphQl(GraphQlRequest),
}

impl ServiceRequest {
    /// Builds the request view of the given kind.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the request body does not fit the kind.
    pub fn from_exchange(kind: RequestKind, exchange: &Exchange) -> GatewayResult<Self> {
        match kind {
            RequestKind::Json => JsonRequest::from_exchange(exchange).map(Self::Json),
            RequestKind::GraphQl => GraphQlRequest::from_exchange(exchange).map(Self::GraphQl),
        }
    }

    /// Returns the request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        match self {
            Self::Json(request) => &request.method,
            Self::GraphQl(request) => &request.method,
        }
    }
}

/// Response written by a service.
///
/// Committed to the exchange after the service returns.
#[derive(Debug, Clone, Default)]
pub struct ServiceResponse {
    status: Option<StatusCode>,
    headers: HeaderMap,
    content: Option<Value>,
    error: Option<String>,
    complete: bool,
}

impl ServiceResponse {
    /// Creates an empty response.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a response initialized from the exchange's current response.
    #[must_use]
    pub fn from_exchange(exchange: &Exchange) -> Self {
        Self {
            status: exchange.status(),
            headers: exchange.response_headers().clone(),
            content: exchange.response_content().cloned(),
            error: None,
            complete: false,
        }
    }

    /// Returns the status.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Sets the status.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// Returns the content.
    #[must_use]
    pub fn content(&self) -> Option<&Value> {
        self.content.as_ref()
    }

    /// Sets the content.
    pub fn set_content(&mut self, content: Value) {
        self.content = Some(content);
    }

    /// Returns the headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Sets a header. Invalid values are ignored.
    pub fn set_header(&mut self, name: HeaderName, value: &str) {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
    }

    /// Flags the response as failed.
    pub fn set_in_error(&mut self, status: StatusCode, message: impl Into<String>) {
        self.status = Some(status);
        self.error = Some(message.into());
    }

    /// Returns the error message, if the response is failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Signals that the response is final.
    pub fn mark_complete(&mut self) {
        self.complete = true;
    }

    /// Writes this response back into the exchange.
    pub fn commit(self, exchange: &mut Exchange) {
        for (name, value) in &self.headers {
            exchange.response_headers_mut().insert(name.clone(), value.clone());
        }
        if let Some(content) = self.content {
            exchange.set_response_content(Some(content));
        }
        match (self.error, self.status) {
            (Some(message), Some(status)) => exchange.set_in_error(status, message),
            (Some(message), None) => exchange.set_in_error(StatusCode::BAD_REQUEST, message),
            (None, Some(status)) => exchange.set_status(status),
            (None, None) => {}
        }
        if self.complete {
            exchange.mark_response_complete();
        }
    }
}

/// A typed, non-chained unit of request handling.
pub trait Service: Send + Sync + 'static {
    /// Returns the service name.
    fn name(&self) -> &str;

    /// Returns the implementing type, for diagnostics.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the request shape this service consumes.
    fn request_kind(&self) -> RequestKind {
        RequestKind::Json
    }

    /// Builds the typed request from the exchange.
    ///
    /// # Errors
    ///
    /// Returns a client error if the request does not fit the service.
    fn request(&self, exchange: &Exchange) -> GatewayResult<ServiceRequest> {
        ServiceRequest::from_exchange(self.request_kind(), exchange)
    }

    /// Builds the typed response from the exchange.
    fn response(&self, exchange: &Exchange) -> ServiceResponse {
        ServiceResponse::from_exchange(exchange)
    }

    /// Handles the request.
    fn handle<'a>(
        &'a self,
        request: &'a ServiceRequest,
        response: &'a mut ServiceResponse,
    ) -> BoxFuture<'a, GatewayResult<()>>;

    /// Interception points at which interceptors must not run for this
    /// service.
    fn dont_intercept(&self) -> &[InterceptPoint] {
        &[]
    }
}

/// Handler placed at the head of a service pipeline.
///
/// Records the mount prefix and the service's opted-out interception points
/// on the exchange before any interceptor runs.
pub struct ServiceInitializer {
    link: Link,
    mount: String,
    dont_intercept: Vec<InterceptPoint>,
}

impl ServiceInitializer {
    /// Creates an initializer for a pipeline mounted at `mount`.
    pub fn new(mount: impl Into<String>, dont_intercept: &[InterceptPoint]) -> Self {
        Self {
            link: Link::new(),
            mount: mount.into(),
            dont_intercept: dont_intercept.to_vec(),
        }
    }

    /// Creates an initializer for the given service.
    pub fn for_service(mount: impl Into<String>, service: &dyn Service) -> Self {
        Self::new(mount, service.dont_intercept())
    }
}

impl Handler for ServiceInitializer {
    fn name(&self) -> &str {
        "serviceInitializer"
    }

    fn link(&self) -> &Link {
        &self.link
    }

    fn handle<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move {
            exchange.attach_if_absent(MOUNT_PATH, self.mount.clone());
            if !self.dont_intercept.is_empty() {
                exchange.attach(DONT_INTERCEPT, self.dont_intercept.clone());
            }
            self.link.forward(exchange).await
        })
    }
}
