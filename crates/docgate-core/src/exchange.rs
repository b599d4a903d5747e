//! The per-request exchange.
//!
//! An [`Exchange`] is created when a request arrives and is passed by
//! mutable reference through every handler and interceptor of the pipeline.
//! It is the only place where per-request mutable state may live.
//!
//! # Lifecycle flags
//!
//! - **in error**: set by any handler that detected a client or precondition
//!   error. Downstream handlers must bypass their own work and forward.
//! - **response complete**: once set, no handler may mutate the response and
//!   the chain stops forwarding.
//! - **response interceptors executed**: guards the response phase so it runs
//!   at most once per exchange.

use crate::attachment::{AttachmentKey, Attachments};
use crate::error::GatewayError;
use crate::identity::Account;
use crate::query::QueryParams;
use crate::request_id::RequestId;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use serde_json::Value;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Parsed form of the request body, computed on first access.
#[derive(Debug, Clone)]
enum Content {
    Absent,
    Json(Value),
    Malformed(String),
}

/// Mutable request/response state for a single request.
#[derive(Debug, Clone)]
pub struct Exchange {
    request_id: RequestId,
    started_at: Instant,

    method: Method,
    path: String,
    query_string: String,
    query: QueryParams,
    request_headers: HeaderMap,
    raw_content: Bytes,
    content: OnceLock<Content>,

    status: Option<StatusCode>,
    response_headers: HeaderMap,
    response_content: Option<Value>,

    in_error: bool,
    error_message: Option<String>,
    response_complete: bool,
    response_interceptors_executed: bool,

    account: Option<Account>,
    attachments: Attachments,
}

impl Exchange {
    /// Creates an exchange for the given method, path and raw query string.
    ///
    /// A query string that cannot be decoded leaves the parameter set empty
    /// and marks the exchange in error with status 400.
    pub fn new(method: Method, path: impl Into<String>, query_string: impl Into<String>) -> Self {
        let query_string = query_string.into();
        let (query, query_error) = match QueryParams::parse(&query_string) {
            Ok(query) => (query, None),
            Err(e) => (QueryParams::new(), Some(e)),
        };

        let mut exchange = Self {
            request_id: RequestId::new(),
            started_at: Instant::now(),
            method,
            path: path.into(),
            query_string,
            query,
            request_headers: HeaderMap::new(),
            raw_content: Bytes::new(),
            content: OnceLock::new(),
            status: None,
            response_headers: HeaderMap::new(),
            response_content: None,
            in_error: false,
            error_message: None,
            response_complete: false,
            response_interceptors_executed: false,
            account: None,
            attachments: Attachments::new(),
        };

        if let Some(e) = query_error {
            exchange.set_in_error(e.status_code(), e.message());
        }
        exchange
    }

    /// Sets the request ID, e.g. one propagated by an upstream proxy.
    #[must_use]
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    /// Adds a request header.
    ///
    /// Invalid header names or values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.request_headers.append(name, value);
        }
        self
    }

    /// Replaces the request headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.request_headers = headers;
        self
    }

    /// Sets the raw request body. It is parsed as JSON on first access.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.raw_content = body.into();
        self.content = OnceLock::new();
        self
    }

    /// Sets the request body from a JSON value.
    #[must_use]
    pub fn with_json(self, content: &Value) -> Self {
        let raw = serde_json::to_vec(content).unwrap_or_default();
        self.with_body(raw)
    }

    // ---- request side ----

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the time elapsed since the exchange was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Returns the request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Rewrites the request path, e.g. to strip a mount prefix.
    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    /// Returns the current raw query string.
    ///
    /// This is the string received from the client until a handler calls
    /// [`Exchange::rebuild_query_string`].
    #[must_use]
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    /// Re-encodes the query string from the current parameters.
    pub fn rebuild_query_string(&mut self) {
        self.query_string = self.query.to_query_string();
    }

    /// Returns the query parameters.
    #[must_use]
    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    /// Returns the query parameters for modification.
    pub fn query_mut(&mut self) -> &mut QueryParams {
        &mut self.query
    }

    /// Returns the request headers.
    #[must_use]
    pub fn request_headers(&self) -> &HeaderMap {
        &self.request_headers
    }

    /// Returns the request headers for modification.
    pub fn request_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.request_headers
    }

    /// Returns a request header as a string.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request_headers
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    /// Returns the raw request body.
    #[must_use]
    pub fn raw_content(&self) -> &Bytes {
        &self.raw_content
    }

    /// Returns the request body parsed as JSON.
    ///
    /// The body is parsed on first access and cached. An empty body yields
    /// `Ok(None)`; a body that is not valid JSON yields a validation error
    /// every time it is accessed.
    pub fn content(&self) -> Result<Option<&Value>, GatewayError> {
        let content = self.content.get_or_init(|| {
            if self.raw_content.iter().all(u8::is_ascii_whitespace) {
                Content::Absent
            } else {
                match serde_json::from_slice(&self.raw_content) {
                    Ok(value) => Content::Json(value),
                    Err(e) => Content::Malformed(e.to_string()),
                }
            }
        });

        match content {
            Content::Absent => Ok(None),
            Content::Json(value) => Ok(Some(value)),
            Content::Malformed(reason) => Err(GatewayError::validation(format!(
                "Invalid JSON: {reason}"
            ))),
        }
    }

    /// Replaces the request content.
    pub fn set_content(&mut self, content: Option<Value>) {
        let parsed = content.map_or(Content::Absent, Content::Json);
        self.content = OnceLock::from(parsed);
    }

    // ---- response side ----

    /// Returns the response status, if set.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Sets the response status.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// Returns the response headers.
    #[must_use]
    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    /// Returns the response headers for modification.
    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.response_headers
    }

    /// Sets a response header, replacing any previous value.
    ///
    /// Invalid header values are ignored.
    pub fn set_response_header(&mut self, name: HeaderName, value: &str) {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.response_headers.insert(name, value);
        }
    }

    /// Returns the response content.
    #[must_use]
    pub fn response_content(&self) -> Option<&Value> {
        self.response_content.as_ref()
    }

    /// Sets the response content.
    pub fn set_response_content(&mut self, content: Option<Value>) {
        self.response_content = content;
    }

    // ---- lifecycle flags ----

    /// Returns true if a handler flagged this exchange as failed.
    #[must_use]
    pub fn is_in_error(&self) -> bool {
        self.in_error
    }

    /// Returns the error message recorded with the in-error flag.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Marks the exchange as failed with the given status and message.
    pub fn set_in_error(&mut self, status: StatusCode, message: impl Into<String>) {
        self.status = Some(status);
        self.in_error = true;
        self.error_message = Some(message.into());
    }

    /// Marks the exchange as failed without changing the status.
    pub fn mark_in_error(&mut self) {
        self.in_error = true;
    }

    /// Returns true once the response has been completed.
    #[must_use]
    pub fn is_response_complete(&self) -> bool {
        self.response_complete
    }

    /// Signals that the response is complete. The chain stops forwarding.
    pub fn mark_response_complete(&mut self) {
        self.response_complete = true;
    }

    /// Returns true if the response interceptors already ran.
    #[must_use]
    pub fn response_interceptors_executed(&self) -> bool {
        self.response_interceptors_executed
    }

    /// Records that the response interceptors ran.
    pub fn mark_response_interceptors_executed(&mut self) {
        self.response_interceptors_executed = true;
    }

    // ---- identity ----

    /// Returns the authenticated account.
    #[must_use]
    pub fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    /// Sets the authenticated account.
    pub fn set_account(&mut self, account: Option<Account>) {
        self.account = account;
    }

    // ---- attachments ----

    /// Stores an attachment, replacing any previous value.
    pub fn attach<T: Send + Sync + 'static>(&mut self, key: AttachmentKey<T>, value: T) {
        self.attachments.insert(key, value);
    }

    /// Stores an attachment only if none is present for the key.
    ///
    /// Returns true if the value was stored.
    pub fn attach_if_absent<T: Send + Sync + 'static>(
        &mut self,
        key: AttachmentKey<T>,
        value: T,
    ) -> bool {
        self.attachments.insert_if_absent(key, value)
    }

    /// Returns an attachment.
    #[must_use]
    pub fn attachment<T: Send + Sync + 'static>(&self, key: AttachmentKey<T>) -> Option<&T> {
        self.attachments.get(key)
    }

    /// Returns true if an attachment is present for the key.
    #[must_use]
    pub fn has_attachment<T: Send + Sync + 'static>(&self, key: AttachmentKey<T>) -> bool {
        self.attachments.contains(key)
    }

    /// Removes an attachment.
    pub fn detach<T: Send + Sync + 'static>(&mut self, key: AttachmentKey<T>) -> Option<T> {
        self.attachments.remove(key)
    }

    /// Returns a snapshot of this exchange for work that outlives the request.
    ///
    /// The copy shares attachment values with the original but is otherwise
    /// independent: mutating one never affects the other.
    #[must_use]
    pub fn detached_copy(&self) -> Self {
        self.clone()
    }
}
