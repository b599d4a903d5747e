//! The HTTP server.
//!
//! Accepts HTTP/1 connections, reads each request body in full (bounded by
//! size and time) and hands the request to [`Gateway::dispatch`]. One tokio
//! task serves each connection.
//!
//! ```rust,ignore
//! use docgate_server::{Gateway, Server};
//!
//! let gateway = Gateway::new(config)?;
//! Server::new(gateway).run().await?;
//! ```

use crate::convert::{status_response, HttpResponse};
use crate::error::{ServerError, ServerResult};
use crate::gateway::Gateway;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};
use http::{Request, StatusCode};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Serves a [`Gateway`] over HTTP.
#[derive(Debug, Clone)]
pub struct Server {
    gateway: Arc<Gateway>,
    http_addr: String,
    shutdown_timeout: Duration,
    request_timeout: Duration,
    max_body_bytes: usize,
}

impl Server {
    /// Creates a server with the gateway's `[server]` settings.
    #[must_use]
    pub fn new(gateway: Gateway) -> Self {
        let config = &gateway.config().server;
        Self {
            http_addr: config.http_addr.clone(),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            max_body_bytes: config.max_body_bytes,
            gateway: Arc::new(gateway),
        }
    }

    /// Overrides the listen address.
    #[must_use]
    pub fn http_addr(mut self, addr: impl Into<String>) -> Self {
        self.http_addr = addr.into();
        self
    }

    /// Returns the gateway.
    #[must_use]
    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Serves until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// See [`Server::run_with_shutdown`].
    pub async fn run(self) -> ServerResult<()> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Serves until `shutdown` is triggered, then waits up to the shutdown
    /// timeout for open connections to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    async fn bind(&self) -> ServerResult<TcpListener> {
        let addr: SocketAddr = self
            .http_addr
            .parse()
            .map_err(|_| ServerError::InvalidAddress(self.http_addr.clone()))?;
        TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
            addr: self.http_addr.clone(),
            source,
        })
    }

    /// Serves connections accepted by `listener`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's address cannot be read.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> ServerResult<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "docgate listening");

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => {
                        let token = tracker.acquire();
                        let server = Arc::clone(&server);
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            server.serve_connection(stream, remote_addr, shutdown).await;
                            drop(token);
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to accept connection"),
                },
                () = shutdown.recv() => {
                    tracing::info!("Stopped accepting connections");
                    break;
                }
            }
        }

        let open = tracker.active_connections();
        if open > 0 {
            tracing::info!(connections = open, "Waiting for open connections");
            if tokio::time::timeout(server.shutdown_timeout, tracker.drained()).await.is_err() {
                tracing::warn!(
                    connections = tracker.active_connections(),
                    "Shutdown timeout elapsed, dropping open connections"
                );
            }
        }

        tracing::info!("docgate stopped");
        Ok(())
    }

    async fn serve_connection(
        self: Arc<Self>,
        stream: tokio::net::TcpStream,
        remote_addr: SocketAddr,
        shutdown: ShutdownSignal,
    ) {
        let io = TokioIo::new(stream);
        let server = Arc::clone(&self);
        let service = service_fn(move |request: Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.handle_request(request).await) }
        });

        let connection = http1::Builder::new().serve_connection(io, service);
        tokio::pin!(connection);

        tokio::select! {
            result = connection.as_mut() => {
                if let Err(e) = result {
                    tracing::debug!(remote = %remote_addr, error = %e, "Connection error");
                }
            }
            () = shutdown.recv() => {
                connection.as_mut().graceful_shutdown();
                if let Err(e) = connection.await {
                    tracing::debug!(remote = %remote_addr, error = %e, "Connection error during shutdown");
                }
            }
        }
    }

    async fn handle_request(&self, request: Request<Incoming>) -> HttpResponse {
        let (parts, body) = request.into_parts();

        let collected = tokio::time::timeout(
            self.request_timeout,
            Limited::new(body, self.max_body_bytes).collect(),
        )
        .await;

        let body = match collected {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(e)) if e.downcast_ref::<LengthLimitError>().is_some() => {
                return status_response(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    &format!("request body exceeds {} bytes", self.max_body_bytes),
                );
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Failed to read request body");
                return status_response(StatusCode::BAD_REQUEST, "failed to read request body");
            }
            Err(_) => {
                tracing::warn!(http.path = parts.uri.path(), "Request body read timed out");
                return status_response(StatusCode::REQUEST_TIMEOUT, "request body read timed out");
            }
        };

        self.gateway
            .dispatch(Request::from_parts(parts, body))
            .await
    }
}
