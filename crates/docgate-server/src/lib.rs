//! # Docgate Server
//!
//! The runnable gateway: bootstrap of the [`Gateway`] context, the mount
//! table, conversion between HTTP messages and exchanges, and the hyper
//! server with graceful shutdown.
//!
//! ## Mounted services
//!
//! | Mount | Service |
//! |-------|---------|
//! | `/` | document API (`/{db}/{coll}/{id}`) |
//! | `/graphql` | GraphQL apps (`POST /graphql/{app-uri}`) |
//! | `/ping` | liveness greeting |
//!
//! ## Example
//!
//! ```rust,ignore
//! use docgate_config::GatewayConfig;
//! use docgate_server::{Gateway, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = Gateway::new(GatewayConfig::default())?;
//!     Server::new(gateway).run().await?;
//!     Ok(())
//! }
//! ```
//!
//! [`Gateway::dispatch`] runs a single request without a socket, which is
//! how the integration tests drive the gateway.

#![doc(html_root_url = "https://docs.rs/docgate-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod convert;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod metrics;
pub mod mounts;
pub mod ping;
pub mod server;
pub mod shutdown;

pub use convert::{HttpResponse, ResponseBody, REQUEST_ID_HEADER};
pub use error::{ServerError, ServerResult};
pub use gateway::{Gateway, GatewayBuilder};
pub use logging::RequestLogger;
pub use metrics::RequestsMetrics;
pub use mounts::{Mount, MountTable};
pub use ping::PingService;
pub use server::Server;
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};
