//! # Replication Agent
//!
//! An HTTP/HTTPS client for traffic between the worker processes of a
//! horizontally scaled deployment.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                          ReplicationAgent                                │
//! │                                                                          │
//! │  ┌──────────────┐   ┌──────────────────┐   ┌──────────────────────────┐  │
//! │  │ Uri          │──►│ EndpointResolver │──►│ PooledRequestExecutor    │  │
//! │  │ (lenient)    │   │ http  → TCP      │   │ key = (scheme,host:port) │  │
//! │  └──────────────┘   │ https → TLS/TCP  │   └────────────┬─────────────┘  │
//! │                     │   via TlsPolicy  │                │                │
//! │                     └──────────────────┘                ▼                │
//! │                                             ┌──────────────────────────┐ │
//! │                                             │ ConnectionPool           │ │
//! │                                             │ (HttpConnectionPool)     │ │
//! │                                             └──────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Request targets are parsed without validation, so replication URIs that
//! embed socket paths (spaces included) go through untouched. Connections
//! are shared by every request to the same `(scheme, host:port)`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use replication_agent::{AgentConfig, ReplicationAgent, RustlsPolicy};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> replication_agent::Result<()> {
//!     let policy = Arc::new(RustlsPolicy::with_roots(rustls::RootCertStore::empty()));
//!     let agent = ReplicationAgent::from_config(
//!         tokio::runtime::Handle::current(),
//!         &AgentConfig::default(),
//!         policy,
//!     )?;
//!
//!     let response = agent
//!         .request(b"GET", b"http://10.0.0.5:8008/_synapse/replication/ping", None, None)
//!         .await?;
//!     println!("{}", response.status());
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod body;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod pool;
pub mod response;
pub mod tls;
pub mod uri;

// Re-exports for convenience
pub use agent::ReplicationAgent;
pub use body::{BodyProducer, BodySink, BytesProducer};
pub use config::{AgentConfig, PoolConfig};
pub use endpoint::{
    AsyncStream, BoxedStream, EndpointResolver, ReplicationEndpoint, StreamEndpoint, TcpEndpoint, TlsEndpoint,
};
pub use error::{AgentError, Result};
pub use executor::{KeyFn, PooledRequestExecutor, UriStrictness};
pub use pool::{ConnectionPool, HttpConnectionPool, PoolKey, PooledConnection};
pub use response::{Response, ResponseBody};
pub use tls::{RustlsPolicy, TlsConnect, TlsPolicy};
pub use uri::Uri;
