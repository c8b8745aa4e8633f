// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The replication agent.
//!
//! An HTTP(S) client for traffic between cooperating workers. Two things set
//! it apart from a general-purpose client:
//!
//! - **Connections are shared per `(scheme, host:port)`.** Replication peers
//!   are few and talk constantly; the path never partitions the pool.
//! - **Targets are not validated.** Workers reached over filesystem sockets
//!   carry socket paths in the URI, spaces and all. Only scheme, host and
//!   port have to make sense.
//!
//! ```text
//! request(method, uri, headers, body)
//!   │
//!   ├─ Uri::from_bytes            (lenient)
//!   ├─ EndpointResolver::resolve  (http → TCP, https → TLS/TCP, else error)
//!   ├─ PoolKey::for_netloc        (scheme, "host:port")
//!   └─ ConnectionPool::execute_request
//! ```

use crate::body::BodyProducer;
use crate::config::AgentConfig;
use crate::endpoint::EndpointResolver;
use crate::error::Result;
use crate::executor::{PooledRequestExecutor, UriStrictness};
use crate::pool::{ConnectionPool, HttpConnectionPool, PoolKey};
use crate::response::Response;
use crate::tls::TlsPolicy;
use http::HeaderMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

/// HTTP/HTTPS client for replication traffic.
///
/// Generic over the pool so tests (and embedders with their own pooling)
/// can substitute one; the default is [`HttpConnectionPool`].
pub struct ReplicationAgent<P: ConnectionPool = HttpConnectionPool> {
    resolver: EndpointResolver,
    executor: PooledRequestExecutor<P>,
}

impl ReplicationAgent<HttpConnectionPool> {
    /// Create an agent with a private, non-persistent pool.
    ///
    /// Every request opens its own connection, which is closed once the
    /// response has been read. Use [`with_pool`](Self::with_pool) to share
    /// connections.
    pub fn new(
        handle: Handle,
        tls_policy: Arc<dyn TlsPolicy>,
        connect_timeout: Option<Duration>,
        bind_address: Option<SocketAddr>,
    ) -> Self {
        let pool = Arc::new(HttpConnectionPool::non_persistent(handle));
        Self::with_pool(tls_policy, connect_timeout, bind_address, pool)
    }

    /// Create an agent, and its pool, from configuration.
    ///
    /// # Errors
    ///
    /// [`AgentError::Config`](crate::AgentError::Config) for an unparseable
    /// bind address.
    pub fn from_config(handle: Handle, config: &AgentConfig, tls_policy: Arc<dyn TlsPolicy>) -> Result<Self> {
        let bind_address = config.bind_address_parsed()?;
        let pool = Arc::new(HttpConnectionPool::new(handle, &config.pool));
        Ok(Self::with_pool(
            tls_policy,
            config.connect_timeout_duration(),
            bind_address,
            pool,
        ))
    }
}

impl<P: ConnectionPool> ReplicationAgent<P> {
    /// Create an agent that issues requests through an existing pool.
    pub fn with_pool(
        tls_policy: Arc<dyn TlsPolicy>,
        connect_timeout: Option<Duration>,
        bind_address: Option<SocketAddr>,
        pool: Arc<P>,
    ) -> Self {
        info!(
            connect_timeout_ms = connect_timeout.map(|t| t.as_millis() as u64),
            bind_address = ?bind_address,
            "Replication agent created"
        );
        let resolver = EndpointResolver::new(tls_policy)
            .with_connect_timeout(connect_timeout)
            .with_bind_address(bind_address);
        Self {
            resolver,
            executor: PooledRequestExecutor::new(pool, PoolKey::for_netloc, UriStrictness::Lenient),
        }
    }

    /// The pool requests go through.
    pub fn pool(&self) -> &Arc<P> {
        self.executor.pool()
    }

    /// The endpoint resolver used for every request.
    pub fn resolver(&self) -> &EndpointResolver {
        &self.resolver
    }

    /// Issue a request and wait for the response headers.
    ///
    /// `method` is an HTTP method token (`GET`, `POST`, ...). `uri` is an
    /// absolute `http` or `https` target; its path is passed through as-is.
    ///
    /// # Errors
    ///
    /// - [`UnsupportedScheme`](crate::AgentError::UnsupportedScheme) before
    ///   any I/O for schemes other than `http`/`https`.
    /// - [`InvalidUri`](crate::AgentError::InvalidUri) when scheme, host or
    ///   port cannot be extracted.
    /// - Any error from the TLS policy or the pool, unchanged.
    pub async fn request(
        &self,
        method: &[u8],
        uri: &[u8],
        headers: Option<HeaderMap>,
        body: Option<Box<dyn BodyProducer>>,
    ) -> Result<Response> {
        self.executor
            .execute(&self.resolver, method, uri, headers, body)
            .await
    }
}
