// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Connection endpoints and scheme dispatch.
//!
//! An endpoint is a recipe for a byte stream: it holds everything needed to
//! dial a peer but does no I/O until [`StreamEndpoint::connect`] is awaited.
//! The pool decides whether to call it at all; when a pooled connection is
//! reused the endpoint is simply dropped.
//!
//! # Scheme Dispatch
//!
//! ```text
//! http   → TcpEndpoint(host, port)
//! https  → TlsEndpoint(policy.context_for(host, port), TcpEndpoint(host, port))
//! other  → UnsupportedScheme(scheme)   (nothing built, policy not consulted)
//! ```

use crate::error::{AgentError, Result};
use crate::metrics;
use crate::tls::{TlsConnect, TlsPolicy};
use crate::uri::Uri;
use futures::future::BoxFuture;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpSocket, TcpStream};
use tracing::{debug, warn};

/// A live, bidirectional byte stream (plain TCP or TLS over TCP).
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

/// Owned, type-erased stream handed to the HTTP codec.
pub type BoxedStream = Box<dyn AsyncStream>;

/// Something that can open a byte stream to a peer.
pub trait StreamEndpoint: Send + Sync {
    /// Establish the connection.
    fn connect(&self) -> BoxFuture<'_, Result<BoxedStream>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// TcpEndpoint
// ═══════════════════════════════════════════════════════════════════════════════

/// Plain TCP to `(host, port)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpEndpoint {
    host: String,
    port: u16,
    connect_timeout: Option<Duration>,
    bind_address: Option<SocketAddr>,
}

impl TcpEndpoint {
    /// Create an endpoint with no timeout and no local bind address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: None,
            bind_address: None,
        }
    }

    /// Bound the whole connection attempt (DNS + connect).
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bind outgoing sockets to a local address.
    pub fn with_bind_address(mut self, addr: Option<SocketAddr>) -> Self {
        self.bind_address = addr;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub fn bind_address(&self) -> Option<SocketAddr> {
        self.bind_address
    }

    fn target(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    async fn connect_tcp(&self) -> Result<TcpStream> {
        let target = self.target();
        let addrs = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| AgentError::Connection {
                target: target.clone(),
                message: format!("DNS lookup failed: {}", e),
                source: Some(e),
            })?;

        let mut last_err = None;
        let mut attempted = 0usize;
        for addr in addrs {
            if let Some(bind) = self.bind_address {
                // A v4 socket cannot reach a v6 peer and vice versa
                if bind.is_ipv4() != addr.is_ipv4() {
                    continue;
                }
            }
            attempted += 1;
            match self.connect_addr(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!(target = %target, addr = %addr, error = %e, "Connect attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(match last_err {
            Some(e) => AgentError::connection(target, e),
            None if attempted == 0 => AgentError::connection_msg(
                target,
                "No usable addresses for host",
            ),
            None => AgentError::connection_msg(target, "Connection failed"),
        })
    }

    async fn connect_addr(&self, addr: SocketAddr) -> std::io::Result<TcpStream> {
        match self.bind_address {
            Some(bind) => {
                let socket = if addr.is_ipv4() {
                    TcpSocket::new_v4()?
                } else {
                    TcpSocket::new_v6()?
                };
                socket.bind(bind)?;
                socket.connect(addr).await
            }
            None => TcpStream::connect(addr).await,
        }
    }
}

impl StreamEndpoint for TcpEndpoint {
    fn connect(&self) -> BoxFuture<'_, Result<BoxedStream>> {
        Box::pin(async move {
            let start = Instant::now();
            let stream = match self.connect_timeout {
                Some(limit) => tokio::time::timeout(limit, self.connect_tcp())
                    .await
                    .map_err(|_| AgentError::ConnectTimeout {
                        target: self.target(),
                        timeout: limit,
                    })??,
                None => self.connect_tcp().await?,
            };

            if let Err(e) = stream.set_nodelay(true) {
                warn!(target = %self.target(), error = %e, "Failed to set TCP_NODELAY");
            }
            metrics::record_connect_latency("tcp", start.elapsed());
            debug!(target = %self.target(), "TCP connection established");
            Ok(Box::new(stream) as BoxedStream)
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TlsEndpoint
// ═══════════════════════════════════════════════════════════════════════════════

/// TLS negotiated over another endpoint's stream.
pub struct TlsEndpoint<E> {
    connector: Arc<dyn TlsConnect>,
    inner: E,
}

impl<E: StreamEndpoint> TlsEndpoint<E> {
    /// Wrap `inner` so every connection is upgraded with `connector`.
    pub fn wrap(connector: Arc<dyn TlsConnect>, inner: E) -> Self {
        Self { connector, inner }
    }

    /// The wrapped endpoint.
    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// The TLS connector this endpoint negotiates with.
    pub fn connector(&self) -> &Arc<dyn TlsConnect> {
        &self.connector
    }
}

impl<E: StreamEndpoint> StreamEndpoint for TlsEndpoint<E> {
    fn connect(&self) -> BoxFuture<'_, Result<BoxedStream>> {
        Box::pin(async move {
            let stream = self.inner.connect().await?;
            let start = Instant::now();
            let tls = self.connector.connect(stream).await?;
            metrics::record_connect_latency("tls_handshake", start.elapsed());
            Ok(tls)
        })
    }
}

impl<E: fmt::Debug> fmt::Debug for TlsEndpoint<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsEndpoint").field("inner", &self.inner).finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Resolver
// ═══════════════════════════════════════════════════════════════════════════════

/// Endpoint produced by [`EndpointResolver::resolve`].
///
/// The shape is inspectable so callers and tests can see what will be
/// dialled without dialling it.
#[derive(Debug)]
pub enum ReplicationEndpoint {
    /// `http`: plain TCP.
    Tcp(TcpEndpoint),
    /// `https`: TLS over TCP.
    Tls(TlsEndpoint<TcpEndpoint>),
}

impl ReplicationEndpoint {
    /// The TCP endpoint at the bottom of the stack.
    pub fn tcp(&self) -> &TcpEndpoint {
        match self {
            Self::Tcp(tcp) => tcp,
            Self::Tls(tls) => tls.inner(),
        }
    }

    /// Whether connections are TLS-wrapped.
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl StreamEndpoint for ReplicationEndpoint {
    fn connect(&self) -> BoxFuture<'_, Result<BoxedStream>> {
        match self {
            Self::Tcp(tcp) => tcp.connect(),
            Self::Tls(tls) => tls.connect(),
        }
    }
}

/// Maps parsed URIs to endpoints, rejecting anything but `http`/`https`.
pub struct EndpointResolver {
    tls_policy: Arc<dyn TlsPolicy>,
    connect_timeout: Option<Duration>,
    bind_address: Option<SocketAddr>,
}

impl EndpointResolver {
    /// Create a resolver using `tls_policy` for `https` targets.
    pub fn new(tls_policy: Arc<dyn TlsPolicy>) -> Self {
        Self {
            tls_policy,
            connect_timeout: None,
            bind_address: None,
        }
    }

    /// Connect timeout applied to every TCP endpoint built.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Local bind address applied to every TCP endpoint built.
    pub fn with_bind_address(mut self, addr: Option<SocketAddr>) -> Self {
        self.bind_address = addr;
        self
    }

    /// Decide how to reach `uri`.
    ///
    /// Does not suspend and performs no I/O; the only side effect is the TLS
    /// policy lookup for `https`.
    ///
    /// # Errors
    ///
    /// [`AgentError::UnsupportedScheme`] for any scheme other than `http` or
    /// `https`, checked before anything else about the target.
    /// [`AgentError::InvalidUri`] for an `http`/`https` target with no host,
    /// or whatever error the TLS policy returns.
    pub fn resolve(&self, uri: &Uri) -> Result<ReplicationEndpoint> {
        match uri.scheme() {
            b"http" | b"https" => {
                if uri.host().is_empty() {
                    return Err(AgentError::InvalidUri(format!("empty host ({})", uri)));
                }
                let tcp = TcpEndpoint::new(uri.host(), uri.port())
                    .with_connect_timeout(self.connect_timeout)
                    .with_bind_address(self.bind_address);

                if uri.scheme() == b"https" {
                    let connector = self.tls_policy.context_for(uri.host(), uri.port())?;
                    Ok(ReplicationEndpoint::Tls(TlsEndpoint::wrap(connector, tcp)))
                } else {
                    Ok(ReplicationEndpoint::Tcp(tcp))
                }
            }
            other => {
                metrics::record_unsupported_scheme();
                Err(AgentError::unsupported_scheme(other))
            }
        }
    }
}
