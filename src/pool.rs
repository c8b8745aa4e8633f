// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Connection pooling keyed by `(scheme, host:port)`.
//!
//! The agent never touches pool internals: it hands a [`PoolKey`], a fresh
//! endpoint and the request to [`ConnectionPool::execute_request`] and gets a
//! response back. Whether that response came over a new or a reused
//! connection is the pool's business.
//!
//! # HttpConnectionPool
//!
//! The stock pool speaks HTTP/1.1 via `hyper`'s connection API:
//!
//! ```text
//! execute_request(key, endpoint, ..)
//!   │
//!   ├─ idle[key] has a live connection? ──yes──► reuse (endpoint dropped)
//!   │                                   no
//!   ├─ endpoint.connect() → handshake → spawn connection driver
//!   │
//!   ├─ send request, wait for response headers
//!   │
//!   └─ persistent?  yes → once the body is drained, park in idle[key]
//!                   no  → connection closes after this exchange
//! ```
//!
//! Each parked connection is closed by a timer once it has been idle for
//! `cached_connection_timeout`, and at most `max_persistent_per_key` are kept
//! per key. A key whose idle list empties is dropped from the map.

use crate::body::{self, BodyProducer, RequestBody};
use crate::config::PoolConfig;
use crate::endpoint::{ReplicationEndpoint, StreamEndpoint};
use crate::error::{AgentError, Result};
use crate::metrics;
use crate::response::Response;
use crate::uri::Uri;
use bytes::Bytes;
use dashmap::DashMap;
use futures::future::BoxFuture;
use http::header::{HeaderValue, CONNECTION, CONTENT_LENGTH, HOST};
use http::{HeaderMap, Method};
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::debug;

// ═══════════════════════════════════════════════════════════════════════════════
// PoolKey
// ═══════════════════════════════════════════════════════════════════════════════

/// Identifies a bucket of interchangeable connections.
///
/// For replication traffic this is `(scheme, "host:port")`: the path takes no
/// part, so `https://h:8448/a` and `https://h:8448/b` share connections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    scheme: Bytes,
    netloc: Bytes,
}

impl PoolKey {
    pub fn new(scheme: impl Into<Bytes>, netloc: impl Into<Bytes>) -> Self {
        Self {
            scheme: scheme.into(),
            netloc: netloc.into(),
        }
    }

    /// The replication key: scheme plus `host:port`, path ignored.
    pub fn for_netloc(uri: &Uri) -> Self {
        Self::new(uri.scheme().to_vec(), uri.netloc())
    }

    pub fn scheme(&self) -> &[u8] {
        &self.scheme
    }

    pub fn netloc(&self) -> &[u8] {
        &self.netloc
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}",
            String::from_utf8_lossy(&self.scheme),
            String::from_utf8_lossy(&self.netloc)
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ConnectionPool trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Owns live connections grouped by [`PoolKey`].
///
/// Implementations must serialize access to their key → connections mapping;
/// callers invoke these methods concurrently.
pub trait ConnectionPool: Send + Sync + 'static {
    /// A connection checked out of the pool.
    type Connection: Send;

    /// Run one request over a pooled or freshly created connection.
    ///
    /// `endpoint` is only used if no reusable connection exists for `key`.
    /// Connection and TLS failures are returned unchanged.
    fn execute_request(
        &self,
        key: PoolKey,
        endpoint: ReplicationEndpoint,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Option<Box<dyn BodyProducer>>,
    ) -> BoxFuture<'_, Result<Response>>;

    /// Check out an idle connection for `key`, or create one via `endpoint`.
    fn acquire_or_create(
        &self,
        key: &PoolKey,
        endpoint: ReplicationEndpoint,
    ) -> BoxFuture<'_, Result<Self::Connection>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// HttpConnectionPool
// ═══════════════════════════════════════════════════════════════════════════════

/// A connection handed out by [`HttpConnectionPool`].
pub struct PooledConnection {
    sender: SendRequest<RequestBody>,
    reused: bool,
}

impl PooledConnection {
    /// Whether this connection came from the idle list.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    /// Whether the connection can take a request right now.
    pub fn is_ready(&self) -> bool {
        self.sender.is_ready()
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("reused", &self.reused)
            .field("ready", &self.sender.is_ready())
            .finish()
    }
}

struct IdleConnection {
    id: u64,
    sender: SendRequest<RequestBody>,
    idle_since: Instant,
}

struct PoolInner {
    handle: Handle,
    persistent: bool,
    max_persistent_per_key: usize,
    cached_connection_timeout: Duration,
    idle: DashMap<PoolKey, Vec<IdleConnection>>,
    next_idle_id: AtomicU64,
    created: AtomicU64,
    reused: AtomicU64,
}

impl PoolInner {
    /// Close the parked connection `id` if it is still waiting under `key`.
    fn evict(&self, key: &PoolKey, id: u64) {
        let removed = match self.idle.get_mut(key) {
            Some(mut list) => {
                let before = list.len();
                list.retain(|idle| idle.id != id);
                before - list.len()
            }
            None => 0,
        };
        if removed > 0 {
            debug!(key = %key, "Closing connection idle past its timeout");
            metrics::record_idle_removed(removed);
        }
        self.prune(key);
    }

    /// Forget `key` once nothing is parked under it.
    fn prune(&self, key: &PoolKey) {
        self.idle.remove_if(key, |_, list| list.is_empty());
    }
}

/// HTTP/1.1 connection pool.
#[derive(Clone)]
pub struct HttpConnectionPool {
    inner: Arc<PoolInner>,
}

impl HttpConnectionPool {
    /// Create a pool that spawns its connection tasks on `handle`.
    pub fn new(handle: Handle, config: &PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                handle,
                persistent: config.persistent,
                max_persistent_per_key: config.max_persistent_per_key,
                cached_connection_timeout: config.cached_connection_timeout_duration(),
                idle: DashMap::new(),
                next_idle_id: AtomicU64::new(0),
                created: AtomicU64::new(0),
                reused: AtomicU64::new(0),
            }),
        }
    }

    /// A pool that never keeps connections between requests.
    pub fn non_persistent(handle: Handle) -> Self {
        Self::new(handle, &PoolConfig::non_persistent())
    }

    /// Whether connections are parked for reuse.
    pub fn is_persistent(&self) -> bool {
        self.inner.persistent
    }

    /// Idle connections currently parked under `key`.
    pub fn idle_count(&self, key: &PoolKey) -> usize {
        self.inner.idle.get(key).map_or(0, |list| list.len())
    }

    /// Idle connections across all keys.
    pub fn total_idle(&self) -> usize {
        self.inner.idle.iter().map(|list| list.len()).sum()
    }

    /// Keys with at least one parked connection.
    pub fn tracked_keys(&self) -> usize {
        self.inner.idle.len()
    }

    /// Connections opened so far.
    pub fn connections_created(&self) -> u64 {
        self.inner.created.load(Ordering::Relaxed)
    }

    /// Requests served over a reused connection so far.
    pub fn connections_reused(&self) -> u64 {
        self.inner.reused.load(Ordering::Relaxed)
    }

    /// Drop every idle connection (closing it).
    pub fn close_idle(&self) {
        let mut removed = 0;
        self.inner.idle.retain(|_, list| {
            removed += list.len();
            false
        });
        metrics::record_idle_removed(removed);
    }

    fn checkout(&self, key: &PoolKey) -> Option<SendRequest<RequestBody>> {
        let mut found = None;
        let mut removed = 0;
        if let Some(mut list) = self.inner.idle.get_mut(key) {
            while let Some(idle) = list.pop() {
                removed += 1;
                if idle.idle_since.elapsed() > self.inner.cached_connection_timeout {
                    debug!(key = %key, "Discarding expired idle connection");
                    continue;
                }
                if idle.sender.is_closed() || !idle.sender.is_ready() {
                    debug!(key = %key, "Discarding dead idle connection");
                    continue;
                }
                found = Some(idle.sender);
                break;
            }
        }
        self.inner.prune(key);
        metrics::record_idle_removed(removed);
        found
    }

    async fn connect(&self, key: &PoolKey, endpoint: ReplicationEndpoint) -> Result<SendRequest<RequestBody>> {
        let stream = endpoint.connect().await?;
        let (sender, connection) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| map_send_error(key, e))?;

        let driver_key = key.clone();
        self.inner.handle.spawn(async move {
            if let Err(e) = connection.await {
                debug!(key = %driver_key, error = %e, "Connection closed with error");
            }
        });

        Ok(sender)
    }

    /// Request building: origin-form target, caller headers, then the
    /// headers the pool is responsible for.
    fn build_request(
        &self,
        method: Method,
        uri: &Uri,
        mut headers: HeaderMap,
        body: Option<Box<dyn BodyProducer>>,
    ) -> Result<hyper::Request<RequestBody>> {
        let target = encode_request_target(&uri.origin_form());
        let target: http::Uri = target
            .parse()
            .map_err(|e| AgentError::InvalidUri(format!("Unusable request target {}: {}", target, e)))?;

        if !headers.contains_key(HOST) {
            let host = HeaderValue::from_str(&uri.host_header())
                .map_err(|e| AgentError::InvalidUri(format!("Unusable Host header: {}", e)))?;
            headers.insert(HOST, host);
        }
        if !self.inner.persistent && !headers.contains_key(CONNECTION) {
            headers.insert(CONNECTION, HeaderValue::from_static("close"));
        }

        let body = match body {
            Some(producer) => {
                if let Some(len) = producer.length() {
                    if !headers.contains_key(CONTENT_LENGTH) {
                        headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
                    }
                }
                let (body, driver) = body::stream(producer);
                self.inner.handle.spawn(driver);
                body
            }
            None => body::empty(),
        };

        let mut request = hyper::Request::new(body);
        *request.method_mut() = method;
        *request.uri_mut() = target;
        *request.headers_mut() = headers;
        Ok(request)
    }

    /// Park `sender` under `key` once its current exchange has finished.
    fn release(&self, key: PoolKey, mut sender: SendRequest<RequestBody>) {
        if !self.inner.persistent {
            return;
        }
        let inner = self.inner.clone();
        self.inner.handle.spawn(async move {
            // Resolves once the previous response body has been drained.
            if sender.ready().await.is_err() {
                debug!(key = %key, "Connection not reusable, dropping");
                return;
            }
            let id = inner.next_idle_id.fetch_add(1, Ordering::Relaxed);
            {
                let mut list = inner.idle.entry(key.clone()).or_default();
                if list.len() >= inner.max_persistent_per_key {
                    debug!(key = %key, "Idle limit reached, closing connection");
                    return;
                }
                list.push(IdleConnection {
                    id,
                    sender,
                    idle_since: Instant::now(),
                });
            }
            metrics::record_idle_parked();

            // The timer must not keep a dropped pool alive.
            let timeout = inner.cached_connection_timeout;
            let weak: Weak<PoolInner> = Arc::downgrade(&inner);
            drop(inner);
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                inner.evict(&key, id);
            }
        });
    }
}

impl ConnectionPool for HttpConnectionPool {
    type Connection = PooledConnection;

    fn execute_request(
        &self,
        key: PoolKey,
        endpoint: ReplicationEndpoint,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Option<Box<dyn BodyProducer>>,
    ) -> BoxFuture<'_, Result<Response>> {
        Box::pin(async move {
            let mut conn = self.acquire_or_create(&key, endpoint).await?;
            let request = self.build_request(method, &uri, headers, body)?;

            let response = conn.sender.send_request(request).await.map_err(|e| {
                debug!(key = %key, reused = conn.reused, error = %e, "Send failed");
                map_send_error(&key, e)
            })?;

            self.release(key, conn.sender);
            Ok(Response::from_hyper(response))
        })
    }

    fn acquire_or_create(
        &self,
        key: &PoolKey,
        endpoint: ReplicationEndpoint,
    ) -> BoxFuture<'_, Result<PooledConnection>> {
        let key = key.clone();
        Box::pin(async move {
            if let Some(sender) = self.checkout(&key) {
                self.inner.reused.fetch_add(1, Ordering::Relaxed);
                metrics::record_connection_acquired(key.scheme(), true);
                debug!(key = %key, "Reusing pooled connection");
                return Ok(PooledConnection { sender, reused: true });
            }

            let sender = self.connect(&key, endpoint).await?;
            self.inner.created.fetch_add(1, Ordering::Relaxed);
            metrics::record_connection_acquired(key.scheme(), false);
            debug!(key = %key, "Opened new connection");
            Ok(PooledConnection {
                sender,
                reused: false,
            })
        })
    }
}

impl fmt::Debug for HttpConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConnectionPool")
            .field("persistent", &self.inner.persistent)
            .field("max_persistent_per_key", &self.inner.max_persistent_per_key)
            .field("cached_connection_timeout", &self.inner.cached_connection_timeout)
            .field("idle", &self.total_idle())
            .finish()
    }
}

/// Classify a hyper failure: malformed responses are protocol errors, a
/// failing body producer is a body error, everything else is the connection.
fn map_send_error(key: &PoolKey, err: hyper::Error) -> AgentError {
    if err.is_parse() || err.is_parse_status() {
        return AgentError::Protocol(format!("Malformed response from {}: {}", key, err));
    }
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        if let Some(AgentError::Body(message)) = cause.downcast_ref::<AgentError>() {
            return AgentError::Body(message.clone());
        }
        source = cause.source();
    }
    AgentError::connection_msg(String::from_utf8_lossy(key.netloc()), err.to_string())
}

/// Percent-encode every byte that cannot appear in an HTTP request target.
///
/// The target has already been accepted without validation, so spaces and
/// raw non-ASCII bytes reach this point and must be escaped for the wire.
fn encode_request_target(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len());
    for &b in raw {
        let keep = b.is_ascii_alphanumeric()
            || matches!(
                b,
                b'-' | b'.' | b'_' | b'~' | b'!' | b'$' | b'&' | b'\'' | b'(' | b')' | b'*'
                    | b'+' | b',' | b';' | b'=' | b':' | b'@' | b'/' | b'?' | b'%'
            );
        if keep {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}
