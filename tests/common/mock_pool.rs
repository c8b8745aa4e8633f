//! Recording pool and TLS policy doubles.
//!
//! `RecordingPool` captures everything the agent hands to the pool so tests
//! can assert on keys, endpoint shape and request parts without any I/O.

use futures::future::BoxFuture;
use http::{HeaderMap, Method, StatusCode};
use replication_agent::{
    AgentError, BodyProducer, BoxedStream, ConnectionPool, PoolKey, ReplicationEndpoint, Response, Result,
    TlsConnect, TlsPolicy, Uri,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A recorded execute_request() call.
#[derive(Debug, Clone)]
pub struct ExecuteCall {
    pub key: PoolKey,
    pub tls: bool,
    pub host: String,
    pub port: u16,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body_length: Option<Option<u64>>,
}

/// Pool that records calls and answers with a canned response.
///
/// # Example
/// ```rust,ignore
/// let pool = Arc::new(RecordingPool::new());
/// let agent = ReplicationAgent::with_pool(policy, None, None, pool.clone());
/// agent.request(b"GET", b"http://peer:8008/", None, None).await?;
/// assert_eq!(pool.calls().len(), 1);
/// ```
pub struct RecordingPool {
    calls: Mutex<Vec<ExecuteCall>>,
    status: StatusCode,
    failure: Option<fn() -> AgentError>,
}

impl RecordingPool {
    /// Answer every request with 200 OK.
    pub fn new() -> Self {
        Self::with_status(StatusCode::OK)
    }

    pub fn with_status(status: StatusCode) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            status,
            failure: None,
        }
    }

    /// Fail every request with the error `make` builds.
    pub fn failing(make: fn() -> AgentError) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            status: StatusCode::OK,
            failure: Some(make),
        }
    }

    pub fn calls(&self) -> Vec<ExecuteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for RecordingPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionPool for RecordingPool {
    type Connection = ReplicationEndpoint;

    fn execute_request(
        &self,
        key: PoolKey,
        endpoint: ReplicationEndpoint,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Option<Box<dyn BodyProducer>>,
    ) -> BoxFuture<'_, Result<Response>> {
        self.calls.lock().unwrap().push(ExecuteCall {
            key,
            tls: endpoint.is_tls(),
            host: endpoint.tcp().host().to_string(),
            port: endpoint.tcp().port(),
            method,
            uri,
            headers,
            body_length: body.as_ref().map(|b| b.length()),
        });
        let result = match self.failure {
            Some(make) => Err(make()),
            None => Ok(Response::from_bytes(self.status, "")),
        };
        Box::pin(async move { result })
    }

    fn acquire_or_create(
        &self,
        _key: &PoolKey,
        endpoint: ReplicationEndpoint,
    ) -> BoxFuture<'_, Result<ReplicationEndpoint>> {
        Box::pin(async move { Ok(endpoint) })
    }
}

// =============================================================================
// TLS policies
// =============================================================================

/// Connector that leaves the stream as-is.
pub struct PassthroughTls;

impl TlsConnect for PassthroughTls {
    fn connect(&self, stream: BoxedStream) -> BoxFuture<'static, Result<BoxedStream>> {
        Box::pin(async move { Ok(stream) })
    }
}

/// Policy that records every `(host, port)` it is asked about.
#[derive(Default)]
pub struct MockTlsPolicy {
    lookups: Mutex<Vec<(String, u16)>>,
}

impl MockTlsPolicy {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lookups(&self) -> Vec<(String, u16)> {
        self.lookups.lock().unwrap().clone()
    }
}

impl TlsPolicy for MockTlsPolicy {
    fn context_for(&self, host: &str, port: u16) -> Result<Arc<dyn TlsConnect>> {
        self.lookups.lock().unwrap().push((host.to_string(), port));
        Ok(Arc::new(PassthroughTls))
    }
}

/// Policy with no trust configuration for anyone.
#[derive(Default)]
pub struct FailingTlsPolicy {
    calls: AtomicUsize,
}

impl FailingTlsPolicy {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TlsPolicy for FailingTlsPolicy {
    fn context_for(&self, host: &str, port: u16) -> Result<Arc<dyn TlsConnect>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AgentError::tls(format!("{host}:{port}"), "no TLS context configured"))
    }
}
