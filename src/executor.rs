// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Pooled request execution.
//!
//! [`PooledRequestExecutor`] is the shared request path: parse the target,
//! resolve an endpoint, compute a pool key and hand everything to the pool.
//! It is parameterized by two policies:
//!
//! | Parameter | Replication agent | General-purpose agent |
//! |-----------|-------------------|-----------------------|
//! | key fn | [`PoolKey::for_netloc`] | any `fn(&Uri) -> PoolKey` |
//! | strictness | [`UriStrictness::Lenient`] | [`UriStrictness::Strict`] |

use crate::body::BodyProducer;
use crate::endpoint::EndpointResolver;
use crate::error::{AgentError, Result};
use crate::metrics;
use crate::pool::{ConnectionPool, PoolKey};
use crate::response::Response;
use crate::uri::{self, Uri};
use http::{HeaderMap, Method};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Computes the pool key for a parsed target.
pub type KeyFn = fn(&Uri) -> PoolKey;

/// Whether targets are validated before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriStrictness {
    /// Reject any target containing bytes outside printable ASCII.
    Strict,
    /// Accept whatever [`Uri::from_bytes`] can split apart.
    Lenient,
}

/// Runs requests through a [`ConnectionPool`].
pub struct PooledRequestExecutor<P: ConnectionPool> {
    pool: Arc<P>,
    key_fn: KeyFn,
    strictness: UriStrictness,
}

impl<P: ConnectionPool> PooledRequestExecutor<P> {
    pub fn new(pool: Arc<P>, key_fn: KeyFn, strictness: UriStrictness) -> Self {
        Self {
            pool,
            key_fn,
            strictness,
        }
    }

    pub fn pool(&self) -> &Arc<P> {
        &self.pool
    }

    pub fn strictness(&self) -> UriStrictness {
        self.strictness
    }

    /// Issue one request.
    ///
    /// Validation, parsing and endpoint resolution happen before any I/O;
    /// a failure at any of those steps never reaches the pool. Pool errors
    /// are returned unchanged.
    pub async fn execute(
        &self,
        resolver: &EndpointResolver,
        method: &[u8],
        target: &[u8],
        headers: Option<HeaderMap>,
        body: Option<Box<dyn BodyProducer>>,
    ) -> Result<Response> {
        let start = Instant::now();
        let (scheme, result) = self.dispatch(resolver, method, target, headers, body).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        metrics::record_request(&scheme, outcome, start.elapsed());
        if let Err(e) = &result {
            warn!(
                scheme = %String::from_utf8_lossy(&scheme),
                error = %e,
                retryable = e.is_retryable(),
                "Request failed"
            );
        }
        result
    }

    async fn dispatch(
        &self,
        resolver: &EndpointResolver,
        method: &[u8],
        target: &[u8],
        headers: Option<HeaderMap>,
        body: Option<Box<dyn BodyProducer>>,
    ) -> (Vec<u8>, Result<Response>) {
        if self.strictness == UriStrictness::Strict && !uri::is_strictly_valid(target) {
            return (
                b"unknown".to_vec(),
                Err(AgentError::InvalidUri(format!(
                    "Invalid URI {:?}",
                    String::from_utf8_lossy(target)
                ))),
            );
        }

        let parsed = match Uri::from_bytes(target) {
            Ok(parsed) => parsed,
            Err(e) => return (b"unknown".to_vec(), Err(e)),
        };
        let scheme = parsed.scheme().to_vec();

        // Scheme rejection comes first, whatever the method bytes are.
        let endpoint = match resolver.resolve(&parsed) {
            Ok(endpoint) => endpoint,
            Err(e) => return (scheme, Err(e)),
        };

        let method = match Method::from_bytes(method) {
            Ok(method) => method,
            Err(_) => {
                let err = AgentError::InvalidMethod(String::from_utf8_lossy(method).into_owned());
                return (scheme, Err(err));
            }
        };
        let key = (self.key_fn)(&parsed);

        debug!(method = %method, key = %key, tls = endpoint.is_tls(), "Dispatching request");
        let result = self
            .pool
            .execute_request(key, endpoint, method, parsed, headers.unwrap_or_default(), body)
            .await;
        (scheme, result)
    }
}
