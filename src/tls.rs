// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! TLS policy seam.
//!
//! The agent never decides how peers are verified. It asks a [`TlsPolicy`]
//! for a connector per request, passing the exact `(host, port)` it is about
//! to dial, and runs the returned [`TlsConnect`] over a freshly opened TCP
//! stream. Nothing is cached here.
//!
//! [`RustlsPolicy`] is the stock policy: one shared `rustls::ClientConfig`,
//! with the SNI name derived from the host.

use crate::endpoint::BoxedStream;
use crate::error::{AgentError, Result};
use futures::future::BoxFuture;
use rustls::pki_types::ServerName;
use std::sync::Arc;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// A TLS "context": negotiates TLS over an established byte stream.
pub trait TlsConnect: Send + Sync {
    /// Run the client handshake over `stream`.
    fn connect(&self, stream: BoxedStream) -> BoxFuture<'static, Result<BoxedStream>>;
}

/// Supplies a TLS connector appropriate for a given peer.
///
/// Called once per `https` request; implementations may fail (for example
/// when no trust configuration exists for the peer), in which case the
/// request fails with that error and no connection is attempted.
pub trait TlsPolicy: Send + Sync + 'static {
    /// Produce the connector for `(host, port)`.
    fn context_for(&self, host: &str, port: u16) -> Result<Arc<dyn TlsConnect>>;
}

/// Policy backed by a single `rustls` client configuration.
#[derive(Clone)]
pub struct RustlsPolicy {
    config: Arc<rustls::ClientConfig>,
}

impl RustlsPolicy {
    /// Wrap an existing client configuration.
    pub fn new(config: Arc<rustls::ClientConfig>) -> Self {
        Self { config }
    }

    /// Trust exactly the given root certificates.
    ///
    /// Convenient for replication meshes that run their own CA.
    pub fn with_roots(roots: rustls::RootCertStore) -> Self {
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Self::new(Arc::new(config))
    }
}

impl TlsPolicy for RustlsPolicy {
    fn context_for(&self, host: &str, port: u16) -> Result<Arc<dyn TlsConnect>> {
        let server_name = ServerName::try_from(host.to_string()).map_err(|e| {
            AgentError::tls(format!("{}:{}", host, port), format!("Invalid server name: {}", e))
        })?;
        debug!(host, port, "Built TLS context for peer");
        Ok(Arc::new(RustlsConnect {
            connector: TlsConnector::from(self.config.clone()),
            server_name,
            target: format!("{}:{}", host, port),
        }))
    }
}

/// Connector produced by [`RustlsPolicy`].
struct RustlsConnect {
    connector: TlsConnector,
    server_name: ServerName<'static>,
    target: String,
}

impl TlsConnect for RustlsConnect {
    fn connect(&self, stream: BoxedStream) -> BoxFuture<'static, Result<BoxedStream>> {
        let connector = self.connector.clone();
        let server_name = self.server_name.clone();
        let target = self.target.clone();
        Box::pin(async move {
            let tls = connector
                .connect(server_name, stream)
                .await
                .map_err(|e| AgentError::tls(target, format!("Handshake failed: {}", e)))?;
            Ok(Box::new(tls) as BoxedStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_policy() -> RustlsPolicy {
        RustlsPolicy::with_roots(rustls::RootCertStore::empty())
    }

    #[test]
    fn test_context_for_dns_name() {
        let policy = empty_policy();
        assert!(policy.context_for("peer.example", 8448).is_ok());
    }

    #[test]
    fn test_context_for_ip_address() {
        let policy = empty_policy();
        assert!(policy.context_for("10.0.0.5", 8448).is_ok());
        assert!(policy.context_for("::1", 8448).is_ok());
    }

    #[test]
    fn test_context_for_invalid_name() {
        let policy = empty_policy();
        let result = policy.context_for("not a hostname!", 8448);
        match result {
            Err(AgentError::Tls { target, message }) => {
                assert_eq!(target, "not a hostname!:8448");
                assert!(message.contains("Invalid server name"));
            }
            Err(other) => panic!("Expected Tls error, got {other:?}"),
            Ok(_) => panic!("Expected Tls error, got a connector"),
        }
    }
}
