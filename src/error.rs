// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the replication agent.
//!
//! Every failure on the request path is surfaced to the caller unchanged.
//! The agent performs no local recovery and never retries; the
//! classification below exists so that a higher layer can decide.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `UnsupportedScheme` | No | Scheme is not `http` or `https` |
//! | `InvalidUri` | No | Target could not be split into scheme/host/port/path |
//! | `InvalidMethod` | No | Method bytes are not a valid HTTP token |
//! | `Connection` | Yes | DNS failure, refused or reset TCP connection |
//! | `ConnectTimeout` | Yes | Peer did not accept the connection in time |
//! | `Tls` | No | TLS policy lookup or handshake failure |
//! | `Protocol` | No | Malformed response from the peer |
//! | `Body` | No | The request body producer failed |
//! | `Config` | No | Configuration invalid |

use std::time::Duration;
use thiserror::Error;

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors that can occur while issuing a replication request.
#[derive(Error, Debug)]
pub enum AgentError {
    /// The target URI uses a scheme other than `http` or `https`.
    ///
    /// Raised before any endpoint is built or any I/O is attempted.
    #[error("Unsupported scheme: {}", String::from_utf8_lossy(.scheme))]
    UnsupportedScheme { scheme: Vec<u8> },

    /// The target URI could not be parsed.
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// The request method is not a valid HTTP token.
    #[error("Invalid method: {0}")]
    InvalidMethod(String),

    /// Connection establishment failed (DNS, TCP connect, reset).
    #[error("Connection error ({target}): {message}")]
    Connection {
        target: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The peer did not accept the connection within the connect timeout.
    #[error("Connection to {target} timed out after {}ms", .timeout.as_millis())]
    ConnectTimeout { target: String, timeout: Duration },

    /// TLS context lookup or handshake failure.
    #[error("TLS error ({target}): {message}")]
    Tls { target: String, message: String },

    /// The peer sent something that is not a valid HTTP response.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The request body producer failed while streaming.
    #[error("Body producer error: {0}")]
    Body(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AgentError {
    /// Create an unsupported-scheme error for the given raw scheme.
    pub fn unsupported_scheme(scheme: impl Into<Vec<u8>>) -> Self {
        Self::UnsupportedScheme {
            scheme: scheme.into(),
        }
    }

    /// Create a connection error from an I/O error.
    pub fn connection(target: impl Into<String>, source: std::io::Error) -> Self {
        Self::Connection {
            target: target.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a connection error without source
    pub fn connection_msg(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            target: target.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a TLS error.
    pub fn tls(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tls {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Check if this error is retryable by a higher layer.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::ConnectTimeout { .. } => true,
            Self::UnsupportedScheme { .. } => false,
            Self::InvalidUri(_) => false,
            Self::InvalidMethod(_) => false,
            Self::Tls { .. } => false, // Certificate problems don't fix themselves
            Self::Protocol(_) => false,
            Self::Body(_) => false,
            Self::Config(_) => false,
        }
    }

    /// Short label used for the error metric.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedScheme { .. } => "unsupported_scheme",
            Self::InvalidUri(_) => "invalid_uri",
            Self::InvalidMethod(_) => "invalid_method",
            Self::Connection { .. } => "connection",
            Self::ConnectTimeout { .. } => "connect_timeout",
            Self::Tls { .. } => "tls",
            Self::Protocol(_) => "protocol",
            Self::Body(_) => "body",
            Self::Config(_) => "config",
        }
    }
}
