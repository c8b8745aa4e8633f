// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Lenient request-target parsing.
//!
//! Replication targets are absolute URIs (`scheme://host:port/path`), but the
//! path component is not guaranteed to be RFC 3986 clean: sibling processes
//! listening on filesystem sockets produce paths with spaces and other bytes a
//! general-purpose client would refuse. [`Uri::from_bytes`] therefore extracts
//! scheme, host, port and origin-form without validating anything else.
//!
//! # Layout
//!
//! ```text
//!   https://user@peer.example:8448/_repl/stream;v=2?since=42#frag
//!   └─┬─┘   └─┬┘ └─────┬──────┘└┬─┘└─────┬────┘ └┬┘ └───┬──┘ └─┬┘
//!   scheme  userinfo  host    port   path   params query   fragment
//!           (dropped)
//! ```
//!
//! Strict validation (the check a general-purpose agent performs before
//! dispatch) lives in [`is_strictly_valid`] and is only applied when a
//! [`PooledRequestExecutor`](crate::executor::PooledRequestExecutor) is
//! configured for it.

use crate::error::{AgentError, Result};
use std::fmt;

/// Default port for `https`.
pub const HTTPS_DEFAULT_PORT: u16 = 443;

/// Default port for `http` and every other scheme.
pub const HTTP_DEFAULT_PORT: u16 = 80;

/// A parsed request target.
///
/// Immutable once parsed; build a fresh one per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    scheme: Vec<u8>,
    host: String,
    port: u16,
    path: Vec<u8>,
    params: Vec<u8>,
    query: Vec<u8>,
    fragment: Vec<u8>,
}

impl Uri {
    /// Parse a raw absolute URI.
    ///
    /// Leading and trailing ASCII whitespace is ignored. The scheme is
    /// lowercased. When no port is given the scheme's default is used
    /// (443 for `https`, 80 otherwise).
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidUri`] when the target has no `://`
    /// separator, an empty or malformed scheme, or a port that is not a
    /// positive 16-bit integer. An empty host parses; whether it is usable
    /// depends on the scheme. Nothing about the path is checked.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let raw = raw.trim_ascii();

        let sep = find(raw, b"://").ok_or_else(|| invalid(raw, "missing scheme separator"))?;
        let scheme = &raw[..sep];
        if scheme.is_empty() {
            return Err(invalid(raw, "empty scheme"));
        }
        if !scheme[0].is_ascii_alphabetic()
            || !scheme
                .iter()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.'))
        {
            return Err(invalid(raw, "malformed scheme"));
        }
        let scheme = scheme.to_ascii_lowercase();

        let rest = &raw[sep + 3..];
        let netloc_end = rest
            .iter()
            .position(|b| matches!(b, b'/' | b'?' | b'#'))
            .unwrap_or(rest.len());
        let netloc = &rest[..netloc_end];
        let mut tail = &rest[netloc_end..];

        let (host, port) = split_netloc(raw, netloc, default_port(&scheme))?;

        let mut fragment = Vec::new();
        if let Some(pos) = tail.iter().position(|&b| b == b'#') {
            fragment = tail[pos + 1..].to_vec();
            tail = &tail[..pos];
        }

        let mut query = Vec::new();
        if let Some(pos) = tail.iter().position(|&b| b == b'?') {
            query = tail[pos + 1..].to_vec();
            tail = &tail[..pos];
        }

        // Params only ever attach to the last path segment.
        let last_segment = tail.iter().rposition(|&b| b == b'/').map_or(0, |p| p + 1);
        let mut params = Vec::new();
        if let Some(pos) = tail[last_segment..].iter().position(|&b| b == b';') {
            let pos = last_segment + pos;
            params = tail[pos + 1..].to_vec();
            tail = &tail[..pos];
        }

        Ok(Self {
            scheme,
            host,
            port,
            path: tail.to_vec(),
            params,
            query,
            fragment,
        })
    }

    /// Lowercased scheme bytes (e.g. `b"https"`).
    pub fn scheme(&self) -> &[u8] {
        &self.scheme
    }

    /// Host without IPv6 brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Explicit port, or the scheme default.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Raw path bytes (may be empty).
    pub fn path(&self) -> &[u8] {
        &self.path
    }

    /// Raw query bytes without the leading `?`.
    pub fn query(&self) -> &[u8] {
        &self.query
    }

    /// Raw fragment bytes without the leading `#`. Never sent on the wire.
    pub fn fragment(&self) -> &[u8] {
        &self.fragment
    }

    /// `host:port`, with IPv6 hosts re-bracketed.
    ///
    /// This is the connection-level identity of the target and the second
    /// half of the replication pool key.
    pub fn netloc(&self) -> String {
        format!("{}:{}", self.bracketed_host(), self.port)
    }

    /// Value for the `Host` request header.
    ///
    /// Omits the port when it is the scheme's default.
    pub fn host_header(&self) -> String {
        if self.port == default_port(&self.scheme) {
            self.bracketed_host()
        } else {
            self.netloc()
        }
    }

    /// The path-and-query form used on the HTTP request line.
    ///
    /// An empty path becomes `/`. Params and query are kept, the fragment is
    /// dropped.
    pub fn origin_form(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.path.len() + self.params.len() + self.query.len() + 2);
        if self.path.is_empty() {
            out.push(b'/');
        } else {
            out.extend_from_slice(&self.path);
        }
        if !self.params.is_empty() {
            out.push(b';');
            out.extend_from_slice(&self.params);
        }
        if !self.query.is_empty() {
            out.push(b'?');
            out.extend_from_slice(&self.query);
        }
        out
    }

    fn bracketed_host(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}{}",
            String::from_utf8_lossy(&self.scheme),
            self.netloc(),
            String::from_utf8_lossy(&self.origin_form())
        )
    }
}

/// Default port for a (lowercased) scheme.
pub fn default_port(scheme: &[u8]) -> u16 {
    if scheme == b"https" {
        HTTPS_DEFAULT_PORT
    } else {
        HTTP_DEFAULT_PORT
    }
}

/// The check a general-purpose agent applies before dispatching: every byte
/// must be visible ASCII (`0x21..=0x7e`).
///
/// Replication targets routinely fail this (spaces in socket paths), which
/// is why the replication agent never calls it.
pub fn is_strictly_valid(raw: &[u8]) -> bool {
    !raw.is_empty() && raw.iter().all(|b| (0x21..=0x7e).contains(b))
}

fn split_netloc(raw: &[u8], netloc: &[u8], default: u16) -> Result<(String, u16)> {
    // Userinfo never takes part in routing.
    let host_port = match netloc.iter().rposition(|&b| b == b'@') {
        Some(at) => &netloc[at + 1..],
        None => netloc,
    };

    let (host, port) = if host_port.first() == Some(&b'[') {
        let close = host_port
            .iter()
            .position(|&b| b == b']')
            .ok_or_else(|| invalid(raw, "unclosed IPv6 bracket"))?;
        let after = &host_port[close + 1..];
        let port = match after {
            [] => None,
            [b':', digits @ ..] => Some(digits),
            _ => return Err(invalid(raw, "unexpected bytes after IPv6 bracket")),
        };
        (&host_port[1..close], port)
    } else {
        match host_port.iter().rposition(|&b| b == b':') {
            Some(colon) => (&host_port[..colon], Some(&host_port[colon + 1..])),
            None => (host_port, None),
        }
    };

    let host = std::str::from_utf8(host)
        .map_err(|_| invalid(raw, "host is not valid UTF-8"))?
        .to_string();

    let port = match port {
        None => default,
        Some(digits) => parse_port(digits).ok_or_else(|| invalid(raw, "port is not a positive integer"))?,
    };

    Ok((host, port))
}

fn parse_port(digits: &[u8]) -> Option<u16> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits)
        .ok()?
        .parse::<u16>()
        .ok()
        .filter(|&p| p > 0)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn invalid(raw: &[u8], reason: &str) -> AgentError {
    AgentError::InvalidUri(format!("{} ({:?})", reason, String::from_utf8_lossy(raw)))
}
