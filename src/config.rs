//! Configuration for the replication agent.
//!
//! Configuration is passed to
//! [`ReplicationAgent::from_config()`](crate::ReplicationAgent::from_config)
//! and can be constructed programmatically or deserialized from YAML/JSON.
//!
//! # Quick Start
//!
//! ```rust
//! use replication_agent::config::{AgentConfig, PoolConfig};
//!
//! let config = AgentConfig {
//!     connect_timeout: Some("5s".into()),
//!     pool: PoolConfig::default(),
//!     ..Default::default()
//! };
//! assert_eq!(config.connect_timeout_duration(), Some(std::time::Duration::from_secs(5)));
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! AgentConfig
//! ├── connect_timeout: Option<String>   # "10s", bounds connection establishment
//! ├── bind_address: Option<String>      # local "ip:port" for outgoing sockets
//! └── pool: PoolConfig
//!     ├── persistent: bool              # keep connections between requests
//!     ├── max_persistent_per_key: usize # idle connections kept per (scheme, host:port)
//!     └── cached_connection_timeout     # "240s", idle connection lifetime
//! ```
//!
//! # YAML Example
//!
//! ```yaml
//! connect_timeout: "10s"
//! bind_address: "10.0.0.2:0"
//! pool:
//!   persistent: true
//!   max_persistent_per_key: 4
//!   cached_connection_timeout: "2m"
//! ```

use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// AgentConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Top-level agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Connect timeout as a duration string (e.g., "10s").
    /// `None` leaves establishment unbounded.
    #[serde(default)]
    pub connect_timeout: Option<String>,

    /// Local address to bind outgoing sockets to (e.g., "10.0.0.2:0").
    #[serde(default)]
    pub bind_address: Option<String>,

    /// Connection pool settings used by `from_config`.
    #[serde(default)]
    pub pool: PoolConfig,
}

impl AgentConfig {
    /// Parse the connect timeout. Unparseable strings fall back to 10 seconds.
    pub fn connect_timeout_duration(&self) -> Option<Duration> {
        self.connect_timeout
            .as_deref()
            .map(|s| humantime::parse_duration(s).unwrap_or(Duration::from_secs(10)))
    }

    /// Parse the bind address.
    ///
    /// Unlike durations there is no sensible fallback for a bad address, so
    /// this is a hard error.
    pub fn bind_address_parsed(&self) -> Result<Option<SocketAddr>> {
        self.bind_address
            .as_deref()
            .map(|s| {
                s.parse::<SocketAddr>()
                    .map_err(|e| AgentError::Config(format!("Invalid bind_address {:?}: {}", s, e)))
            })
            .transpose()
    }

    /// Create a config for tests: short timeout, persistent pool.
    pub fn for_testing() -> Self {
        Self {
            connect_timeout: Some("2s".to_string()),
            bind_address: None,
            pool: PoolConfig::default(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PoolConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Connection pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Keep connections open for reuse between requests.
    #[serde(default = "default_true")]
    pub persistent: bool,

    /// Maximum idle connections kept per pool key.
    #[serde(default = "default_max_persistent_per_key")]
    pub max_persistent_per_key: usize,

    /// How long an idle connection stays usable, as a duration string.
    #[serde(default = "default_cached_connection_timeout")]
    pub cached_connection_timeout: String,
}

fn default_true() -> bool {
    true
}

fn default_max_persistent_per_key() -> usize {
    2
}

fn default_cached_connection_timeout() -> String {
    "240s".to_string()
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            persistent: true,
            max_persistent_per_key: 2,
            cached_connection_timeout: "240s".to_string(),
        }
    }
}

impl PoolConfig {
    /// One connection per request, closed afterwards.
    pub fn non_persistent() -> Self {
        Self {
            persistent: false,
            ..Default::default()
        }
    }

    /// Parse the idle lifetime, falling back to 240 seconds.
    pub fn cached_connection_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.cached_connection_timeout).unwrap_or(Duration::from_secs(240))
    }
}
