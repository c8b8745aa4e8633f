//! Shared test utilities for integration, property and chaos tests.
//!
//! This module provides:
//! - A recording `ConnectionPool` that never touches the network
//! - TLS policies that record lookups or fail on demand
//! - An in-process HTTP/1.1 peer (plain or TLS) on a loopback listener

#![allow(dead_code)]

pub mod mock_pool;
pub mod peer;

pub use mock_pool::*;
pub use peer::*;

/// Install a tracing subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
