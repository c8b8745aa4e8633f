//! Fuzz target for request-target parsing.
//!
//! Parsing must never panic, and anything that parses must produce a
//! consistent key and origin-form.

#![no_main]

use libfuzzer_sys::fuzz_target;
use replication_agent::uri::is_strictly_valid;
use replication_agent::{PoolKey, Uri};

fuzz_target!(|data: &[u8]| {
    let _ = is_strictly_valid(data);

    if let Ok(uri) = Uri::from_bytes(data) {
        assert!(!uri.scheme().is_empty());
        assert!(uri.port() > 0);

        let origin = uri.origin_form();
        assert!(origin.starts_with(b"/"));

        // Path never leaks into the key
        let key = PoolKey::for_netloc(&uri);
        assert_eq!(key.netloc(), uri.netloc().as_bytes());
        let _ = uri.host_header();
        let _ = uri.to_string();
    }
});
