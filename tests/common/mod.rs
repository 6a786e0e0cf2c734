//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::time::Duration;

use lease_lock::LeaseOptions;

/// Redis URL from `REDIS_URL`, defaulting to a local server.
pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

/// Sentinel URL from `REDIS_SENTINEL_URL`, defaulting to a local sentinel.
pub fn sentinel_url() -> String {
    std::env::var("REDIS_SENTINEL_URL")
        .unwrap_or_else(|_| "redis+sentinel://localhost:26379/mymaster".to_string())
}

/// Key unique to this process and test, so reruns never collide.
pub fn unique_key(prefix: &str) -> String {
    format!("{prefix}:{}", lease_lock::token::create_holder_token())
}

/// Short options for tests: 5s TTL, 3 attempts 100ms apart.
pub fn quick_options() -> LeaseOptions {
    LeaseOptions::new()
        .ttl(Duration::from_secs(5))
        .max_attempts(3)
        .retry_interval(Duration::from_millis(100))
}
