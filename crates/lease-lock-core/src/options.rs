//! Lease timing and retry options.

use std::time::Duration;

use tracing::warn;

/// Environment variable holding the lease TTL in seconds.
pub const ENV_LOCK_EXPIRY: &str = "REDIS_LOCK_EXPIRY";
/// Environment variable holding the maximum number of acquire attempts.
pub const ENV_LOCK_MAX_RETRY: &str = "REDIS_LOCK_MAX_RETRY";
/// Environment variable holding the delay between attempts in milliseconds.
pub const ENV_LOCK_RETRY_DELAY: &str = "REDIS_LOCK_RETRY_DELAY";

const DEFAULT_EXPIRY_SECS: u64 = 5;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_DELAY_MILLIS: u64 = 200;

/// Fixed-interval retry bound for lease acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    interval: Duration,
}

impl RetryPolicy {
    /// Creates a policy. `max_attempts` counts the first attempt and is
    /// clamped to at least one.
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    /// A single attempt with no waiting.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Total number of attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay between two consecutive attempts.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns `true` if another attempt is allowed after `attempts_made`.
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            Duration::from_millis(DEFAULT_RETRY_DELAY_MILLIS),
        )
    }
}

/// Options applied to every lease built from them.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use lease_lock_core::options::LeaseOptions;
///
/// let options = LeaseOptions::new()
///     .ttl(Duration::from_secs(10))
///     .max_attempts(3)
///     .retry_interval(Duration::from_millis(50));
/// assert_eq!(options.retry().max_attempts(), 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseOptions {
    ttl: Duration,
    retry: RetryPolicy,
}

impl LeaseOptions {
    /// Creates options with the default TTL (5s), 5 attempts and a 200ms
    /// retry interval.
    pub fn new() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_EXPIRY_SECS),
            retry: RetryPolicy::default(),
        }
    }

    /// Reads options from `REDIS_LOCK_EXPIRY`, `REDIS_LOCK_MAX_RETRY` and
    /// `REDIS_LOCK_RETRY_DELAY`, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads options through `lookup`, which maps a variable name to its
    /// value. Unparseable values are logged and replaced by the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let expiry_secs = parse_or(&lookup, ENV_LOCK_EXPIRY, DEFAULT_EXPIRY_SECS);
        let max_attempts = parse_or(&lookup, ENV_LOCK_MAX_RETRY, DEFAULT_MAX_ATTEMPTS);
        let delay_millis = parse_or(&lookup, ENV_LOCK_RETRY_DELAY, DEFAULT_RETRY_DELAY_MILLIS);

        Self {
            ttl: Duration::from_secs(expiry_secs),
            retry: RetryPolicy::new(max_attempts, Duration::from_millis(delay_millis)),
        }
    }

    /// Sets the lease time-to-live.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the total number of acquire attempts.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry = RetryPolicy::new(max_attempts, self.retry.interval());
        self
    }

    /// Sets the delay between acquire attempts.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry = RetryPolicy::new(self.retry.max_attempts(), interval);
        self
    }

    /// Replaces the whole retry policy.
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Lease time-to-live.
    pub fn lease_ttl(&self) -> Duration {
        self.ttl
    }

    /// Retry policy used by `acquire`.
    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }
}

impl Default for LeaseOptions {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match lookup(name) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(variable = name, value = %raw, default = %default, "ignoring unparseable lock option");
                default
            }
        },
    }
}
