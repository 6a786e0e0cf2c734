//! Pool sizing and dial timeouts.

use std::time::Duration;

/// `max_active` of zero means "no limit"; the pool still needs a finite
/// slot count, so it is capped here.
pub(crate) const UNBOUNDED_ACTIVE_LIMIT: usize = 4096;

/// Pool sizing and dial timeouts.
///
/// Defaults: no idle connections kept, one active connection, 60s idle
/// timeout and 1s for each dial timeout.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use lease_lock_redis::PoolConfig;
///
/// let config = PoolConfig::new()
///     .max_idle(4)
///     .max_active(16)
///     .idle_timeout(Duration::from_secs(120));
/// assert_eq!(config.max_active, 16);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Idle connections kept for reuse; extra connections are closed on return.
    pub max_idle: usize,
    /// Connections that may exist at once; 0 means unbounded.
    pub max_active: usize,
    /// Idle connections older than this are closed at borrow. Zero disables.
    pub idle_timeout: Duration,
    /// TCP connect timeout. Zero disables.
    pub dial_connect_timeout: Duration,
    /// Reply timeout for each command. Zero disables.
    pub dial_read_timeout: Duration,
    /// Send timeout for each command. Zero disables.
    pub dial_write_timeout: Duration,
}

impl PoolConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            max_idle: 0,
            max_active: 1,
            idle_timeout: Duration::from_secs(60),
            dial_connect_timeout: Duration::from_secs(1),
            dial_read_timeout: Duration::from_secs(1),
            dial_write_timeout: Duration::from_secs(1),
        }
    }

    /// Sets the number of idle connections kept for reuse.
    pub fn max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    /// Sets the active connection ceiling (0 = unbounded).
    pub fn max_active(mut self, max_active: usize) -> Self {
        self.max_active = max_active;
        self
    }

    /// Sets the idle timeout.
    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Sets the connect, read and write timeouts at once.
    pub fn dial_timeouts(mut self, connect: Duration, read: Duration, write: Duration) -> Self {
        self.dial_connect_timeout = connect;
        self.dial_read_timeout = read;
        self.dial_write_timeout = write;
        self
    }

    /// Slot count handed to the pool.
    pub(crate) fn pool_size(&self) -> usize {
        match self.max_active {
            0 => UNBOUNDED_ACTIVE_LIMIT,
            n => n,
        }
    }

    /// Bound on one command round trip: write plus read timeout, or none if
    /// either is disabled.
    pub(crate) fn command_timeout(&self) -> Option<Duration> {
        if self.dial_read_timeout.is_zero() || self.dial_write_timeout.is_zero() {
            None
        } else {
            Some(self.dial_read_timeout + self.dial_write_timeout)
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_idle, 0);
        assert_eq!(config.max_active, 1);
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert_eq!(config.dial_connect_timeout, Duration::from_secs(1));
        assert_eq!(config.command_timeout(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_unbounded_active() {
        assert_eq!(PoolConfig::new().max_active(0).pool_size(), UNBOUNDED_ACTIVE_LIMIT);
        assert_eq!(PoolConfig::new().max_active(8).pool_size(), 8);
    }

    #[test]
    fn test_zero_timeout_disables_command_timeout() {
        let config = PoolConfig::new().dial_timeouts(
            Duration::from_secs(1),
            Duration::ZERO,
            Duration::from_secs(1),
        );
        assert_eq!(config.command_timeout(), None);
    }
}
