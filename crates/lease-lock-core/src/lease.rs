//! Lease-based distributed lock.

use tracing::field::Empty;
use tracing::{Span, debug, instrument};

use crate::error::{LockError, LockResult};
use crate::options::LeaseOptions;
use crate::traits::LockConnection;

/// Lifecycle of a single [`Lease`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    /// Constructed, not yet acquired.
    Idle,
    /// Acquire succeeded; the key holds our token.
    Held,
    /// Release deleted our key.
    Released,
    /// Release found the key gone or taken over after the TTL elapsed.
    Expired,
}

/// A time-bounded exclusive hold on `key`, identified by `token`.
///
/// The lease is bound to one connection for its whole life: acquire and
/// release travel over the same connection. If the holder never releases,
/// the backend drops the key once the TTL elapses and the resource becomes
/// acquirable again.
///
/// # Example
///
/// ```rust,ignore
/// let conn = pool.get().await?;
/// let mut lease = Lease::new(conn, "reports:rebuild", create_holder_token());
/// lease.acquire().await?;
/// rebuild_reports().await;
/// lease.release().await?;
/// ```
pub struct Lease<C> {
    key: String,
    token: String,
    options: LeaseOptions,
    connection: C,
    state: LeaseState,
}

impl<C: LockConnection> Lease<C> {
    /// Creates an idle lease with default options.
    pub fn new(connection: C, key: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            token: token.into(),
            options: LeaseOptions::default(),
            connection,
            state: LeaseState::Idle,
        }
    }

    /// Replaces the TTL and retry options.
    pub fn with_options(mut self, options: LeaseOptions) -> Self {
        self.options = options;
        self
    }

    /// Resource key guarded by this lease.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Holder token written into the key.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LeaseState {
        self.state
    }

    /// Options in effect.
    pub fn options(&self) -> &LeaseOptions {
        &self.options
    }

    /// The bound connection.
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Consumes the lease and returns the bound connection.
    pub fn into_connection(self) -> C {
        self.connection
    }

    /// Acquires the lease, retrying on contention.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The key now holds our token for `ttl`
    /// * `Err(LockError::Contention)` - Every attempt found the key held
    /// * `Err(LockError::Transport)` - The connection or command failed; no retry
    /// * `Err(LockError::InvalidState)` - The lease was already released or expired
    #[instrument(skip(self), fields(lock.key = %self.key, attempts = Empty))]
    pub async fn acquire(&mut self) -> LockResult<bool> {
        self.ensure_acquirable()?;

        let retry = self.options.retry();
        let mut attempts = 0;
        loop {
            attempts += 1;
            if self.attempt().await? {
                Span::current().record("attempts", attempts);
                return Ok(true);
            }
            if !retry.should_retry(attempts) {
                break;
            }
            debug!(attempt = attempts, "lock held, retrying");
            tokio::time::sleep(retry.interval()).await;
        }

        Span::current().record("attempts", attempts);
        Err(LockError::Contention {
            key: self.key.clone(),
            attempts,
        })
    }

    /// Makes a single acquire attempt.
    ///
    /// Returns `Ok(false)` instead of an error when the key is held.
    #[instrument(skip(self), fields(lock.key = %self.key))]
    pub async fn try_acquire(&mut self) -> LockResult<bool> {
        self.ensure_acquirable()?;
        self.attempt().await
    }

    /// Releases the lease if the key still holds our token.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Our key was deleted
    /// * `Ok(false)` - The key was absent or re-acquired by another holder, or
    ///   the lease was never acquired (it stays `Idle`)
    /// * `Err(LockError::Transport)` - The connection or command failed
    #[instrument(skip(self), fields(lock.key = %self.key, state = ?self.state))]
    pub async fn release(&mut self) -> LockResult<bool> {
        if self.state != LeaseState::Held {
            return Ok(false);
        }

        let freed = self
            .connection
            .delete_if_holder(&self.key, &self.token)
            .await?;
        self.state = if freed {
            LeaseState::Released
        } else {
            LeaseState::Expired
        };
        debug!(freed, "lease released");
        Ok(freed)
    }

    async fn attempt(&mut self) -> LockResult<bool> {
        let acquired = self
            .connection
            .set_if_absent(&self.key, &self.token, self.options.lease_ttl())
            .await?;
        if acquired {
            self.state = LeaseState::Held;
        }
        Ok(acquired)
    }

    fn ensure_acquirable(&self) -> LockResult<()> {
        match self.state {
            LeaseState::Idle | LeaseState::Held => Ok(()),
            state => Err(LockError::InvalidState(format!(
                "cannot acquire {:?}: lease is {:?}",
                self.key, state
            ))),
        }
    }
}

impl<C> std::fmt::Debug for Lease<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("key", &self.key)
            .field("state", &self.state)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
