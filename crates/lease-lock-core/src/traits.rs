//! Core traits for lease locks.

use std::future::Future;
use std::time::Duration;

use crate::error::LockResult;

// ============================================================================
// Lock Connection Trait
// ============================================================================

/// A connection able to run the two atomic commands a lease needs.
///
/// Implementations must map a closed connection or any command failure to
/// [`LockError::Transport`](crate::LockError::Transport) so the lease can
/// tell infrastructure failures apart from contention.
///
/// # Example
///
/// ```rust,ignore
/// let conn = pool.get().await?;
/// if conn.set_if_absent("jobs:gc", &token, Duration::from_secs(5)).await? {
///     run_gc().await;
///     conn.delete_if_holder("jobs:gc", &token).await?;
/// }
/// ```
pub trait LockConnection: Send + Sync {
    /// Atomically stores `key = token` with expiry `ttl` if `key` is absent.
    ///
    /// Returns `Ok(true)` if the key was written, `Ok(false)` if it already
    /// existed.
    fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> impl Future<Output = LockResult<bool>> + Send;

    /// Atomically deletes `key` if it still holds `token`.
    ///
    /// Returns `Ok(true)` if the key was deleted, `Ok(false)` if it was
    /// absent or held another value.
    fn delete_if_holder(&self, key: &str, token: &str)
    -> impl Future<Output = LockResult<bool>> + Send;
}

impl<T> LockConnection for &T
where
    T: LockConnection + ?Sized,
{
    fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> impl Future<Output = LockResult<bool>> + Send {
        (**self).set_if_absent(key, token, ttl)
    }

    fn delete_if_holder(
        &self,
        key: &str,
        token: &str,
    ) -> impl Future<Output = LockResult<bool>> + Send {
        (**self).delete_if_holder(key, token)
    }
}
