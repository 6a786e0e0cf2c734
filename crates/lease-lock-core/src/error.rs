//! Error types for pool and lease operations.

use thiserror::Error;

/// Errors that can occur while building pools, borrowing connections or
/// holding a lease.
///
/// The variants separate failures a caller may want to retry at a higher
/// level (`Contention`) from infrastructure failures (`Transport`,
/// `Topology`) and from misconfiguration that will never succeed.
#[derive(Error, Debug)]
pub enum LockError {
    /// Malformed URL, unsupported scheme, missing sentinel master name or
    /// invalid database index.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No sentinel could be reached, or none knew the monitored master.
    #[error("topology error: {0}")]
    Topology(String),

    /// Connection closed, I/O failure, command error or failed health check.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The lock key stayed held by another holder for every attempt.
    #[error("lock {key:?} is held by another holder after {attempts} attempt(s)")]
    Contention {
        /// Resource key that was contended.
        key: String,
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// Release found the key absent or owned by another holder.
    #[error("lock {0:?} is not held by this holder")]
    NotHeld(String),

    /// Operation not permitted in the lease's current state.
    #[error("invalid lease state: {0}")]
    InvalidState(String),
}

impl LockError {
    /// Wraps a backend error as a transport failure.
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport(Box::new(err))
    }

    /// Builds a transport failure from a plain message.
    pub fn transport_msg(msg: impl Into<String>) -> Self {
        Self::Transport(Box::new(std::io::Error::other(msg.into())))
    }

    /// Returns `true` if the failure is lock contention.
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::Contention { .. })
    }

    /// Returns `true` if the failure came from the connection or the backend.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Result type for pool and lease operations.
pub type LockResult<T> = Result<T, LockError>;
