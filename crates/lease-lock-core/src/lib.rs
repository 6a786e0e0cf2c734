//! Core types for lease-based distributed locks.
//!
//! Backend crates implement [`LockConnection`] for their connection type;
//! [`Lease`] runs the acquire/retry/release state machine on top of it.

pub mod error;
pub mod lease;
pub mod memory;
pub mod options;
pub mod prelude;
pub mod token;
pub mod traits;

pub use error::{LockError, LockResult};
pub use prelude::*;
