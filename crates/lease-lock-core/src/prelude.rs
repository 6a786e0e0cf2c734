//! Convenience prelude for lease lock types.

pub use crate::error::{LockError, LockResult};
pub use crate::lease::{Lease, LeaseState};
pub use crate::options::{LeaseOptions, RetryPolicy};
pub use crate::token::create_holder_token;
pub use crate::traits::LockConnection;
