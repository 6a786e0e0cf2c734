//! Lease-based distributed locks over pooled Redis connections.
//!
//! A lock is a Redis key set with `SET NX PX` to a holder token and deleted
//! only by the holder that set it. Leases expire on their own, so a crashed
//! holder never blocks a key for longer than its TTL.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! # #![recursion_limit = "256"]
//! use std::sync::Arc;
//! use lease_lock::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(PoolRegistry::new());
//!     let locker = Locker::new(registry, "redis://localhost:6379/0");
//!
//!     let lease = locker.require_lock("reports:nightly", None).await?;
//!
//!     // Critical section - we hold the key until the TTL runs out
//!     println!("Doing critical work...");
//!
//!     locker.free_lock(lease).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Topologies
//!
//! ## Direct
//!
//! ```text
//! redis://[user:password@]host[:port][/db][?idle_timeout_seconds=N]
//! ```
//!
//! ## Sentinel
//!
//! The master is resolved through the sentinels on every new connection and
//! borrowed connections are checked to still be the master.
//!
//! ```text
//! redis+sentinel://[:password@]host1[:port],host2[:port]/master_name[/db][?sentinel_password=...]
//! ```
//!
//! # Crate Organization
//!
//! This is a meta-crate that re-exports types from:
//! - `lease-lock-core`: lease state machine, options and errors
//! - `lease-lock-redis`: URL parsing, pools, registry and the Redis commands
//!
//! For fine-grained control, you can depend on individual crates instead.

// Re-export core types and traits
pub use lease_lock_core::*;

// Re-export redis backend
pub use lease_lock_redis::*;
