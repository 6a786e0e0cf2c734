//! Redis backend for lease locks.
//!
//! [`PoolRegistry`] hands out named [`RedisPool`]s for `redis://` and
//! `redis+sentinel://` URLs; [`RedisLease`] and [`Locker`] acquire and
//! release leases over borrowed connections.

pub mod config;
pub mod connection;
pub mod endpoint;
pub mod lock;
pub mod locker;
pub mod pool;
pub mod registry;
pub mod sentinel;

pub use config::PoolConfig;
pub use connection::{DialOptions, RedisConnection};
pub use endpoint::{EndpointResolver, HostAddr, ResolvedEndpoint, SentinelConfig, Topology};
pub use lock::RedisLease;
pub use locker::Locker;
pub use pool::{PooledConnection, RedisConnectionManager, RedisPool};
pub use registry::PoolRegistry;
pub use sentinel::SentinelCoordinator;
