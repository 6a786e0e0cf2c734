//! One-call lock acquisition over a default pool.

use std::sync::Arc;

use lease_lock_core::error::{LockError, LockResult};
use lease_lock_core::lease::Lease;
use lease_lock_core::options::LeaseOptions;
use lease_lock_core::token::create_holder_token;
use tracing::{debug, instrument};

use crate::config::PoolConfig;
use crate::endpoint::redact_url;
use crate::lock::RedisLease;
use crate::pool::{PooledConnection, RedisPool};
use crate::registry::PoolRegistry;

/// Environment variable holding the default pool URL.
pub const ENV_LOCK_URL: &str = "REDIS_LOCK_URL";

/// Registry name of the default pool.
pub const DEFAULT_POOL_NAME: &str = "default";

/// Acquires and frees leases, borrowing from a well-known default pool when
/// the caller brings no connection.
///
/// # Example
///
/// ```rust,no_run
/// # #![recursion_limit = "256"]
/// use std::sync::Arc;
/// use lease_lock_redis::{Locker, PoolRegistry};
///
/// # async fn run() -> Result<(), lease_lock_core::LockError> {
/// let locker = Locker::new(Arc::new(PoolRegistry::new()), "redis://localhost:6379");
/// let lease = locker.require_lock("billing:close-month", None).await?;
/// // exclusive section
/// locker.free_lock(lease).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Locker {
    registry: Arc<PoolRegistry>,
    pool_name: String,
    url: String,
    pool_config: Option<PoolConfig>,
    options: LeaseOptions,
}

impl Locker {
    /// Creates a locker whose default pool is built from `url`.
    pub fn new(registry: Arc<PoolRegistry>, url: impl Into<String>) -> Self {
        Self {
            registry,
            pool_name: DEFAULT_POOL_NAME.to_string(),
            url: url.into(),
            pool_config: None,
            options: LeaseOptions::default(),
        }
    }

    /// Creates a locker from `REDIS_LOCK_URL` and the `REDIS_LOCK_*` lease
    /// options.
    ///
    /// # Errors
    ///
    /// `LockError::Configuration` if `REDIS_LOCK_URL` is unset or empty.
    pub fn from_env(registry: Arc<PoolRegistry>) -> LockResult<Self> {
        let url = std::env::var(ENV_LOCK_URL)
            .ok()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| LockError::Configuration(format!("{ENV_LOCK_URL} is not set")))?;
        Ok(Self::new(registry, url).with_options(LeaseOptions::from_env()))
    }

    /// Sets the registry name of the default pool.
    pub fn with_pool_name(mut self, name: impl Into<String>) -> Self {
        self.pool_name = name.into();
        self
    }

    /// Sets the configuration used if the default pool is built by this locker.
    pub fn with_pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = Some(config);
        self
    }

    /// Sets the TTL and retry options of every lease.
    pub fn with_options(mut self, options: LeaseOptions) -> Self {
        self.options = options;
        self
    }

    /// Lease options in effect.
    pub fn options(&self) -> &LeaseOptions {
        &self.options
    }

    /// The default pool, built on first use.
    pub fn default_pool(&self) -> LockResult<RedisPool> {
        self.registry
            .get_or_create(&self.pool_name, &self.url, self.pool_config)
    }

    /// Acquires `key` under a fresh holder token.
    ///
    /// Uses `connection` if given, otherwise borrows one from the default
    /// pool. The returned lease keeps the connection until it is freed.
    ///
    /// # Errors
    ///
    /// `LockError::Contention` if the key stayed held through every retry;
    /// `Transport`, `Topology` or `Configuration` for infrastructure failures.
    #[instrument(skip(self, connection), fields(lock.key = %key, backend = "redis"))]
    pub async fn require_lock(
        &self,
        key: &str,
        connection: Option<PooledConnection>,
    ) -> LockResult<RedisLease> {
        let connection = match connection {
            Some(connection) => connection,
            None => self.default_pool()?.get().await?,
        };

        let mut lease = Lease::new(connection, key, create_holder_token()).with_options(self.options);
        lease.acquire().await?;
        debug!("lock acquired");
        Ok(lease)
    }

    /// Releases `lease` and returns its connection to the pool.
    ///
    /// # Errors
    ///
    /// `LockError::NotHeld` if the key expired or was taken over;
    /// `LockError::Transport` if the connection is closed or the command fails.
    #[instrument(skip(self, lease), fields(lock.key = %lease.key(), backend = "redis"))]
    pub async fn free_lock(&self, mut lease: RedisLease) -> LockResult<()> {
        if lease.release().await? {
            debug!("lock freed");
            Ok(())
        } else {
            Err(LockError::NotHeld(lease.key().to_string()))
        }
    }
}

impl std::fmt::Debug for Locker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locker")
            .field("pool_name", &self.pool_name)
            .field("url", &redact_url(&self.url))
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
