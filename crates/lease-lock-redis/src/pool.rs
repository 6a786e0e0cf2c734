//! Connection pools for direct and sentinel topologies.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use deadpool::managed::{self, Metrics, Object, PoolError, RecycleError, RecycleResult};
use lease_lock_core::error::{LockError, LockResult};
use tracing::{debug, info, instrument, warn};

use crate::config::PoolConfig;
use crate::connection::{DialOptions, RedisConnection};
use crate::endpoint::{DirectEndpoint, EndpointResolver, HostAddr, Topology, redact_url};
use crate::sentinel::SentinelCoordinator;

/// How new connections are dialed and how borrowed ones are checked.
#[derive(Debug, Clone)]
enum Backend {
    /// Fixed endpoint; health check is `PING`.
    Direct {
        addr: HostAddr,
        options: DialOptions,
    },
    /// Sentinel-resolved master; health check is `ROLE == master`.
    Sentinel(SentinelCoordinator),
}

/// deadpool manager dialing and verifying Redis connections.
#[derive(Debug)]
pub struct RedisConnectionManager {
    backend: Backend,
    idle_timeout: Duration,
}

impl RedisConnectionManager {
    fn direct(endpoint: &DirectEndpoint, config: &PoolConfig) -> Self {
        let options = DialOptions::from_pool_config(config)
            .username(endpoint.username.clone())
            .password(endpoint.password.clone())
            .database(endpoint.database);
        Self {
            backend: Backend::Direct {
                addr: endpoint.addr.clone(),
                options,
            },
            idle_timeout: config.idle_timeout,
        }
    }

    fn sentinel(coordinator: SentinelCoordinator, config: &PoolConfig) -> Self {
        Self {
            backend: Backend::Sentinel(coordinator),
            idle_timeout: config.idle_timeout,
        }
    }

    async fn health_check(&self, conn: &RedisConnection) -> LockResult<()> {
        match &self.backend {
            Backend::Direct { .. } => conn.ping().await,
            Backend::Sentinel(coordinator) => coordinator.check_role(conn).await,
        }
    }
}

impl managed::Manager for RedisConnectionManager {
    type Type = RedisConnection;
    type Error = LockError;

    async fn create(&self) -> Result<RedisConnection, LockError> {
        match &self.backend {
            Backend::Direct { addr, options } => {
                debug!(%addr, "dial redis");
                RedisConnection::dial(addr, options).await
            }
            Backend::Sentinel(coordinator) => coordinator.dial_master().await,
        }
    }

    async fn recycle(&self, conn: &mut RedisConnection, metrics: &Metrics) -> RecycleResult<LockError> {
        if conn.is_closed() {
            return Err(RecycleError::Backend(LockError::transport_msg(
                "connection was closed",
            )));
        }

        if !self.idle_timeout.is_zero() && metrics.last_used() > self.idle_timeout {
            debug!(addr = %conn.addr(), idle = ?metrics.last_used(), "closing idle connection");
            conn.close_in_background();
            return Err(RecycleError::Backend(LockError::transport_msg(
                "connection exceeded idle timeout",
            )));
        }

        if let Err(e) = self.health_check(conn).await {
            warn!(addr = %conn.addr(), error = %e, "discarding connection that failed borrow check");
            conn.close_in_background();
            return Err(RecycleError::Backend(e));
        }
        Ok(())
    }
}

struct PoolInner {
    name: String,
    topology: &'static str,
    pool: managed::Pool<RedisConnectionManager>,
    max_idle: usize,
}

/// A named pool of connections to one resolved backend.
///
/// Cloning is cheap and clones share the same connections. Borrowing waits
/// when `max_active` connections are out; wrap [`get`](Self::get) in
/// `tokio::time::timeout` for a bounded wait.
#[derive(Clone)]
pub struct RedisPool {
    inner: Arc<PoolInner>,
}

impl RedisPool {
    /// Builds a pool for `url` without connecting. Connections are dialed
    /// on first borrow.
    ///
    /// `config` defaults to [`PoolConfig::default`]; the URL's
    /// `idle_timeout_seconds` overrides its idle timeout.
    pub fn open(name: &str, url: &str, config: Option<PoolConfig>) -> LockResult<Self> {
        let resolved = EndpointResolver::resolve(url)?;

        let mut config = config.unwrap_or_default();
        if let Some(idle_timeout) = resolved.idle_timeout {
            config.idle_timeout = idle_timeout;
        }

        let manager = match &resolved.topology {
            Topology::Direct(endpoint) => RedisConnectionManager::direct(endpoint, &config),
            Topology::Sentinel(sentinel) => RedisConnectionManager::sentinel(
                SentinelCoordinator::new(sentinel, &config),
                &config,
            ),
        };

        let pool = managed::Pool::builder(manager)
            .max_size(config.pool_size())
            .build()
            .map_err(|e| LockError::Configuration(format!("failed to build pool {name:?}: {e}")))?;

        info!(
            pool = name,
            url = %redact_url(url),
            topology = resolved.topology.kind(),
            max_active = config.max_active,
            max_idle = config.max_idle,
            idle_timeout = ?config.idle_timeout,
            "redis pool created"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                name: name.to_string(),
                topology: resolved.topology.kind(),
                pool,
                max_idle: config.max_idle,
            }),
        })
    }

    /// Logical name the pool was registered under.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// `"direct"` or `"sentinel"`.
    pub fn topology(&self) -> &'static str {
        self.inner.topology
    }

    /// Returns `true` if both handles refer to the same pool.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Connections currently open (idle and borrowed).
    pub fn size(&self) -> usize {
        self.inner.pool.status().size as usize
    }

    /// Idle connections ready to be borrowed.
    pub fn idle(&self) -> usize {
        self.inner.pool.status().available as usize
    }

    /// Borrows a connection, dialing one if none is idle.
    ///
    /// Idle connections are checked first (`PING` for direct pools, `ROLE`
    /// for sentinel pools); failures are discarded and replaced
    /// transparently.
    ///
    /// # Errors
    ///
    /// `LockError::Topology` if no sentinel reports a master,
    /// `LockError::Transport` if dialing fails.
    #[instrument(skip(self), fields(pool = %self.inner.name, topology = self.inner.topology))]
    pub async fn get(&self) -> LockResult<PooledConnection> {
        let object = self.inner.pool.get().await.map_err(|e| match e {
            PoolError::Backend(e) => e,
            other => LockError::transport_msg(format!(
                "failed to borrow from pool {:?}: {other}",
                self.inner.name
            )),
        })?;

        Ok(PooledConnection {
            object: Some(object),
            pool: self.clone(),
        })
    }
}

impl fmt::Debug for RedisPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisPool")
            .field("name", &self.inner.name)
            .field("topology", &self.inner.topology)
            .field("max_idle", &self.inner.max_idle)
            .field("status", &self.inner.pool.status())
            .finish()
    }
}

/// A connection borrowed from a [`RedisPool`].
///
/// Dropping it returns the connection to the pool, or closes it when the
/// pool already keeps `max_idle` idle connections or the connection was
/// closed.
pub struct PooledConnection {
    object: Option<Object<RedisConnectionManager>>,
    pool: RedisPool,
}

impl PooledConnection {
    /// Pool this connection belongs to.
    pub fn pool(&self) -> &RedisPool {
        &self.pool
    }
}

impl Deref for PooledConnection {
    type Target = RedisConnection;

    fn deref(&self) -> &RedisConnection {
        // Only `drop` takes the object out.
        self.object
            .as_deref()
            .expect("pooled connection used after drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(object) = self.object.take() else {
            return;
        };

        if object.is_closed() || self.pool.idle() >= self.pool.inner.max_idle {
            let conn = Object::take(object);
            conn.close_in_background();
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("pool", &self.pool.inner.name)
            .field("connection", &self.object.as_deref())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use deadpool::managed::Manager;

    use super::*;

    fn idle_for(duration: Duration) -> Metrics {
        let created = Instant::now().checked_sub(duration).unwrap();
        Metrics {
            created,
            recycled: Some(created),
            recycle_count: 1,
        }
    }

    fn unconnected(pool: &RedisPool) -> RedisConnection {
        let Backend::Direct { addr, options } = &pool.inner.pool.manager().backend else {
            panic!("expected direct backend");
        };
        RedisConnection::build(addr, options).unwrap()
    }

    #[tokio::test]
    async fn test_recycle_discards_connection_past_idle_timeout() {
        let pool = RedisPool::open(
            "evict",
            "redis://127.0.0.1:1",
            Some(PoolConfig::new().max_idle(2).idle_timeout(Duration::from_millis(200))),
        )
        .unwrap();
        let manager = pool.inner.pool.manager();
        let mut conn = unconnected(&pool);

        let err = manager
            .recycle(&mut conn, &idle_for(Duration::from_secs(1)))
            .await
            .unwrap_err();

        assert!(matches!(err, RecycleError::Backend(LockError::Transport(_))));
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_recycle_discards_connection_failing_health_check() {
        let pool = RedisPool::open(
            "unhealthy",
            "redis://127.0.0.1:1",
            Some(PoolConfig::new().max_idle(2).idle_timeout(Duration::from_secs(60))),
        )
        .unwrap();
        let manager = pool.inner.pool.manager();
        let mut conn = unconnected(&pool);

        // Within the idle timeout, so only PING decides; the client never connected.
        let err = manager
            .recycle(&mut conn, &idle_for(Duration::from_millis(10)))
            .await
            .unwrap_err();

        assert!(matches!(err, RecycleError::Backend(LockError::Transport(_))));
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_recycle_rejects_closed_connection() {
        let pool = RedisPool::open("closed", "redis://127.0.0.1:1", None).unwrap();
        let manager = pool.inner.pool.manager();
        let mut conn = unconnected(&pool);
        conn.close_in_background();

        let err = manager
            .recycle(&mut conn, &idle_for(Duration::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, RecycleError::Backend(LockError::Transport(_))));
    }

    #[test]
    fn test_open_is_lazy() {
        // Nothing listens here; building the pool must not dial.
        let pool = RedisPool::open("lazy", "redis://127.0.0.1:1/0", None).unwrap();
        assert_eq!(pool.name(), "lazy");
        assert_eq!(pool.topology(), "direct");
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn test_open_rejects_bad_url() {
        let err = RedisPool::open("bad", "rediss://127.0.0.1:6379", None).unwrap_err();
        assert!(matches!(err, LockError::Configuration(_)));
    }

    #[test]
    fn test_query_overrides_idle_timeout() {
        let pool = RedisPool::open(
            "idle",
            "redis://127.0.0.1:1?idle_timeout_seconds=7",
            Some(PoolConfig::new().idle_timeout(Duration::from_secs(300))),
        )
        .unwrap();
        assert_eq!(pool.inner.pool.manager().idle_timeout, Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_borrow_from_unreachable_direct_is_transport_error() {
        let pool = RedisPool::open("down", "redis://127.0.0.1:1", None).unwrap();
        let err = pool.get().await.unwrap_err();
        assert!(err.is_transport(), "got {err:?}");
    }

    #[tokio::test]
    async fn test_borrow_from_unreachable_sentinel_is_topology_error() {
        let pool = RedisPool::open("down-sentinel", "redis+sentinel://127.0.0.1:1/mymaster", None)
            .unwrap();
        let err = pool.get().await.unwrap_err();
        assert!(matches!(err, LockError::Topology(_)), "got {err:?}");
    }
}
