//! Process-wide registry of named pools.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use lease_lock_core::error::LockResult;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::PoolConfig;
use crate::pool::RedisPool;

/// Maps logical names to pools, building each pool exactly once.
///
/// Create one registry at start-up and hand it (usually as
/// `Arc<PoolRegistry>`) to everything that needs pools.
///
/// Readers load an immutable snapshot of the map without locking. A miss
/// takes the build mutex, re-checks the snapshot, builds the pool and
/// publishes a new snapshot, so concurrent first calls for one name build a
/// single pool. Pools are never evicted.
///
/// # Example
///
/// ```rust,no_run
/// use lease_lock_redis::PoolRegistry;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = PoolRegistry::new();
/// let pool = registry.get_or_create("jobs", "redis://localhost:6379/1", None)?;
/// let again = registry.get_or_create("jobs", "redis://elsewhere:6379", None)?;
/// assert!(pool.ptr_eq(&again));
/// # Ok(())
/// # }
/// ```
pub struct PoolRegistry {
    /// Snapshot read lock-free by `get_or_create`; replaced only under `build_lock`.
    pools: ArcSwap<HashMap<String, RedisPool>>,
    build_lock: Mutex<()>,
}

impl PoolRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            pools: ArcSwap::from_pointee(HashMap::new()),
            build_lock: Mutex::new(()),
        }
    }

    /// Returns the pool registered as `name`, building it from `url` and
    /// `config` on first use.
    ///
    /// Once a name is registered, later calls return the same pool and
    /// ignore `url` and `config`: the first URL wins.
    ///
    /// # Errors
    ///
    /// `LockError::Configuration` if `url` is malformed or unsupported. The
    /// name stays unregistered, so a later call may retry with a good URL.
    pub fn get_or_create(
        &self,
        name: &str,
        url: &str,
        config: Option<PoolConfig>,
    ) -> LockResult<RedisPool> {
        if let Some(pool) = self.pools.load().get(name) {
            return Ok(pool.clone());
        }

        let _guard = self.build_lock.lock();
        let current = self.pools.load_full();
        if let Some(pool) = current.get(name) {
            debug!(pool = name, "pool built by a concurrent caller");
            return Ok(pool.clone());
        }

        let pool = RedisPool::open(name, url, config)?;

        let mut next = HashMap::clone(&current);
        next.insert(name.to_string(), pool.clone());
        self.pools.store(Arc::new(next));

        Ok(pool)
    }

    /// Returns the pool registered as `name`, if any.
    pub fn get(&self, name: &str) -> Option<RedisPool> {
        self.pools.load().get(name).cloned()
    }

    /// Number of registered pools.
    pub fn len(&self) -> usize {
        self.pools.load().len()
    }

    /// Returns `true` if no pool has been registered.
    pub fn is_empty(&self) -> bool {
        self.pools.load().is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.load().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("pools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lease_lock_core::error::LockError;

    #[test]
    fn test_first_url_wins() {
        let registry = PoolRegistry::new();
        let first = registry
            .get_or_create("core", "redis://127.0.0.1:6379/1", None)
            .unwrap();
        let second = registry
            .get_or_create("core", "redis+sentinel://s1:26379/other", None)
            .unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(second.topology(), "direct");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_failed_build_registers_nothing() {
        let registry = PoolRegistry::new();
        let err = registry
            .get_or_create("core", "redis+sentinel://s1:26379", None)
            .unwrap_err();
        assert!(matches!(err, LockError::Configuration(_)));
        assert!(registry.is_empty());
        assert!(registry.get("core").is_none());

        let pool = registry
            .get_or_create("core", "redis+sentinel://s1:26379/mymaster", None)
            .unwrap();
        assert_eq!(pool.topology(), "sentinel");
    }

    #[test]
    fn test_names_are_independent() {
        let registry = PoolRegistry::new();
        let a = registry.get_or_create("a", "redis://127.0.0.1:6379", None).unwrap();
        let b = registry.get_or_create("b", "redis://127.0.0.1:6379", None).unwrap();
        assert!(!a.ptr_eq(&b));
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
    }
}
