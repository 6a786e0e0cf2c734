//! Pool registry behavior. Pools are built lazily, so no server is needed.

use std::sync::Arc;
use std::thread;

use lease_lock::{LockError, PoolConfig, PoolRegistry};

#[test]
fn test_concurrent_first_use_builds_one_pool() {
    let registry = Arc::new(PoolRegistry::new());

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let registry = registry.clone();
            thread::spawn(move || {
                // Each caller passes a different URL; only one may win.
                let url = format!("redis://127.0.0.1:6379/{}", i % 4);
                registry.get_or_create("shared", &url, None).unwrap()
            })
        })
        .collect();

    let pools: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(registry.len(), 1);
    let first = &pools[0];
    assert!(pools.iter().all(|pool| pool.ptr_eq(first)));
    assert!(registry.get("shared").unwrap().ptr_eq(first));
}

#[test]
fn test_sentinel_url_without_master_is_rejected() {
    let registry = PoolRegistry::new();

    let err = registry
        .get_or_create("jobs", "redis+sentinel://s1:26379,s2:26379", None)
        .unwrap_err();

    match err {
        LockError::Configuration(msg) => assert!(msg.contains("no master name"), "{msg}"),
        other => panic!("expected configuration error, got {other:?}"),
    }
    assert!(registry.is_empty());
}

#[test]
fn test_unsupported_schemes_are_rejected() {
    let registry = PoolRegistry::new();

    for url in ["rediss://127.0.0.1:6379", "memcached://127.0.0.1:11211"] {
        let err = registry.get_or_create("bad", url, None).unwrap_err();
        assert!(matches!(err, LockError::Configuration(_)), "{url}: {err:?}");
    }
    assert!(registry.is_empty());
}

#[test]
fn test_pool_config_applies_only_on_first_build() {
    let registry = PoolRegistry::new();
    let config = PoolConfig::new().max_active(8).max_idle(2);

    let pool = registry
        .get_or_create("cfg", "redis+sentinel://s1,s2:26380/mymaster/3", Some(config))
        .unwrap();
    assert_eq!(pool.topology(), "sentinel");
    assert_eq!(pool.name(), "cfg");

    let again = registry.get_or_create("cfg", "redis://other", None).unwrap();
    assert!(again.ptr_eq(&pool));
    assert_eq!(registry.names(), vec!["cfg".to_string()]);
}
