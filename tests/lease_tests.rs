//! Lease behavior against the in-process store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::quick_options;
use lease_lock::memory::MemoryStore;
use lease_lock::{Lease, LeaseOptions, LeaseState, LockError};
use tokio::sync::Barrier;

#[tokio::test(start_paused = true)]
async fn test_acquire_and_release_round_trip() {
    let store = MemoryStore::new();
    let mut lease = Lease::new(store.connect(), "lock-a", "tok1").with_options(quick_options());

    assert!(lease.acquire().await.unwrap());
    assert_eq!(store.get("lock-a").as_deref(), Some("tok1"));

    assert!(lease.release().await.unwrap());
    assert_eq!(store.get("lock-a"), None);
    assert_eq!(lease.state(), LeaseState::Released);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_acquire_is_exclusive() {
    let store = MemoryStore::new();
    let barrier = Arc::new(Barrier::new(2));
    let options = LeaseOptions::new()
        .ttl(Duration::from_secs(30))
        .max_attempts(2)
        .retry_interval(Duration::from_millis(50));

    let mut tasks = Vec::new();
    for token in ["tok1", "tok2"] {
        let conn = store.connect();
        let barrier = barrier.clone();
        tasks.push(tokio::spawn(async move {
            let mut lease = Lease::new(conn, "lock-a", token).with_options(options);
            barrier.wait().await;
            lease.acquire().await
        }));
    }

    let mut acquired = 0;
    let mut contended = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(true) => acquired += 1,
            Err(LockError::Contention { attempts, .. }) => {
                assert_eq!(attempts, 2);
                contended += 1;
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    assert_eq!((acquired, contended), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn test_contention_waits_for_every_retry() {
    let store = MemoryStore::new();
    let mut holder = Lease::new(store.connect(), "lock-a", "tok1").with_options(quick_options());
    assert!(holder.acquire().await.unwrap());

    let mut waiter = Lease::new(store.connect(), "lock-a", "tok2").with_options(quick_options());
    let start = tokio::time::Instant::now();
    let err = waiter.acquire().await.unwrap_err();

    assert!(err.is_contention());
    // Three attempts, two pauses between them.
    assert_eq!(start.elapsed(), Duration::from_millis(200));
    assert_eq!(waiter.state(), LeaseState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_waiter_gets_key_freed_between_retries() {
    let store = MemoryStore::new();
    let mut holder = Lease::new(store.connect(), "lock-a", "tok1").with_options(quick_options());
    assert!(holder.acquire().await.unwrap());

    let waiter = tokio::spawn({
        let conn = store.connect();
        async move {
            let mut lease = Lease::new(conn, "lock-a", "tok2").with_options(quick_options());
            lease.acquire().await.map(|_| lease)
        }
    });

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(holder.release().await.unwrap());

    let lease = waiter.await.unwrap().unwrap();
    assert_eq!(lease.state(), LeaseState::Held);
    assert_eq!(store.get("lock-a").as_deref(), Some("tok2"));
}

#[tokio::test(start_paused = true)]
async fn test_expired_key_can_be_taken_over() {
    let store = MemoryStore::new();
    let short = LeaseOptions::new()
        .ttl(Duration::from_secs(1))
        .max_attempts(1);

    let mut first = Lease::new(store.connect(), "lock-a", "tok1").with_options(short);
    assert!(first.acquire().await.unwrap());

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(store.get("lock-a"), None);

    let mut second = Lease::new(store.connect(), "lock-a", "tok2").with_options(short);
    assert!(second.acquire().await.unwrap());

    // The first holder's release must not delete the new holder's key.
    assert!(!first.release().await.unwrap());
    assert_eq!(first.state(), LeaseState::Expired);
    assert_eq!(store.get("lock-a").as_deref(), Some("tok2"));

    assert!(second.release().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_release_is_idempotent() {
    let store = MemoryStore::new();
    let mut lease = Lease::new(store.connect(), "lock-a", "tok1").with_options(quick_options());
    assert!(lease.acquire().await.unwrap());

    assert!(lease.release().await.unwrap());
    assert!(!lease.release().await.unwrap());
    assert_eq!(lease.state(), LeaseState::Released);
}

#[tokio::test(start_paused = true)]
async fn test_release_on_closed_connection_is_transport_error() {
    let store = MemoryStore::new();
    let mut lease = Lease::new(store.connect(), "lock-a", "tok1").with_options(quick_options());
    assert!(lease.acquire().await.unwrap());

    lease.connection().close();
    let err = lease.release().await.unwrap_err();

    assert!(err.is_transport(), "got {err:?}");
    assert_eq!(lease.state(), LeaseState::Held);
    // The key stays until its TTL runs out.
    assert_eq!(store.get("lock-a").as_deref(), Some("tok1"));
}

#[tokio::test(start_paused = true)]
async fn test_try_acquire_does_not_wait() {
    let store = MemoryStore::new();
    let mut holder = Lease::new(store.connect(), "lock-a", "tok1");
    assert!(holder.try_acquire().await.unwrap());

    let mut other = Lease::new(store.connect(), "lock-a", "tok2");
    let start = tokio::time::Instant::now();
    assert!(!other.try_acquire().await.unwrap());
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_release_before_acquire_leaves_lease_usable() {
    let store = MemoryStore::new();
    let mut lease = Lease::new(store.connect(), "lock-a", "tok1").with_options(quick_options());

    // Nothing is sent for a lease that never held the key.
    lease.connection().close();
    assert!(!lease.release().await.unwrap());
    assert_eq!(lease.state(), LeaseState::Idle);

    let mut fresh = Lease::new(store.connect(), "lock-a", "tok1").with_options(quick_options());
    assert!(!fresh.release().await.unwrap());
    assert!(fresh.acquire().await.unwrap());
    assert_eq!(fresh.state(), LeaseState::Held);
    assert_eq!(store.get("lock-a").as_deref(), Some("tok1"));
}
