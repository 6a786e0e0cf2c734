//! In-process lock backend.
//!
//! Behaves like a single Redis server for the two commands a lease uses,
//! including key expiry. Intended for tests and benchmarks; expiry is
//! measured with `tokio::time::Instant` so paused test clocks apply.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::{LockError, LockResult};
use crate::traits::LockConnection;

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// Shared key space. Every connection from the same store sees the same keys.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    keys: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new connection to the store.
    pub fn connect(&self) -> MemoryConnection {
        MemoryConnection {
            store: self.clone(),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the live value of `key`, if any.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut keys = self.keys.lock();
        Self::purge_expired(&mut keys, key);
        keys.get(key).map(|entry| entry.value.clone())
    }

    fn purge_expired(keys: &mut HashMap<String, Entry>, key: &str) {
        if keys
            .get(key)
            .is_some_and(|entry| entry.expires_at <= Instant::now())
        {
            keys.remove(key);
        }
    }
}

/// A connection to a [`MemoryStore`] that can be closed like a socket.
#[derive(Debug)]
pub struct MemoryConnection {
    store: MemoryStore,
    closed: AtomicBool,
}

impl MemoryConnection {
    /// Closes the connection; every later command fails with a transport error.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Returns `true` once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn check_open(&self) -> LockResult<()> {
        if self.is_closed() {
            return Err(LockError::transport_msg("connection closed"));
        }
        Ok(())
    }
}

impl LockConnection for MemoryConnection {
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> LockResult<bool> {
        self.check_open()?;
        let mut keys = self.store.keys.lock();
        MemoryStore::purge_expired(&mut keys, key);
        if keys.contains_key(key) {
            return Ok(false);
        }
        keys.insert(
            key.to_string(),
            Entry {
                value: token.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn delete_if_holder(&self, key: &str, token: &str) -> LockResult<bool> {
        self.check_open()?;
        let mut keys = self.store.keys.lock();
        MemoryStore::purge_expired(&mut keys, key);
        if keys.get(key).is_some_and(|entry| entry.value == token) {
            keys.remove(key);
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_keys_expire() {
        let store = MemoryStore::new();
        let conn = store.connect();
        assert!(conn.set_if_absent("k", "a", Duration::from_secs(1)).await.unwrap());
        assert!(!conn.set_if_absent("k", "b", Duration::from_secs(1)).await.unwrap());

        tokio::time::sleep(Duration::from_millis(1001)).await;
        assert_eq!(store.get("k"), None);
        assert!(conn.set_if_absent("k", "b", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_checks_token() {
        let store = MemoryStore::new();
        let conn = store.connect();
        conn.set_if_absent("k", "a", Duration::from_secs(10)).await.unwrap();

        assert!(!conn.delete_if_holder("k", "b").await.unwrap());
        assert_eq!(store.get("k").as_deref(), Some("a"));
        assert!(conn.delete_if_holder("k", "a").await.unwrap());
        assert_eq!(store.get("k"), None);
    }
}
