//! Redis commands backing a lease.

use std::time::Duration;

use fred::interfaces::{KeysInterface, LuaInterface};
use fred::types::{Expiration, SetOptions};
use lease_lock_core::error::LockResult;
use lease_lock_core::lease::Lease;
use lease_lock_core::traits::LockConnection;

use crate::connection::RedisConnection;
use crate::pool::PooledConnection;

/// A lease bound to a connection borrowed from a pool.
pub type RedisLease = Lease<PooledConnection>;

/// Deletes the key only if it still holds the caller's token.
const RELEASE_SCRIPT_LUA: &str = r#"
    if redis.call('get', KEYS[1]) == ARGV[1] then
        return redis.call('del', KEYS[1])
    end
    return 0
"#;

impl LockConnection for RedisConnection {
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> LockResult<bool> {
        // SET NX returns Some("OK") if the key was set, None if it already exists
        let reply: Option<String> = self
            .run(
                "SET NX PX",
                self.client().set(
                    key,
                    token,
                    Some(Expiration::PX(px_millis(ttl))),
                    Some(SetOptions::NX),
                    false,
                ),
            )
            .await?;
        Ok(reply.is_some())
    }

    async fn delete_if_holder(&self, key: &str, token: &str) -> LockResult<bool> {
        let deleted: i64 = self
            .run(
                "EVAL (release)",
                self.client()
                    .eval(RELEASE_SCRIPT_LUA, vec![key.to_string()], vec![token.to_string()]),
            )
            .await?;
        Ok(deleted == 1)
    }
}

/// `PX` argument for `ttl`: at least one millisecond, saturating at `i64::MAX`.
fn px_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1)
}

impl LockConnection for PooledConnection {
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> LockResult<bool> {
        (**self).set_if_absent(key, token, ttl).await
    }

    async fn delete_if_holder(&self, key: &str, token: &str) -> LockResult<bool> {
        (**self).delete_if_holder(key, token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_px_millis_bounds() {
        assert_eq!(px_millis(Duration::from_secs(5)), 5_000);
        assert_eq!(px_millis(Duration::ZERO), 1);
        assert_eq!(px_millis(Duration::from_micros(300)), 1);
        assert_eq!(px_millis(Duration::MAX), i64::MAX);
    }
}
