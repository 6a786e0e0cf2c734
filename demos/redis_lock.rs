//! Example: Taking a lease lock through the default pool
//!
//! Run with: `cargo run --example redis_lock`
//!
//! Requires a Redis server. Set REDIS_LOCK_URL (and optionally
//! REDIS_LOCK_EXPIRY, REDIS_LOCK_MAX_RETRY, REDIS_LOCK_RETRY_DELAY).

#![recursion_limit = "256"]

use std::sync::Arc;
use std::time::Duration;

use lease_lock::{LeaseOptions, LockError, LockResult, Locker, PoolRegistry};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    run().await?;
    Ok(())
}

async fn run() -> LockResult<()> {
    let registry = Arc::new(PoolRegistry::new());
    let locker = match Locker::from_env(registry.clone()) {
        Ok(locker) => locker,
        Err(_) => Locker::new(registry.clone(), "redis://localhost:6379")
            .with_options(LeaseOptions::from_env()),
    };
    println!("Lease options: {:?}", locker.options());

    println!("Acquiring lock...");
    let lease = locker.require_lock("example-resource", None).await?;
    println!("Lock acquired with token {}", lease.token());

    // A second holder cannot get in while we hold the key
    match locker.require_lock("example-resource", None).await {
        Err(LockError::Contention { attempts, .. }) => {
            println!("Second acquire gave up after {attempts} attempts");
        }
        Err(e) => println!("Second acquire failed: {e}"),
        Ok(lease) => {
            println!("Second acquire unexpectedly succeeded");
            locker.free_lock(lease).await?;
        }
    }

    println!("Doing work...");
    tokio::time::sleep(Duration::from_millis(500)).await;

    locker.free_lock(lease).await?;
    println!("Lock released");

    for name in registry.names() {
        if let Some(pool) = registry.get(&name) {
            println!("Pool {name}: {} open, {} idle", pool.size(), pool.idle());
        }
    }

    Ok(())
}
