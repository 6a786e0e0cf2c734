//! Example: Sentinel-backed pool surviving a failover
//!
//! Run with: `cargo run --example sentinel_pool`
//!
//! Requires Redis Sentinel. Set REDIS_SENTINEL_URL, e.g.
//! `redis+sentinel://localhost:26379,localhost:26380/mymaster/0`.
//! Trigger `SENTINEL FAILOVER mymaster` while it runs.

use std::time::Duration;

use lease_lock::{Lease, LeaseOptions, PoolConfig, PoolRegistry, create_holder_token};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let url = std::env::var("REDIS_SENTINEL_URL")
        .unwrap_or_else(|_| "redis+sentinel://localhost:26379/mymaster".to_string());

    let registry = PoolRegistry::new();
    let pool = registry.get_or_create(
        "sentinel-demo",
        &url,
        Some(PoolConfig::new().max_active(4).max_idle(2)),
    )?;

    let options = LeaseOptions::new()
        .ttl(Duration::from_secs(2))
        .max_attempts(3);

    for round in 0..30 {
        // Each borrow re-checks ROLE; a demoted server is replaced by the new master.
        let conn = match pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                println!("round {round}: no master yet: {e}");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };
        let master = conn.addr().clone();

        let mut lease = Lease::new(conn, "sentinel-demo", create_holder_token()).with_options(options);
        match lease.acquire().await {
            Ok(_) => {
                lease.release().await?;
                println!("round {round}: locked and released on {master}");
            }
            Err(e) => println!("round {round}: {e}"),
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    Ok(())
}
