//! Master discovery through Redis Sentinel.

use lease_lock_core::error::{LockError, LockResult};
use tracing::{debug, instrument, warn};

use crate::config::PoolConfig;
use crate::connection::{DialOptions, ROLE_MASTER, RedisConnection};
use crate::endpoint::{HostAddr, SentinelConfig};

/// Resolves and dials the current master of a sentinel-monitored group.
///
/// The master address is never cached: every dial asks the sentinels again,
/// so a failover is picked up by the next connection the pool creates.
#[derive(Debug, Clone)]
pub struct SentinelCoordinator {
    addresses: Vec<HostAddr>,
    master_name: String,
    sentinel_options: DialOptions,
    master_options: DialOptions,
}

impl SentinelCoordinator {
    /// Builds the coordinator and its two dial option sets from a parsed
    /// sentinel URL.
    pub fn new(config: &SentinelConfig, pool_config: &PoolConfig) -> Self {
        let timeouts = DialOptions::from_pool_config(pool_config);

        let sentinel_options = timeouts
            .clone()
            .password(config.sentinel_password.clone());
        let master_options = timeouts
            .password(config.master_password.clone())
            .database(config.database);

        Self {
            addresses: config.addresses.clone(),
            master_name: config.master_name.clone(),
            sentinel_options,
            master_options,
        }
    }

    /// Monitored master name.
    pub fn master_name(&self) -> &str {
        &self.master_name
    }

    /// Sentinel addresses in probe order.
    pub fn addresses(&self) -> &[HostAddr] {
        &self.addresses
    }

    /// Queries the sentinels, in configured order, for the master address.
    ///
    /// Succeeds on the first sentinel that reports an address.
    ///
    /// # Errors
    ///
    /// `LockError::Topology` if no sentinel could be reached or none knows
    /// the master.
    #[instrument(skip(self), fields(master = %self.master_name))]
    pub async fn master_addr(&self) -> LockResult<HostAddr> {
        let mut last_error: Option<LockError> = None;

        for addr in &self.addresses {
            debug!(sentinel = %addr, "dial redis sentinel");
            let conn = match RedisConnection::dial(addr, &self.sentinel_options).await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(sentinel = %addr, error = %e, "sentinel unreachable");
                    last_error = Some(e);
                    continue;
                }
            };

            let reply = conn.sentinel_master_addr(&self.master_name).await;
            if let Err(e) = conn.close().await {
                debug!(sentinel = %addr, error = %e, "closing sentinel connection failed");
            }

            match reply {
                Ok(Some(master)) => return Ok(master),
                Ok(None) => {
                    warn!(sentinel = %addr, "sentinel does not know the master");
                    last_error = Some(LockError::Topology(format!(
                        "sentinel {addr} has no master named {:?}",
                        self.master_name
                    )));
                }
                Err(e) => {
                    warn!(sentinel = %addr, error = %e, "sentinel query failed");
                    last_error = Some(e);
                }
            }
        }

        Err(LockError::Topology(match last_error {
            Some(e) => format!(
                "no sentinel reported a master for {:?}: {e}",
                self.master_name
            ),
            None => format!("no sentinels configured for {:?}", self.master_name),
        }))
    }

    /// Resolves the current master and opens a connection to it.
    pub async fn dial_master(&self) -> LockResult<RedisConnection> {
        let master = self.master_addr().await?;
        debug!(%master, database = ?self.master_options.database, "dial redis master");
        RedisConnection::dial(&master, &self.master_options).await
    }

    /// Confirms `conn` still points at a master.
    ///
    /// # Errors
    ///
    /// `LockError::Transport` if the role query fails or the server reports
    /// any other role, e.g. after a failover demoted it.
    pub async fn check_role(&self, conn: &RedisConnection) -> LockResult<()> {
        let role = conn.role().await?;
        ensure_master(&role, conn.addr())
    }
}

fn ensure_master(role: &str, addr: &HostAddr) -> LockResult<()> {
    if role == ROLE_MASTER {
        Ok(())
    } else {
        Err(LockError::transport_msg(format!(
            "role check failed: {addr} reports {role:?}"
        )))
    }
}
