//! A single Redis connection.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use fred::clients::Client;
use fred::error::Error as FredError;
use fred::interfaces::ClientLike;
use fred::types::config::{Config, ServerConfig};
use fred::types::{Builder, CustomCommand, Value};
use lease_lock_core::error::{LockError, LockResult};
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::endpoint::HostAddr;

/// Role reported by a Redis master.
pub const ROLE_MASTER: &str = "master";

/// Credentials, database and timeouts used when dialing one server.
#[derive(Clone, Default)]
pub struct DialOptions {
    /// TCP connect timeout; zero disables.
    pub connect_timeout: Duration,
    /// Bound on each command round trip.
    pub command_timeout: Option<Duration>,
    /// ACL user name.
    pub username: Option<String>,
    /// Password sent with `AUTH`.
    pub password: Option<String>,
    /// Database selected after connecting.
    pub database: Option<u8>,
}

impl DialOptions {
    /// Timeouts taken from the pool configuration, no credentials.
    pub fn from_pool_config(config: &PoolConfig) -> Self {
        Self {
            connect_timeout: config.dial_connect_timeout,
            command_timeout: config.command_timeout(),
            ..Self::default()
        }
    }

    /// Sets the password.
    pub fn password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    /// Sets the ACL user name.
    pub fn username(mut self, username: Option<String>) -> Self {
        self.username = username;
        self
    }

    /// Selects `database` after connecting, unless it is 0.
    pub fn database(mut self, database: u8) -> Self {
        self.database = (database != 0).then_some(database);
        self
    }
}

impl fmt::Debug for DialOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialOptions")
            .field("connect_timeout", &self.connect_timeout)
            .field("command_timeout", &self.command_timeout)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("database", &self.database)
            .finish()
    }
}

/// One TCP connection to one Redis server (master, replica or sentinel).
///
/// Once [`close`](Self::close) is called every command fails with
/// `LockError::Transport`.
pub struct RedisConnection {
    client: Client,
    addr: HostAddr,
    command_timeout: Option<Duration>,
    closed: AtomicBool,
}

impl RedisConnection {
    /// Opens a connection to `addr`.
    pub async fn dial(addr: &HostAddr, options: &DialOptions) -> LockResult<Self> {
        let conn = Self::build(addr, options)?;
        conn.client
            .init()
            .await
            .map_err(|e| LockError::transport_msg(format!("failed to connect to Redis at {addr}: {e}")))?;
        debug!(%addr, database = ?options.database, "redis connection established");
        Ok(conn)
    }

    /// Builds the client for `addr` without connecting. Commands fail until
    /// the client is initialized.
    pub(crate) fn build(addr: &HostAddr, options: &DialOptions) -> LockResult<Self> {
        let config = Config {
            server: ServerConfig::new_centralized(addr.host.clone(), addr.port),
            username: options.username.clone(),
            password: options.password.clone(),
            database: options.database,
            ..Config::default()
        };

        let mut builder = Builder::from_config(config);
        builder.with_connection_config(|config| {
            if !options.connect_timeout.is_zero() {
                config.connection_timeout = options.connect_timeout;
            }
            config.max_command_attempts = 1;
        });
        let client = builder.build().map_err(|e| {
            LockError::transport_msg(format!("failed to build Redis client for {addr}: {e}"))
        })?;

        Ok(Self {
            client,
            addr: addr.clone(),
            command_timeout: options.command_timeout,
            closed: AtomicBool::new(false),
        })
    }

    /// Address this connection was dialed to.
    pub fn addr(&self) -> &HostAddr {
        &self.addr
    }

    /// Returns `true` once the connection was closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Sends `PING`.
    pub async fn ping(&self) -> LockResult<()> {
        let _: String = self.run("PING", self.client.ping(None)).await?;
        Ok(())
    }

    /// Sends `CLIENT ID`; the server assigns a new id to every connection.
    pub async fn client_id(&self) -> LockResult<i64> {
        self.run(
            "CLIENT ID",
            self.client.custom(
                CustomCommand::new_static("CLIENT", None::<u16>, false),
                vec!["ID".to_string()],
            ),
        )
        .await
    }

    /// Sends `ROLE` and returns the first element of the reply
    /// (`master`, `slave` or `sentinel`).
    pub async fn role(&self) -> LockResult<String> {
        let reply: Vec<Value> = self
            .run(
                "ROLE",
                self.client.custom(
                    CustomCommand::new_static("ROLE", None::<u16>, false),
                    Vec::<String>::new(),
                ),
            )
            .await?;
        parse_role(&reply)
    }

    /// Asks a sentinel for the address of `master_name`.
    ///
    /// Returns `Ok(None)` if the sentinel does not know the master.
    pub async fn sentinel_master_addr(&self, master_name: &str) -> LockResult<Option<HostAddr>> {
        let reply: Option<Vec<String>> = self
            .run(
                "SENTINEL get-master-addr-by-name",
                self.client.custom(
                    CustomCommand::new_static("SENTINEL", None::<u16>, false),
                    vec![
                        "get-master-addr-by-name".to_string(),
                        master_name.to_string(),
                    ],
                ),
            )
            .await?;

        match reply {
            None => Ok(None),
            Some(parts) => parse_master_addr(&parts).map(Some),
        }
    }

    /// Closes the connection and waits for the server to acknowledge.
    pub async fn close(&self) -> LockResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.client
            .quit()
            .await
            .map_err(|e| LockError::transport_msg(format!("redis QUIT failed: {e}")))
    }

    /// Closes the connection without waiting. Used where `await` is not
    /// available (drop paths).
    pub fn close_in_background(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let client = self.client.clone();
        let addr = self.addr.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = client.quit().await {
                        debug!(%addr, error = %e, "redis QUIT failed");
                    }
                });
            }
            Err(_) => warn!(%addr, "no runtime available to close redis connection"),
        }
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    /// Runs one command future with the closed check and command timeout.
    pub(crate) async fn run<T, F>(&self, command: &str, fut: F) -> LockResult<T>
    where
        F: Future<Output = Result<T, FredError>>,
    {
        if self.is_closed() {
            return Err(LockError::transport_msg(format!(
                "redis {command} failed: connection to {} is closed",
                self.addr
            )));
        }

        let result = match self.command_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                LockError::transport_msg(format!("redis {command} timed out after {limit:?}"))
            })?,
            None => fut.await,
        };

        result.map_err(|e| LockError::transport_msg(format!("redis {command} failed: {e}")))
    }
}

impl fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConnection")
            .field("addr", &self.addr)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

fn parse_role(reply: &[Value]) -> LockResult<String> {
    reply
        .first()
        .and_then(Value::as_string)
        .ok_or_else(|| LockError::transport_msg("malformed ROLE reply"))
}

fn parse_master_addr(parts: &[String]) -> LockResult<HostAddr> {
    match parts {
        [host, port, ..] => {
            let port = port.parse().map_err(|_| {
                LockError::transport_msg(format!("malformed get-master-addr-by-name port {port:?}"))
            })?;
            Ok(HostAddr::new(host.clone(), port))
        }
        _ => Err(LockError::transport_msg(
            "malformed get-master-addr-by-name reply",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_role() {
        let reply = vec![Value::from("master"), Value::Integer(3129659), Value::Array(vec![])];
        assert_eq!(parse_role(&reply).unwrap(), ROLE_MASTER);

        let reply = vec![Value::from("slave"), Value::from("10.0.0.1"), Value::Integer(6379)];
        assert_eq!(parse_role(&reply).unwrap(), "slave");

        assert!(parse_role(&[]).unwrap_err().is_transport());
    }

    #[test]
    fn test_parse_master_addr() {
        let addr = parse_master_addr(&["10.0.0.7".to_string(), "6380".to_string()]).unwrap();
        assert_eq!(addr, HostAddr::new("10.0.0.7", 6380));

        assert!(parse_master_addr(&["10.0.0.7".to_string()]).is_err());
        assert!(parse_master_addr(&["10.0.0.7".to_string(), "x".to_string()]).is_err());
    }

    #[tokio::test]
    async fn test_commands_fail_on_unconnected_client() {
        let conn = RedisConnection::build(&HostAddr::new("127.0.0.1", 1), &DialOptions::default())
            .unwrap();
        assert!(conn.ping().await.unwrap_err().is_transport());

        conn.close_in_background();
        assert!(conn.is_closed());
        let err = conn.role().await.unwrap_err();
        assert!(err.to_string().contains("is closed"), "{err}");
    }

    #[test]
    fn test_zero_database_not_selected() {
        let options = DialOptions::default().database(0);
        assert_eq!(options.database, None);
        let options = DialOptions::default().database(4);
        assert_eq!(options.database, Some(4));
    }
}
