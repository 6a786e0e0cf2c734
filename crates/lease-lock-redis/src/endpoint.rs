//! Connection URL parsing and topology classification.
//!
//! Supported forms:
//!
//! ```text
//! redis://[user[:pass]@]host:port[/db][?idle_timeout_seconds=N]
//! redis+sentinel://[user[:pass]@]host1:port1,host2:port2/master_name[/db][?sentinel_password=pass]
//! ```

use std::fmt;
use std::time::Duration;

use lease_lock_core::error::{LockError, LockResult};
use percent_encoding::percent_decode_str;

const DEFAULT_REDIS_PORT: u16 = 6379;
const DEFAULT_SENTINEL_PORT: u16 = 26379;

const SCHEME_DIRECT: &str = "redis";
const SCHEME_SENTINEL: &str = "redis+sentinel";
const SCHEME_SECURE_PREFIX: &str = "rediss";

const QUERY_IDLE_TIMEOUT: &str = "idle_timeout_seconds";
const QUERY_SENTINEL_PASSWORD: &str = "sentinel_password";

/// A `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostAddr {
    /// Host name or IP address, without IPv6 brackets.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl HostAddr {
    /// Creates an address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `host:port`, `[v6]:port` or a bare host with `default_port`.
    pub fn parse(raw: &str, default_port: u16) -> LockResult<Self> {
        let raw = raw.trim();
        if let Some(rest) = raw.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| bad_url(format!("unterminated IPv6 address: {raw}")))?;
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(port)?,
                None if tail.is_empty() => default_port,
                None => return Err(bad_url(format!("invalid address: {raw}"))),
            };
            return Ok(Self::new(host, port));
        }

        match raw.rsplit_once(':') {
            Some((host, port)) => Ok(Self::new(host, parse_port(port)?)),
            None => Ok(Self::new(raw, default_port)),
        }
    }
}

impl fmt::Display for HostAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// A single fixed Redis endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct DirectEndpoint {
    /// Server address.
    pub addr: HostAddr,
    /// ACL user name, if the URL carries a non-empty one.
    pub username: Option<String>,
    /// Password from the URL user info.
    pub password: Option<String>,
    /// Database index; 0 is never selected explicitly.
    pub database: u8,
}

/// A sentinel-managed master.
#[derive(Clone, PartialEq, Eq)]
pub struct SentinelConfig {
    /// Sentinel addresses in probe order.
    pub addresses: Vec<HostAddr>,
    /// Name of the monitored master.
    pub master_name: String,
    /// Database index on the master; 0 is never selected explicitly.
    pub database: u8,
    /// Password sent to sentinels.
    pub sentinel_password: Option<String>,
    /// Password sent to the master.
    pub master_password: Option<String>,
}

/// Backend topology named by a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    /// `redis://`
    Direct(DirectEndpoint),
    /// `redis+sentinel://`
    Sentinel(SentinelConfig),
}

impl Topology {
    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Direct(_) => "direct",
            Self::Sentinel(_) => "sentinel",
        }
    }
}

/// Result of resolving a connection URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    /// Backend topology.
    pub topology: Topology,
    /// `idle_timeout_seconds` from the query string, when present and numeric.
    pub idle_timeout: Option<Duration>,
}

/// Parses connection URLs into a [`ResolvedEndpoint`].
pub struct EndpointResolver;

impl EndpointResolver {
    /// Parses and classifies `raw_url`.
    ///
    /// # Errors
    ///
    /// `LockError::Configuration` for malformed URLs, secure (`rediss*`) or
    /// unknown schemes, sentinel URLs without a master name, and invalid
    /// database indexes.
    pub fn resolve(raw_url: &str) -> LockResult<ResolvedEndpoint> {
        let url = RawUrl::split(raw_url)?;

        let topology = if url.scheme == SCHEME_DIRECT {
            Topology::Direct(Self::direct(&url)?)
        } else if url.scheme == SCHEME_SENTINEL {
            Topology::Sentinel(Self::sentinel(&url)?)
        } else if url.scheme.starts_with(SCHEME_SECURE_PREFIX) {
            return Err(bad_url("not support secure redis"));
        } else {
            return Err(bad_url(format!("not support scheme {}", url.scheme)));
        };

        let idle_timeout = url
            .query(QUERY_IDLE_TIMEOUT)
            .and_then(|secs| secs.parse::<u64>().ok())
            .map(Duration::from_secs);

        Ok(ResolvedEndpoint {
            topology,
            idle_timeout,
        })
    }

    fn direct(url: &RawUrl<'_>) -> LockResult<DirectEndpoint> {
        let addr = if url.hosts.is_empty() {
            HostAddr::new("localhost", DEFAULT_REDIS_PORT)
        } else {
            HostAddr::parse(url.hosts, DEFAULT_REDIS_PORT)?
        };

        let database = match url.path {
            "" | "/" => 0,
            path => parse_database(&path[1..])?,
        };

        Ok(DirectEndpoint {
            addr,
            username: url.username.clone().filter(|user| !user.is_empty()),
            password: url.password.clone(),
            database,
        })
    }

    fn sentinel(url: &RawUrl<'_>) -> LockResult<SentinelConfig> {
        let segments: Vec<&str> = url.path.split('/').collect();
        let master_name = match segments.get(1) {
            Some(name) if !name.is_empty() => decode(name)?,
            _ => {
                return Err(LockError::Configuration(
                    "bad redis sentinel url: no master name".to_string(),
                ));
            }
        };

        let database = match segments.get(2) {
            Some(db) if !db.is_empty() => parse_database(db)?,
            _ => 0,
        };

        let addresses = url
            .hosts
            .split(',')
            .map(|addr| {
                if addr.trim().is_empty() {
                    Err(bad_url("empty sentinel address"))
                } else {
                    HostAddr::parse(addr, DEFAULT_SENTINEL_PORT)
                }
            })
            .collect::<LockResult<Vec<_>>>()?;

        let sentinel_password = url
            .query(QUERY_SENTINEL_PASSWORD)
            .filter(|password| !password.is_empty())
            .or_else(|| url.password.clone());

        Ok(SentinelConfig {
            addresses,
            master_name,
            database,
            sentinel_password,
            master_password: url.password.clone(),
        })
    }
}

/// URL split into the pieces both topologies need.
///
/// Sentinel URLs carry a comma-separated host list, which general-purpose
/// URL parsers reject, so the authority is split by hand.
struct RawUrl<'a> {
    scheme: String,
    username: Option<String>,
    password: Option<String>,
    hosts: &'a str,
    path: &'a str,
    query: &'a str,
}

impl<'a> RawUrl<'a> {
    fn split(raw: &'a str) -> LockResult<Self> {
        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| bad_url(format!("missing scheme in {:?}", redact_url(raw))))?;
        if !is_valid_scheme(scheme) {
            return Err(bad_url(format!("invalid scheme {scheme:?}")));
        }

        let rest = rest.split_once('#').map_or(rest, |(before, _)| before);
        let (rest, query) = rest.split_once('?').unwrap_or((rest, ""));
        let (authority, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };

        let (userinfo, hosts) = match authority.rsplit_once('@') {
            Some((userinfo, hosts)) => (Some(userinfo), hosts),
            None => (None, authority),
        };

        let (username, password) = match userinfo {
            None => (None, None),
            Some(userinfo) => match userinfo.split_once(':') {
                Some((user, pass)) => (Some(decode(user)?), Some(decode(pass)?)),
                None => (Some(decode(userinfo)?), None),
            },
        };

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            username,
            password,
            hosts,
            path,
            query,
        })
    }

    fn query(&self, name: &str) -> Option<String> {
        url::form_urlencoded::parse(self.query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

/// Replaces the password in `raw` with `***` for logging.
pub fn redact_url(raw: &str) -> String {
    let Some((scheme, rest)) = raw.split_once("://") else {
        return raw.to_string();
    };
    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);
    match authority.rsplit_once('@') {
        Some((userinfo, hosts)) => match userinfo.split_once(':') {
            Some((user, _)) => format!("{scheme}://{user}:***@{hosts}{tail}"),
            None => raw.to_string(),
        },
        None => raw.to_string(),
    }
}

fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn parse_port(raw: &str) -> LockResult<u16> {
    raw.parse()
        .map_err(|_| bad_url(format!("invalid port {raw:?}")))
}

fn parse_database(raw: &str) -> LockResult<u8> {
    raw.parse()
        .map_err(|_| LockError::Configuration(format!("invalid database: {raw}")))
}

fn decode(raw: &str) -> LockResult<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| bad_url("user info is not valid UTF-8"))
}

fn bad_url(msg: impl fmt::Display) -> LockError {
    LockError::Configuration(format!("bad redis url: {msg}"))
}

// Credentials stay out of Debug output.
impl fmt::Debug for DirectEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectEndpoint")
            .field("addr", &self.addr)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("database", &self.database)
            .finish()
    }
}

impl fmt::Debug for SentinelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentinelConfig")
            .field("addresses", &self.addresses)
            .field("master_name", &self.master_name)
            .field("database", &self.database)
            .field(
                "sentinel_password",
                &self.sentinel_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "master_password",
                &self.master_password.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}
