//! Server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::hub::HubConfig;

/// Configuration for a Blobfield server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP + WebSocket listen address
    pub addr: SocketAddr,

    /// Directory of front-end assets served at `/`
    pub static_dir: PathBuf,

    /// Hub tunables
    pub hub: HubConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            static_dir: PathBuf::from("./public"),
            hub: HubConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to the defaults.
    ///
    /// - `BLOBFIELD_ADDR`: listen address
    /// - `PORT`: overrides the port of the listen address
    /// - `BLOBFIELD_STATIC_DIR`: asset directory
    /// - `MAX_USERS`: session capacity
    /// - `BLOBFIELD_TICK_MS`: milliseconds between simulation steps
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = parse(&lookup, "BLOBFIELD_ADDR")? {
            config.addr = addr;
        }
        if let Some(port) = parse::<u16, _>(&lookup, "PORT")? {
            config.addr.set_port(port);
        }
        if let Some(dir) = lookup("BLOBFIELD_STATIC_DIR") {
            config.static_dir = PathBuf::from(dir);
        }
        if let Some(max_users) = parse(&lookup, "MAX_USERS")? {
            config.hub.max_users = max_users;
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "BLOBFIELD_TICK_MS")? {
            if ms == 0 {
                return Err(Error::Config {
                    key: "BLOBFIELD_TICK_MS",
                    value: ms.to_string(),
                    reason: "must be greater than zero".into(),
                });
            }
            config.hub.tick_interval = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(key) else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed.parse().map(Some).map_err(|e: T::Err| Error::Config {
        key,
        reason: e.to_string(),
        value,
    })
}
