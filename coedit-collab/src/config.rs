//! Server and client configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Interval between server pings, in seconds (0 disables)
    pub heartbeat_interval_secs: u64,
    /// Largest accepted WebSocket message
    pub max_message_bytes: usize,
}

pub const DEFAULT_PORT: u16 = 4000;

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            heartbeat_interval_secs: 30,
            max_message_bytes: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {var}: {value:?} is not a socket address")]
    InvalidAddr { var: &'static str, value: String },
    #[error("invalid {var}: {value:?} is not a port number")]
    InvalidPort { var: &'static str, value: String },
    #[error("invalid {var}: {value:?} is not a non-negative integer")]
    InvalidNumber { var: &'static str, value: String },
}

impl ServerConfig {
    /// Read configuration from the process environment.
    ///
    /// - `COEDIT_BIND_ADDR`: full socket address, e.g. `127.0.0.1:4000`
    /// - `PORT`: port on all interfaces, used when `COEDIT_BIND_ADDR` is unset
    /// - `COEDIT_HEARTBEAT_SECS`
    /// - `COEDIT_MAX_MESSAGE_BYTES`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("COEDIT_BIND_ADDR") {
            if addr.parse::<SocketAddr>().is_err() {
                return Err(ConfigError::InvalidAddr {
                    var: "COEDIT_BIND_ADDR",
                    value: addr,
                });
            }
            config.bind_addr = addr;
        } else if let Some(port) = lookup("PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort { var: "PORT", value: port.clone() })?;
            config.bind_addr = format!("0.0.0.0:{port}");
        }

        if let Some(secs) = lookup("COEDIT_HEARTBEAT_SECS") {
            config.heartbeat_interval_secs = parse_number("COEDIT_HEARTBEAT_SECS", secs)?;
        }
        if let Some(bytes) = lookup("COEDIT_MAX_MESSAGE_BYTES") {
            config.max_message_bytes = parse_number("COEDIT_MAX_MESSAGE_BYTES", bytes)?;
        }

        Ok(config)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_secs > 0).then(|| Duration::from_secs(self.heartbeat_interval_secs))
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber { var, value })
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server URL, e.g. `ws://localhost:4000`
    pub url: String,
    /// Connection attempts before giving up
    pub reconnect_attempts: u32,
    /// Pause between attempts
    pub reconnect_delay: Duration,
    /// Messages kept while disconnected
    pub offline_queue_capacity: usize,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: format!("ws://localhost:{DEFAULT_PORT}"),
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_millis(1000),
            offline_queue_capacity: 1024,
        }
    }
}
