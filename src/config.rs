//! Runtime configuration.
//!
//! One JSON record shared by both peers: the local peer reads the `local_*`
//! fields and dials `server:server_port`; the server peer binds them. The
//! binaries take no arguments — the file path comes from
//! `$SHADOWPIPE_CONFIG`, defaulting to `./config.json`.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::crypto::CipherKind;
use crate::error::{Error, Result};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "SHADOWPIPE_CONFIG";

/// Default config file path.
pub const CONFIG_PATH: &str = "config.json";

/// How the encrypted stream travels between the peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelMode {
    /// Raw TCP
    #[default]
    Tcp,
    /// WebSocket
    Ws,
    /// WebSocket over TLS (terminated in front of the server peer)
    Wss,
}

/// The shared configuration record.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server host: dialed by the local peer, bound by the server peer
    pub server: String,
    /// Server port
    pub server_port: u16,
    /// Local SOCKS5 bind address
    #[serde(default = "default_local_address")]
    pub local_address: String,
    /// Local SOCKS5 port
    pub local_port: u16,
    /// Local HTTP CONNECT port (front-end disabled when absent)
    #[serde(default)]
    pub local_http_port: Option<u16>,
    /// Shared password
    pub password: String,
    /// AEAD suite
    pub method: CipherKind,
    /// Inactivity timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Tunnel transport
    #[serde(default)]
    pub tunnel: TunnelMode,
}

fn default_local_address() -> String {
    "127.0.0.1".to_string()
}

fn default_timeout() -> u64 {
    300
}

impl Config {
    /// Load and validate the config from `$SHADOWPIPE_CONFIG` or
    /// `./config.json`.
    pub fn load() -> Result<Config> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    /// Load and validate the config from an explicit path.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {e}", path.display())))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| Error::config(format!("cannot parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject records that cannot produce a working session.
    pub fn validate(&self) -> Result<()> {
        if self.server.is_empty() {
            return Err(Error::config("server cannot be empty"));
        }
        if self.password.is_empty() {
            return Err(Error::config("password cannot be empty"));
        }
        if self.timeout == 0 {
            return Err(Error::config("timeout must be at least 1 second"));
        }
        Ok(())
    }

    /// The inactivity timeout as a [`Duration`].
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}
