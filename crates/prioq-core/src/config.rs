use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Layout of a byte-stream insertion once the queue exists.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Two 4-byte writes: value, then priority.
    Split,
    /// One 8-byte write carrying value and priority together.
    Paired,
}

impl Default for WriteMode {
    fn default() -> Self {
        WriteMode::Split
    }
}

/// How the endpoint derives a client identity from a connection.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IdentityMode {
    /// The peer's process id; a process may hold one session at a time.
    Pid,
    /// A fresh identity per connection.
    Connection,
}

impl Default for IdentityMode {
    fn default() -> Self {
        IdentityMode::Pid
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub endpoint: PathBuf,
    pub write_mode: WriteMode,
    pub identity: IdentityMode,
    /// How long a connection waits for a same-identity session that is still
    /// being released before the connect is refused.
    pub attach_grace_ms: u64,
    pub max_payload: usize,
    pub threads: usize,
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: PathBuf::from("/tmp/prioq.sock"),
            write_mode: WriteMode::Split,
            identity: IdentityMode::Pid,
            attach_grace_ms: 250,
            max_payload: 256,
            threads: 2,
            log_level: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// The `log_level` key as a tracing level.
    pub fn log_level(&self) -> Result<tracing::Level, ConfigError> {
        tracing::Level::from_str(&self.log_level)
            .map_err(|_| ConfigError::LogLevel(self.log_level.clone()))
    }

    pub fn attach_grace(&self) -> Duration {
        Duration::from_millis(self.attach_grace_ms)
    }
}
