//! Connection parameters and lifecycle state

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::error::{StoreError, StoreResult};

/// Database name that selects an in-memory graph.
pub const IN_MEMORY: &str = ":memory:";

/// Connection parameters shared by every driver.
///
/// Embedded drivers ignore `host`/`port` for transport but still report them
/// as identity in health status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Database file path, or `:memory:`
    pub database: String,
    pub connection_timeout_secs: u64,
    pub query_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 0,
            database: "mnemosyne.db".to_string(),
            connection_timeout_secs: 30,
            query_timeout_secs: 60,
        }
    }
}

impl ConnectionConfig {
    pub fn in_memory() -> Self {
        Self {
            database: IN_MEMORY.to_string(),
            ..Self::default()
        }
    }

    pub fn for_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            database: path.as_ref().to_string_lossy().to_string(),
            ..Self::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database == IN_MEMORY
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.database.trim().is_empty() {
            return Err(StoreError::Configuration(
                "database must not be empty".to_string(),
            ));
        }
        if self.host.trim().is_empty() {
            return Err(StoreError::Configuration("host must not be empty".to_string()));
        }
        if self.connection_timeout_secs == 0 {
            return Err(StoreError::Configuration(
                "connection_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.query_timeout_secs == 0 {
            return Err(StoreError::Configuration(
                "query_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-client lifecycle: Disconnected -> Connecting -> Connected -> Disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}
