//! Replog Configuration
//!
//! This module provides configuration structures for master and slave
//! nodes, loaded from TOML.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::replication::{MasterSettings, SlaveSettings};

/// Main Replog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplogConfig {
    /// Node-specific configuration
    pub node: NodeConfig,

    /// Log storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Master role settings (required when `node.role = "master"`)
    #[serde(default)]
    pub master: Option<MasterConfig>,

    /// Slave role settings (required when `node.role = "slave"`)
    #[serde(default)]
    pub slave: Option<SlaveConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which side of the replication this node plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Master,
    Slave,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Master => write!(f, "master"),
            Role::Slave => write!(f, "slave"),
        }
    }
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub role: Role,

    /// Address the HTTP API binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Replica identifier reported in acknowledgements (empty = generated)
    #[serde(default)]
    pub replica_id: String,
}

/// Log storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
}

/// Log storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// Log file path (file backend only)
    #[serde(default = "default_log_path")]
    pub path: PathBuf,

    /// Use fsync for durability (slower but safer)
    #[serde(default = "default_fsync")]
    pub fsync: bool,
}

/// Master role configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Slave API addresses (host:port) to push writes to
    #[serde(default)]
    pub peers: Vec<String>,

    /// How long a write waits for its acknowledgements
    #[serde(default = "default_min_ack_wait_ms")]
    pub min_ack_wait_ms: u64,

    /// Timeout for each push to a slave
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Slave role configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaveConfig {
    /// Master API address (host:port)
    pub master_address: String,

    /// Initial capacity of the apply queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Timeout for backlog fetches and acknowledgements
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Longest the apply worker idles before rechecking state
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Pause after a failed apply or backlog pull
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_backend() -> StorageBackend {
    StorageBackend::Memory
}

fn default_log_path() -> PathBuf {
    PathBuf::from("/var/lib/replog/log.bin")
}

fn default_fsync() -> bool {
    true
}

fn default_min_ack_wait_ms() -> u64 {
    3000
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_log_path(),
            fsync: default_fsync(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl MasterConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn settings(&self) -> MasterSettings {
        MasterSettings {
            min_ack_wait: Duration::from_millis(self.min_ack_wait_ms),
        }
    }
}

impl SlaveConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn settings(&self) -> SlaveSettings {
        SlaveSettings {
            queue_capacity: self.queue_capacity,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

impl ReplogConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: ReplogConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.node.bind_address.is_empty() {
            return Err(crate::Error::Config("node.bind_address cannot be empty".into()));
        }

        if self.storage.backend == StorageBackend::File
            && self.storage.path.as_os_str().is_empty()
        {
            return Err(crate::Error::Config(
                "storage.path is required for the file backend".into(),
            ));
        }

        match self.node.role {
            Role::Master => {
                let master = self.master_config()?;
                if master.peers.is_empty() {
                    return Err(crate::Error::Config("master.peers cannot be empty".into()));
                }
                if master.peers.iter().any(|p| p.trim().is_empty()) {
                    return Err(crate::Error::Config("master.peers contains an empty address".into()));
                }
                if master.min_ack_wait_ms == 0 {
                    return Err(crate::Error::Config("master.min_ack_wait_ms must be positive".into()));
                }
                if master.request_timeout_ms == 0 {
                    return Err(crate::Error::Config(
                        "master.request_timeout_ms must be positive".into(),
                    ));
                }
            }
            Role::Slave => {
                let slave = self.slave_config()?;
                if slave.master_address.is_empty() {
                    return Err(crate::Error::Config("slave.master_address cannot be empty".into()));
                }
                if slave.queue_capacity == 0 {
                    return Err(crate::Error::Config("slave.queue_capacity must be at least 1".into()));
                }
                if slave.request_timeout_ms == 0
                    || slave.poll_interval_ms == 0
                    || slave.retry_backoff_ms == 0
                {
                    return Err(crate::Error::Config(
                        "slave timeouts and intervals must be positive".into(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// The `[master]` section, or a config error when it is missing
    pub fn master_config(&self) -> crate::Result<&MasterConfig> {
        self.master
            .as_ref()
            .ok_or_else(|| crate::Error::Config("[master] section is required for the master role".into()))
    }

    /// The `[slave]` section, or a config error when it is missing
    pub fn slave_config(&self) -> crate::Result<&SlaveConfig> {
        self.slave
            .as_ref()
            .ok_or_else(|| crate::Error::Config("[slave] section is required for the slave role".into()))
    }

    /// Configured replica id, or a fresh random one when unset
    pub fn replica_id(&self) -> String {
        if self.node.replica_id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            self.node.replica_id.clone()
        }
    }

    /// Sample configuration written by `replog init`
    pub fn sample(role: Role) -> String {
        let role_section = match role {
            Role::Master => {
                r#"[master]
# Slave API addresses to push writes to
peers = ["127.0.0.1:8081"]
min_ack_wait_ms = 3000
request_timeout_ms = 5000
"#
            }
            Role::Slave => {
                r#"[slave]
master_address = "127.0.0.1:8080"
queue_capacity = 1000
request_timeout_ms = 5000
poll_interval_ms = 1000
retry_backoff_ms = 1000
"#
            }
        };

        let bind_address = match role {
            Role::Master => "0.0.0.0:8080",
            Role::Slave => "0.0.0.0:8081",
        };

        format!(
            r#"# Replog Configuration

[node]
role = "{role}"
bind_address = "{bind_address}"
# Leave empty to generate a random replica id at startup
replica_id = ""

[storage]
# "memory" or "file"
backend = "file"
path = "/var/lib/replog/log.bin"
fsync = true

{role_section}
[logging]
level = "info"
format = "pretty"
"#
        )
    }
}
