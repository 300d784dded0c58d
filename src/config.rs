use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::trace;

use crate::DeviceId;
use crate::storage::Period;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./metrics.db")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    #[serde(default)]
    pub monitor: MonitorSettings,

    #[serde(default)]
    pub protocol: ProtocolSettings,

    /// Storage configuration (defaults to SQLite)
    #[serde(default)]
    pub storage: StorageConfig,

    /// Where state change alerts go; log only when absent
    pub alert: Option<Alert>,

    /// Reconcile every device once after start
    #[serde(default)]
    pub sync_on_start: bool,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DeviceConfig {
    pub id: DeviceId,
    pub name: String,
    pub host: Ipv4Addr,
    #[serde(default = "crate::util::get_default_command_port")]
    pub port: u16,
    #[serde(default = "crate::util::get_default_status_port")]
    pub status_port: u16,
}

/// Timing of the per-device monitors and the history pruner.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitorSettings {
    /// Seconds between liveness probes
    #[serde(default = "default_alive_interval")]
    pub alive_interval: u64,

    /// Seconds between load samples
    #[serde(default = "default_load_interval")]
    pub load_interval: u64,

    /// Consecutive disagreeing probes needed to flip the state
    #[serde(default = "default_stability_threshold")]
    pub stability_threshold: u32,

    /// Attempts per load sample on transport errors
    #[serde(default = "default_load_retries")]
    pub load_retries: u32,

    /// Seconds between history pruning runs
    #[serde(default = "default_prune_interval")]
    pub prune_interval: u64,

    /// History older than this is pruned
    #[serde(default = "default_retention")]
    pub retention: Period,
}

impl MonitorSettings {
    pub fn alive_period(&self) -> Duration {
        Duration::from_secs(self.alive_interval.max(1))
    }

    pub fn load_period(&self) -> Duration {
        Duration::from_secs(self.load_interval.max(1))
    }

    pub fn prune_period(&self) -> Duration {
        Duration::from_secs(self.prune_interval.max(1))
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            alive_interval: default_alive_interval(),
            load_interval: default_load_interval(),
            stability_threshold: default_stability_threshold(),
            load_retries: default_load_retries(),
            prune_interval: default_prune_interval(),
            retention: default_retention(),
        }
    }
}

fn default_alive_interval() -> u64 {
    3
}

fn default_load_interval() -> u64 {
    5
}

fn default_stability_threshold() -> u32 {
    2
}

fn default_load_retries() -> u32 {
    3
}

fn default_prune_interval() -> u64 {
    30 * 60
}

fn default_retention() -> Period {
    Period::Week
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProtocolSettings {
    /// Timeout in seconds for one device request, also applied to each status fetch attempt
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl ProtocolSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.max(1))
    }
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    5
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alert {
    Webhook(Webhook),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
}

pub fn read_config_file(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    parse_config(&file_content)
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
