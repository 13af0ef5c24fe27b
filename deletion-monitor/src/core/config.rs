/*!
Configuration management for the deletion monitor
*/

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{
    error::{MonitorError, Result},
    store::is_valid_table_name,
};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Directory to watch and where alerts go
    pub watch: WatchConfig,
    /// Where delete records come from
    pub source: SourceConfig,
    /// Webhook payload settings
    pub notifier: NotifierConfig,
    /// Optional durable event log
    pub persistence: PersistenceConfig,
    /// Log retrieval and tick service
    pub server: ServerConfig,
}

/// The watch target. Fixed for the process lifetime.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchConfig {
    pub path: PathBuf,
    pub webhook_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Audit rule key used for both registration and search
    pub audit_key: String,
    /// ausearch checkpoint file; `None` searches the recent window every poll
    pub checkpoint_path: Option<PathBuf>,
    /// Delay between the end of one cycle and the start of the next
    pub poll_interval_secs: u64,
    /// Timeout for each external tool invocation
    pub command_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Linux audit subsystem via auditctl/ausearch
    Audit,
    /// Kernel file-change notifications
    Notify,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Sender label shown by the receiving channel
    pub username: String,
    /// Event classification label
    pub event_name: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub database_path: PathBuf,
    pub table_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Timeout for each remote site query during a tick
    pub fetch_timeout_secs: u64,
}

/// Values supplied on the command line or through the environment.
/// Each one, when present, wins over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub watch_path: Option<PathBuf>,
    pub webhook_url: Option<String>,
    pub database_path: Option<PathBuf>,
    pub poll_interval_secs: Option<u64>,
    pub source_kind: Option<SourceKind>,
    pub audit_key: Option<String>,
    pub bind_addr: Option<SocketAddr>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./watched"),
            webhook_url: "http://localhost:5000/slack-webhook".to_string(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Audit,
            audit_key: "file_delete".to_string(),
            checkpoint_path: dirs::data_local_dir()
                .map(|dir| dir.join("deletion-monitor").join("ausearch.checkpoint")),
            poll_interval_secs: 10,
            command_timeout_secs: 15,
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            username: "File Monitor".to_string(),
            event_name: "deletion".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            database_path: PathBuf::from("./deletion_logs.db"),
            table_name: "deletion_logs".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            fetch_timeout_secs: 10,
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audit" | "auditd" => Ok(Self::Audit),
            "notify" | "inotify" => Ok(Self::Notify),
            other => Err(MonitorError::Config(format!("unknown log source `{}`", other))),
        }
    }
}

impl MonitorConfig {
    /// Loads a TOML config file. Missing sections fall back to defaults.
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Applies command line and environment values on top of this config
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(path) = overrides.watch_path {
            self.watch.path = path;
        }
        if let Some(url) = overrides.webhook_url {
            self.watch.webhook_url = url;
        }
        if let Some(database_path) = overrides.database_path {
            self.persistence.database_path = database_path;
            self.persistence.enabled = true;
        }
        if let Some(secs) = overrides.poll_interval_secs {
            self.source.poll_interval_secs = secs;
        }
        if let Some(kind) = overrides.source_kind {
            self.source.kind = kind;
        }
        if let Some(key) = overrides.audit_key {
            self.source.audit_key = key;
        }
        if let Some(addr) = overrides.bind_addr {
            self.server.bind_addr = addr;
        }
    }

    /// Rejects values that would make the monitor misbehave at runtime
    pub fn validate(&self) -> Result<()> {
        if self.watch.webhook_url.trim().is_empty() {
            return Err(MonitorError::Config("webhook URL must not be empty".to_string()));
        }
        if self.source.poll_interval_secs == 0 {
            return Err(MonitorError::Config("poll interval must be at least one second".to_string()));
        }
        if self.source.audit_key.trim().is_empty() {
            return Err(MonitorError::Config("audit key must not be empty".to_string()));
        }
        if !is_valid_table_name(&self.persistence.table_name) {
            return Err(MonitorError::Config(format!(
                "invalid table name `{}`",
                self.persistence.table_name
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.source.poll_interval_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.source.command_timeout_secs.max(1))
    }
}
