//! Agent configuration.
//!
//! A [`Config`] is built once at startup (defaults → optional YAML file → CLI
//! overrides), validated, and then passed by reference to every component.
//! Nothing reads configuration from globals.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_TABLE_PATH: &str = "/mappings.map";
pub const DEFAULT_REDIS_HOST: &str = "localhost";
pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_REDIS_CHANNEL: &str = "mappings_channel";
pub const DEFAULT_REDIS_KEY: &str = "mappings_key";
pub const DEFAULT_CONTROL_SOCKET: &str = "/var/run/haproxy.sock";
pub const DEFAULT_RELOAD_COMMAND: &str = "service haproxy reload";
pub const DEFAULT_OP_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Local table file loaded by the load balancer; also the map name used on
    /// the control socket.
    pub table_path: PathBuf,
    pub redis_host: String,
    pub redis_port: u16,
    /// Pub/sub channel carrying change requests.
    pub redis_channel: String,
    /// Hash holding the authoritative routing table.
    pub redis_key: String,
    /// Load balancer runtime API socket.
    pub control_socket: PathBuf,
    /// Shell command run once after the table file is seeded.
    pub reload_command: String,
    /// Log destination; stdout when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    pub log_json: bool,
    /// Deadline for each store call and control-socket connection.
    pub op_timeout_ms: u64,
    /// Period of the background reconciliation pass; `0` disables it.
    pub reconcile_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            table_path: PathBuf::from(DEFAULT_TABLE_PATH),
            redis_host: DEFAULT_REDIS_HOST.to_string(),
            redis_port: DEFAULT_REDIS_PORT,
            redis_channel: DEFAULT_REDIS_CHANNEL.to_string(),
            redis_key: DEFAULT_REDIS_KEY.to_string(),
            control_socket: PathBuf::from(DEFAULT_CONTROL_SOCKET),
            reload_command: DEFAULT_RELOAD_COMMAND.to_string(),
            log_path: None,
            log_json: false,
            op_timeout_ms: DEFAULT_OP_TIMEOUT_MS,
            reconcile_interval_secs: 0,
        }
    }
}

impl Config {
    /// Load a configuration file. Fields missing from the file keep their defaults.
    pub fn load_at(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Reject values the agent cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table_path.as_os_str().is_empty() {
            return Err(invalid("table_path", "must not be empty"));
        }
        if self.control_socket.as_os_str().is_empty() {
            return Err(invalid("control_socket", "must not be empty"));
        }
        if self.redis_host.trim().is_empty() {
            return Err(invalid("redis_host", "must not be empty"));
        }
        if self.redis_port == 0 {
            return Err(invalid("redis_port", "must be non-zero"));
        }
        if self.redis_channel.trim().is_empty() {
            return Err(invalid("redis_channel", "must not be empty"));
        }
        if self.redis_key.trim().is_empty() {
            return Err(invalid("redis_key", "must not be empty"));
        }
        if self.op_timeout_ms == 0 {
            return Err(invalid("op_timeout_ms", "must be non-zero"));
        }
        if self.table_path.to_string_lossy().contains(char::is_whitespace) {
            return Err(invalid(
                "table_path",
                "must not contain whitespace (it is sent on the control socket)",
            ));
        }
        Ok(())
    }

    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.redis_host, self.redis_port)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    pub fn reconcile_interval(&self) -> Option<Duration> {
        (self.reconcile_interval_secs > 0).then(|| Duration::from_secs(self.reconcile_interval_secs))
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
