//! Configuration flags shared by every subcommand, and `mapway config`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use mapway_core::Config;

/// `--config <file>` plus per-field overrides.
///
/// The original agent's flag names are accepted as aliases.
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// YAML configuration file; fields it omits keep their defaults.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Table file loaded by the load balancer (also the runtime map name).
    #[arg(long, global = true, alias = "iplistpath", value_name = "PATH")]
    pub table_path: Option<PathBuf>,

    /// Append logs to this file instead of stdout.
    #[arg(long, global = true, alias = "logpath", value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[arg(long, global = true, alias = "redishost", value_name = "HOST")]
    pub redis_host: Option<String>,

    #[arg(long, global = true, alias = "redisport", value_name = "PORT")]
    pub redis_port: Option<u16>,

    /// Pub/sub channel carrying change requests.
    #[arg(long, global = true, alias = "redischannel", value_name = "CHANNEL")]
    pub redis_channel: Option<String>,

    /// Hash holding the authoritative routing table.
    #[arg(long, global = true, alias = "rediskey", value_name = "KEY")]
    pub redis_key: Option<String>,

    /// Load balancer runtime API socket.
    #[arg(long, global = true, alias = "haproxysock", value_name = "PATH")]
    pub control_socket: Option<PathBuf>,

    /// Shell command run after the table file is seeded.
    #[arg(long, global = true, value_name = "COMMAND")]
    pub reload_command: Option<String>,

    /// Deadline for each store call and control-socket connection.
    #[arg(long, global = true, value_name = "MS")]
    pub op_timeout_ms: Option<u64>,

    /// Background reconciliation period; 0 disables it.
    #[arg(long, global = true, value_name = "SECS")]
    pub reconcile_interval_secs: Option<u64>,
}

impl ConfigArgs {
    /// Defaults, then the config file, then flags; validated.
    pub fn resolve(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_at(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(path) = &self.table_path {
            config.table_path = path.clone();
        }
        if let Some(path) = &self.log_path {
            config.log_path = Some(path.clone());
        }
        if self.log_json {
            config.log_json = true;
        }
        if let Some(host) = &self.redis_host {
            config.redis_host = host.clone();
        }
        if let Some(port) = self.redis_port {
            config.redis_port = port;
        }
        if let Some(channel) = &self.redis_channel {
            config.redis_channel = channel.clone();
        }
        if let Some(key) = &self.redis_key {
            config.redis_key = key.clone();
        }
        if let Some(socket) = &self.control_socket {
            config.control_socket = socket.clone();
        }
        if let Some(command) = &self.reload_command {
            config.reload_command = command.clone();
        }
        if let Some(ms) = self.op_timeout_ms {
            config.op_timeout_ms = ms;
        }
        if let Some(secs) = self.reconcile_interval_secs {
            config.reconcile_interval_secs = secs;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

pub fn show(config: &Config) -> Result<()> {
    let yaml = config
        .to_yaml()
        .context("failed to render configuration YAML")?;
    print!("{yaml}");
    Ok(())
}
