//! `mapway publish`: push one change request onto the channel.

use anyhow::{Context, Result};
use clap::Subcommand;

use mapway_core::{ChangeRequest, Config};
use mapway_daemon::publish_blocking;

#[derive(Subcommand, Debug)]
pub enum PublishCommand {
    /// Request that `key` be routed to `value`.
    Add { key: String, value: String },
    /// Request that `key` be removed.
    Remove { key: String },
}

impl PublishCommand {
    fn into_request(self) -> ChangeRequest {
        match self {
            PublishCommand::Add { key, value } => ChangeRequest::add(key, value),
            PublishCommand::Remove { key } => ChangeRequest::remove(key),
        }
    }
}

pub fn run(config: &Config, command: PublishCommand) -> Result<()> {
    let request = command.into_request();
    let receivers = publish_blocking(config, &request).with_context(|| {
        format!(
            "failed to publish on '{}' at {}",
            config.redis_channel,
            config.redis_url()
        )
    })?;
    println!(
        "published {} '{}' to {} subscriber(s)",
        request.action, request.key, receivers
    );
    Ok(())
}
