//! `mapway run`: the long-running agent.

use anyhow::{Context, Result};

use mapway_core::Config;
use mapway_daemon::start_blocking;

pub fn run(config: Config) -> Result<()> {
    start_blocking(config).context("mapway agent exited with error")
}
