//! `mapway reconcile`: one repair pass, report printed as JSON.

use anyhow::{Context, Result};

use mapway_core::Config;
use mapway_daemon::reconcile_blocking;

pub fn run(config: &Config) -> Result<()> {
    let report = reconcile_blocking(config).context("reconciliation failed")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to render reconcile report JSON")?
    );
    Ok(())
}
