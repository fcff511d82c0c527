//! Mapway: keeps a load balancer's routing map in step with a Redis hash.
//!
//! # Usage
//!
//! ```text
//! mapway [--config <file>] [overrides...] run
//! mapway publish add <key> <value>
//! mapway publish remove <key>
//! mapway reconcile
//! mapway config
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{config::ConfigArgs, publish::PublishCommand};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "mapway",
    version,
    about = "Sync a load balancer's routing map with a shared Redis hash",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the agent in the foreground: seed the table file, reload, apply changes.
    Run,

    /// Publish a change request onto the change channel.
    Publish {
        #[command(subcommand)]
        command: PublishCommand,
    },

    /// Rebuild the table file and live map from the store once, then exit.
    Reconcile,

    /// Print the effective configuration as YAML.
    Config,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config.resolve()?;
    match cli.command {
        Commands::Run => commands::run::run(config),
        Commands::Publish { command } => commands::publish::run(&config, command),
        Commands::Reconcile => commands::reconcile::run(&config),
        Commands::Config => commands::config::show(&config),
    }
}
