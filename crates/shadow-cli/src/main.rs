//! shadow-manager-cli - Operator command-line interface for the device
//! shadow manager
//!
//! Provides commands for:
//! - Inspecting a shadow document directly from the local store
//! - Forcing a full sync of a shadow against the cloud
//! - Viewing, setting, and validating the daemon's configuration

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::config::ConfigCommand;
use commands::shadow::ShadowCommand;
use commands::sync::SyncCommand;
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "shadow-manager-cli", version, about = "Operator CLI for the device shadow manager")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Inspect shadow documents in the local store
    #[command(subcommand)]
    Shadow(ShadowCommand),
    /// Force a full sync of a shadow against the cloud
    #[command(subcommand)]
    Sync(SyncCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();

    let format = if cli.json { OutputFormat::Json } else { OutputFormat::Human };

    match cli.command {
        Commands::Shadow(cmd) => cmd.execute(format).await,
        Commands::Sync(cmd) => cmd.execute(format).await,
        Commands::Config(cmd) => cmd.execute(format).await,
    }
}
