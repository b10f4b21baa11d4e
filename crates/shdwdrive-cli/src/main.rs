//! shdwdrive CLI - Command-line interface for shdwdrive storage
//!
//! Provides commands for:
//! - Listing, locating and downloading the files of a storage account
//! - Waiting until a file appears in or disappears from an account
//! - Estimating the cost of reserving storage
//! - Viewing and validating configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    config::ConfigCommand,
    cost::CostCommand,
    files::{GetCommand, LsCommand, UrlCommand},
    wait::WaitCommand,
};
use output::{get_formatter, OutputFormat, OutputFormatter};
use shdwdrive_core::config::Config;

#[derive(Debug, Parser)]
#[command(name = "shdwdrive", version, about = "Decentralized storage account client")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the files of a storage account
    Ls(LsCommand),
    /// Print the CDN URL of a file
    Url(UrlCommand),
    /// Download a file
    Get(GetCommand),
    /// Wait until a file appears in (or disappears from) an account
    Wait(WaitCommand),
    /// Estimate the cost of reserving storage
    Cost(CostCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Settings shared by every command
pub struct CliContext {
    pub format: OutputFormat,
    pub config: Config,
    pub config_path: PathBuf,
    pub quiet: bool,
}

impl CliContext {
    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format, self.quiet)
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, config_path) = match &cli.config {
        Some(path) => (
            Config::load(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            path.clone(),
        ),
        None => {
            let path = Config::default_path();
            (Config::load_or_default(&path), path)
        }
    };

    // Setup tracing
    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "warn",
        (false, 0) => config.logging.level.as_str(),
        (false, 1) => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let ctx = CliContext {
        format,
        config,
        config_path,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Ls(cmd) => cmd.execute(&ctx).await,
        Commands::Url(cmd) => cmd.execute(&ctx).await,
        Commands::Get(cmd) => cmd.execute(&ctx).await,
        Commands::Wait(cmd) => cmd.execute(&ctx).await,
        Commands::Cost(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
    }
}
