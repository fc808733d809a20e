//! crashline CLI - Inspect and drive the crash report lifecycle
//!
//! Provides commands for:
//! - Listing, viewing and deleting queued crash reports
//! - Viewing and resetting the stored send consent
//! - Processing the queue and handing reports off
//! - Triggering a test crash
//! - Showing and validating configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crashline_core::config::Config;

mod commands;
mod output;

use commands::{
    config::ConfigCommand, consent::ConsentCommand, process::ProcessCommand,
    reports::ReportsCommand, status::StatusCommand, test_crash::TestCrashCommand,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "crashline", version, about = "Crash report lifecycle manager")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage queued crash reports
    #[command(subcommand)]
    Reports(ReportsCommand),
    /// View or change the stored send consent
    #[command(subcommand)]
    Consent(ConsentCommand),
    /// Show crash storage and capture status
    Status(StatusCommand),
    /// Process queued crash reports now
    Process(ProcessCommand),
    /// Crash this process to exercise the pipeline
    TestCrash(TestCrashCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Loads the configuration named on the command line, or the default one.
///
/// An explicit path must exist and parse; the default path falls back to
/// built-in defaults.
fn load_config(path: Option<&PathBuf>) -> Result<(PathBuf, Config)> {
    match path {
        Some(path) => {
            let config = Config::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            Ok((path.clone(), config))
        }
        None => {
            let path = Config::default_path();
            let config = Config::load_or_default(&path);
            Ok((path, config))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config_path, config) = load_config(cli.config.as_ref())?;

    // Setup tracing
    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
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

    match cli.command {
        Commands::Reports(cmd) => cmd.execute(&config, format).await,
        Commands::Consent(cmd) => cmd.execute(&config, format).await,
        Commands::Status(cmd) => cmd.execute(&config, format).await,
        Commands::Process(cmd) => cmd.execute(&config, format).await,
        Commands::TestCrash(cmd) => cmd.execute(&config, format).await,
        Commands::Config(cmd) => cmd.execute(&config_path, &config, format).await,
    }
}
