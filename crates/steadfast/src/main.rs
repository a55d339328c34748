//! Steadfast CLI - Run commands under retry and backoff policies
//!
//! This is the main entry point for the Steadfast command-line interface.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use steadfast_core::telemetry::{self, TelemetryConfig};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI args
    let cli = Cli::parse();

    // Initialize tracing
    telemetry::init(TelemetryConfig {
        verbosity: cli.verbose,
        quiet: cli.quiet,
        format: cli.log_format,
    });

    // Run command
    match cli.command {
        Commands::Run(args) => commands::run::run(args, cli.config.as_deref()).await,
        Commands::Policy(cmd) => commands::policy::run(cmd, cli.config.as_deref()),
    }
}
