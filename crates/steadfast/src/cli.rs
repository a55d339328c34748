//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use steadfast_core::telemetry::LogFormat;

/// Steadfast - Run commands under retry and backoff policies
#[derive(Parser, Debug)]
#[command(name = "steadfast")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a policies.yaml file
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Log line encoding (text or json)
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a command, retrying it while it fails
    Run(RunArgs),

    /// Inspect retry policies
    #[command(subcommand)]
    Policy(PolicyCommands),
}

// Run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Named policy (default policy if omitted)
    #[arg(short, long)]
    pub policy: Option<String>,

    /// Maximum number of attempts
    #[arg(long, conflicts_with = "unbounded")]
    pub max_attempts: Option<u32>,

    /// Retry until success or Ctrl-C
    #[arg(long)]
    pub unbounded: bool,

    /// Exponential backoff scale, in seconds
    #[arg(long)]
    pub multiplier: Option<f64>,

    /// Shortest wait between attempts, in seconds
    #[arg(long)]
    pub min_wait: Option<f64>,

    /// Longest wait between attempts, in seconds
    #[arg(long)]
    pub max_wait: Option<f64>,

    /// Fixed wait for unbounded retry, in seconds
    #[arg(long)]
    pub retry_delay: Option<f64>,

    /// Exit 0 even if every attempt fails
    #[arg(long, conflicts_with = "unbounded")]
    pub absorb: bool,

    /// Command and its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

// Policy commands
#[derive(Subcommand, Debug)]
pub enum PolicyCommands {
    /// Show a resolved policy
    Show(PolicyShowArgs),

    /// List named policies
    List,

    /// Show the wait before each retry
    Schedule(PolicyScheduleArgs),
}

#[derive(Args, Debug)]
pub struct PolicyShowArgs {
    /// Policy name (default policy if omitted)
    pub name: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct PolicyScheduleArgs {
    /// Policy name (default policy if omitted)
    pub name: Option<String>,

    /// Number of attempts to plan for (defaults to the policy bound)
    #[arg(short, long)]
    pub attempts: Option<u32>,
}
