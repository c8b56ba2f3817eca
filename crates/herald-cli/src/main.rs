//! Herald CLI - inspect and exercise throttled platform queues
//!
//! # Usage
//!
//! ```bash
//! # Show the queue configuration picked up from the environment
//! herald config
//!
//! # Push five posts through a mock client, failing the first two attempts
//! herald simulate --ops 5 --fail-first 2 --fast
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

mod commands;

use commands::{config, simulate};

/// Herald - paced access to rate-limited social platforms
#[derive(Parser)]
#[command(
    name = "herald",
    version,
    about = "Herald CLI - throttled social platform queues",
    long_about = "Herald runs every outbound platform call through a per-account queue.\n\n\
                  Calls are spaced out after success and backed off\n\
                  exponentially after failure."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the effective queue configuration
    #[command(name = "config")]
    Config(config::ConfigArgs),

    /// Run mock posts through a throttled client
    #[command(name = "simulate")]
    Simulate(simulate::SimulateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    match cli.command {
        Commands::Config(args) => config::run(args),
        Commands::Simulate(args) => simulate::run(args).await,
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();
}

/// Print a success message with a checkmark
pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// Print an error message with an X
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("{} {}", "⚠".yellow().bold(), msg);
}
