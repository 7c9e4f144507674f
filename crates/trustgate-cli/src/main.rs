// crates/trustgate-cli/src/main.rs
//
// CLI entrypoint for the TrustGate operator tools.
//
// Provides one-shot subcommands for running the aggregator, signing and
// checking wire messages offline, recording observations, and viewing the
// network map.

mod commands;
mod output;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use commands::aggregate::AggregateCmd;
use commands::check::CheckCmd;
use commands::map::MapCmd;
use commands::record::RecordCmd;
use commands::sign::SignCmd;
use output::OutputFormat;

/// TrustGate CLI: trust aggregation and message verification tools.
#[derive(Parser, Debug)]
#[command(
    name = "trustgate",
    version = "0.1.0",
    about = "TrustGate CLI for trust-weighted signer-chain verification"
)]
struct Cli {
    /// Print JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Aggregate broker stores into the network map.
    Aggregate(AggregateCmd),

    /// Produce a tagged wire message.
    Sign(SignCmd),

    /// Run the admission pipeline over newline-delimited messages.
    Check(CheckCmd),

    /// Record one observation in a broker's store.
    Record(RecordCmd),

    /// Display the network map.
    Map(MapCmd),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Library warnings (skipped stores, discarded lines) go to stderr so
    // stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let format = OutputFormat::from_flag(cli.json);

    match &cli.command {
        Commands::Aggregate(cmd) => {
            if let Err(e) = commands::aggregate::run(cmd, format) {
                tracing::error!("Aggregation failed: {}", e);
                std::process::exit(commands::aggregate::exit_code(&e));
            }
        }
        Commands::Sign(cmd) => commands::sign::run(cmd)?,
        Commands::Check(cmd) => commands::check::run(cmd, format)?,
        Commands::Record(cmd) => commands::record::run(cmd, format)?,
        Commands::Map(cmd) => commands::map::run(cmd, format)?,
    }

    Ok(())
}

/// Expand a leading `~/` to the user's home directory.
pub(crate) fn expand_path(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
