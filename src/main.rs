//! Test driver CLI
//!
//! Runs test tables against one or more execution engines, and serves the
//! bundled shell engine to remote drivers.

use clap::Parser;
use commands::Commands;
use testdriver::common::logging;
use testdriver::{cli, commands};

#[derive(Parser)]
#[command(name = "testdriver", about = "Keyword-driven test table driver")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Engine { name } => {
            if let Some(log_file) = logging::init_engine(name) {
                tracing::info!("Logging to {}", log_file.display());
            }
        }
        _ => logging::init_cli(),
    }

    if let Err(e) = cli::dispatch(cli.command).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
