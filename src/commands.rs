//! CLI command definitions
//!
//! Defines the clap commands for the test driver CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run a test table
    Run {
        /// Path to the script to run
        script: PathBuf,

        #[command(flatten)]
        sources: SourceArgs,

        /// Engines to dispatch to, in order: 'shell' or 'remote:<name>'
        /// Can be specified multiple times: --engine remote:web --engine shell
        #[arg(long = "engine", short = 'e', default_value = "shell")]
        engines: Vec<String>,

        /// Wait for Enter at every debug pause instead of logging it
        #[arg(long, short)]
        interactive: bool,
    },

    /// Serve the shell engine on a local socket for remote drivers
    Engine {
        /// Socket name drivers connect to with --engine remote:<name>
        #[arg(long, default_value = "shell")]
        name: String,
    },

    /// Inspect the configuration chain
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the value the chain resolves for Section/Item
    Get {
        section: String,
        item: String,

        #[command(flatten)]
        sources: SourceArgs,
    },

    /// List every store in the chain, highest priority first
    Paths {
        #[command(flatten)]
        sources: SourceArgs,
    },
}

/// Options that build the configuration chain
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Extra configuration file, searched after command-line overrides
    /// Can be specified multiple times; earlier files win
    #[arg(long = "config", short = 'c')]
    pub configs: Vec<PathBuf>,

    /// Override a value: --set Driver.Debug=1
    #[arg(long = "set", value_name = "SECTION.ITEM=VALUE")]
    pub overrides: Vec<String>,
}
