//! CLI command definitions
//!
//! Defines the clap commands for the hooktest CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run a suite against its API and report the outcome
    Run {
        /// Path to the JSON or YAML suite file
        suite: PathBuf,

        /// Verbose output
        #[arg(long, short)]
        verbose: bool,

        /// Write a JSON report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Check a suite file without sending any requests
    Validate {
        /// Path to the JSON or YAML suite file
        suite: PathBuf,
    },
}

impl Commands {
    pub fn verbose(&self) -> bool {
        matches!(self, Commands::Run { verbose: true, .. })
    }
}
