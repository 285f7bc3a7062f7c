//! hooktest - end-to-end tests for HTTP APIs with webhook callbacks
//!
//! Runs suites of HTTP steps against a live API, capturing response values
//! for later steps and waiting for the signed callbacks the API sends back.

use clap::Parser;
use hooktest::common::logging;
use hooktest::{cli, commands};
use commands::Commands;

#[derive(Parser)]
#[command(name = "hooktest", about = "End-to-end tester for webhook-driven HTTP APIs")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::init_cli(cli.command.verbose());

    if let Err(e) = cli::dispatch(cli.command).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
