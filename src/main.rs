//! Scenario CLI - declarative HTTP and UI assertions for a storefront
//!
//! Runs YAML scenarios against the API and storefront and reports which
//! expectations held.

use clap::Parser;
use commands::Commands;
use scenario::common::logging;
use scenario::{cli, commands};

#[derive(Parser)]
#[command(name = "scenario", about = "Declarative HTTP and UI scenario runner")]
#[command(version, long_about = None)]
struct Cli {
    /// Verbose logging (same as RUST_LOG=scenario=debug)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_cli(cli.verbose);

    match cli::dispatch(cli.command).await {
        Ok(outcome) => std::process::exit(outcome.exit_code()),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    }
}
