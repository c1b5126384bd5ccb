//! CLI command definitions
//!
//! Defines the clap commands for the scenario CLI.

use clap::Subcommand;
use std::path::PathBuf;

use crate::common::parse_key_value;

#[derive(Subcommand)]
pub enum Commands {
    /// Run scenarios and report the outcome
    Run {
        /// Scenario files or directories (searched for .yaml/.yml)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Only run scenarios carrying this tag (repeatable; any match runs)
        #[arg(long, short)]
        tag: Vec<String>,

        /// Only run scenarios whose name contains this text
        #[arg(long, short)]
        name: Option<String>,

        /// Placeholder value, overriding the scenario's vars: --var brand_id=42
        #[arg(long = "var", value_parser = parse_key_value)]
        vars: Vec<(String, String)>,

        /// Also write the report as JSON to this file
        #[arg(long)]
        json: Option<PathBuf>,

        /// Also save the JSON report under the data directory
        #[arg(long)]
        save: bool,

        /// API base URL (overrides config)
        #[arg(long)]
        base_url: Option<String>,

        /// Maximum scenarios in flight (overrides config)
        #[arg(long, short = 'j')]
        concurrency: Option<usize>,

        /// Config file to use instead of the default location
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Load and validate scenarios without running them
    Validate {
        /// Scenario files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Placeholder value: --var brand_id=42
        #[arg(long = "var", value_parser = parse_key_value)]
        vars: Vec<(String, String)>,

        /// Config file to use instead of the default location
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List configured roles and their capabilities
    Roles {
        /// Only list roles granting this capability
        #[arg(long)]
        capability: Option<String>,

        /// Config file to use instead of the default location
        #[arg(long)]
        config: Option<PathBuf>,
    },
}
