//! margie: genome annotation pipeline driver
//!
//! Discovers and validates FASTA inputs, hands them to a Snakemake workflow,
//! and loads the resulting annotations into a queryable SQLite store.

mod app;
mod cli;
mod data;
mod fasta;
mod pipeline;

use anyhow::Result;
use cli::{AppConfig, Cli};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::from_cli(cli)?;
    app::run(config)
}
