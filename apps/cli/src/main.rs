//! aidigest CLI: daily AI industry news collection and analysis.
//!
//! Fetches from the configured sources, keeps the most important items per
//! source kind, stores them, and turns each into a scored insight.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
