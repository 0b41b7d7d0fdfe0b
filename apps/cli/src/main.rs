//! spiderpool CLI: seed content sources and generate spider-pool pages.
//!
//! Script entry point over the core generation pipeline; every command
//! operates on a local libSQL database.

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
