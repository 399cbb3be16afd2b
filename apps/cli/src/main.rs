//! feedsync CLI — affiliate product feed synchronization.
//!
//! Triggers update and refresh runs for a site and manages the sites and
//! feeds stored in the local catalog database.

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
