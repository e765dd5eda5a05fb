//! Interior CLI: furniture conditions and product-data scraping.
//!
//! Discovers product URLs from site maps or pages, scrapes them to Markdown,
//! extracts product records with Gemini, and saves the results locally.

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
