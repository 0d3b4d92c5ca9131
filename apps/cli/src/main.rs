//! docbundle CLI — generate llms.txt knowledge bundles from documentation sites.
//!
//! Maps a documentation site, scrapes each page as markdown, summarizes every
//! page with an LLM, and writes the aggregated llms.txt / llms-full.txt pair.

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
