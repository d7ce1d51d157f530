//! ramlpreparer CLI: turn RAML API references into content envelopes.
//!
//! Renders each RAML source to HTML with `raml2html`, then writes one JSON
//! envelope per document for the content submitter.

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
