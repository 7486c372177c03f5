//! noirmap CLI: turn a repository's HTTP endpoints into a Postman collection.
//!
//! Endpoints are discovered with OWASP Noir, described by an LLM, and written
//! as a Postman v2.1 collection.

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
