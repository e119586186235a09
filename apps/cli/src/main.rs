//! oncall-report CLI: on-call summaries from Datadog incidents and PagerDuty pages.
//!
//! Generates a Markdown report for one or more teams over a date range and
//! optionally publishes it to Confluence.

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
