//! frontkit: front-end build pipeline driving external tools.

mod cli;
mod config;
mod orchestrator;
mod output;

use clap::Parser;
use cli::Args;
use miette::{IntoDiagnostic, Result};
use std::io::Write;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_level()));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    tracing::debug!(?args, "parsed arguments");

    let summary = orchestrator::run(args).await.into_diagnostic()?;
    if summary.has_errors() {
        let _ = std::io::stdout().flush();
        std::process::exit(1);
    }
    Ok(())
}
