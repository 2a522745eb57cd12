//! beacon CLI entry point.
//!
//! Binary name: `beacon`
//!
//! Parses CLI arguments, initializes tracing, resolves the configuration,
//! then dispatches to the selected command.

mod cli;
mod output;

use anyhow::Context;
use clap::Parser;
use clap_complete::generate;

use beacon_infra::config::load_config;
use beacon_observe::tracing_setup::{init_tracing, shutdown_tracing, verbosity_filter};
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(verbosity_filter(cli.quiet, cli.verbose), cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = dispatch(cli).await;
    shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    // Shell completions don't need a configuration
    let overrides = match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(shell, &mut cmd, "beacon", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Run { ref overrides } | Commands::Config { ref overrides } => overrides.clone(),
    };

    let loaded = load_config(cli.config.as_deref()).await?;
    let source = loaded.source;
    let mut config = loaded.config;
    overrides.apply(&mut config);
    config
        .validate()
        .with_context(|| format!("invalid configuration (from {source})"))?;
    tracing::debug!(%source, "configuration resolved");

    match cli.command {
        Commands::Config { .. } => cli::config::show_config(&config, &source, cli.json),
        Commands::Run { .. } => cli::run::run_bot(config, cli.json).await,
        Commands::Completions { .. } => unreachable!("handled above"),
    }
}
