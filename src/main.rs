//! hotswap - manifest publisher and follower.

use anyhow::{Context, Result};
use clap::{ColorChoice, Parser};
use hotswap::cli::{self, Cli, Commands};
use hotswap::config::HotswapConfig;
use hotswap::{core, logger};

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let config = HotswapConfig::load(&cli)?;

    match &cli.command {
        Commands::Inspect { manifest } => cli::inspect::run(&config, manifest.as_deref()),
        Commands::Publish { args } => block_on(cli::publish::run(&config, args.watch)),
        Commands::Follow { args } => block_on(cli::follow::run(&config, args)),
    }
}

fn block_on<F: Future<Output = Result<()>>>(future: F) -> Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?
        .block_on(future)
}
