//! vmprobe CLI entry point

use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use vmprobe::cli::{Cli, Commands};
use vmprobe::config::ConfigManager;
use vmprobe::error::InspectResult;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> InspectResult<()> {
    let cli = Cli::parse();

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = config_manager.load().await?;

    // 0 = warn (spinner only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("vmprobe=warn"),
        1 => EnvFilter::new("vmprobe=info"),
        _ => EnvFilter::new("vmprobe=debug"),
    };

    // stdout carries reports, so logs go to stderr
    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .init();
    }
    debug!("Loaded config from {}", config_manager.path().display());

    match cli.command {
        Commands::Inspect(args) => vmprobe::cli::commands::inspect(args, &config).await,
        Commands::Config(args) => {
            vmprobe::cli::commands::config(args, &config_manager, &config).await
        }
    }
}
