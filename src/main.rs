//! shellcache - Manifest-reconciling content cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use shellcache::cli::commands::{self, Settings};
use shellcache::cli::{Cli, Commands};
use shellcache::config::{Config, ConfigManager};
use shellcache::error::ShellcacheResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

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

async fn run() -> ShellcacheResult<()> {
    let cli = Cli::parse();

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config);
    debug!("Loaded config from {}", config_manager.path().display());

    ConfigManager::ensure_state_dirs().await?;

    let settings = Settings::new(config, cli.bundle, cli.origin);

    match cli.command {
        Commands::Manifest(args) => commands::manifest(args, &settings).await,
        Commands::Install => commands::install(&settings).await,
        Commands::Activate => commands::activate(&settings).await,
        Commands::Update => commands::update(&settings).await,
        Commands::Fetch(args) => commands::fetch(args, &settings).await,
        Commands::Sync => commands::sync(&settings).await,
        Commands::Message(args) => commands::message(args, &settings).await,
        Commands::Status => commands::status(&settings).await,
        Commands::Clear(args) => commands::clear(args, &settings).await,
        Commands::Config(args) => commands::config(args, &settings, &config_manager).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug; `RUST_LOG` is not consulted
fn init_logging(verbose: u8, config: &Config) {
    let filter = match verbose {
        0 => EnvFilter::new("shellcache=warn"),
        1 => EnvFilter::new("shellcache=info"),
        _ => EnvFilter::new("shellcache=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
