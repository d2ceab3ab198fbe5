//! Innsikt CLI entry point.

use anyhow::Result;
use clap::Parser;
use innsikt::cli::commands::{self, ExtractOptions};
use innsikt::cli::{Cli, Commands};
use innsikt::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = match &cli.config {
        Some(path) => Settings::expand_path(path),
        None => Settings::default_config_path(),
    };
    let settings = Settings::load_from(Some(&config_path))?;

    // Initialize logging
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("innsikt={}", log_level)),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    std::fs::create_dir_all(settings.data_dir())?;

    // Execute command
    match cli.command {
        Commands::Extract {
            inputs,
            output,
            fresh,
            concurrency,
            unit_timeout,
            threshold,
        } => {
            let options = ExtractOptions {
                inputs,
                output,
                fresh,
                concurrency,
                unit_timeout,
                threshold,
            };
            commands::run_extract(options, settings).await?;
        }

        Commands::Checkpoints { action } => {
            commands::run_checkpoints(&action, settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(&action, settings, &config_path)?;
        }
    }

    Ok(())
}
