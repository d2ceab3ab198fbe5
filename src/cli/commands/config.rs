//! Config command implementation.

use crate::cli::{ConfigAction, Output};
use crate::config::Settings;
use anyhow::{Context, Result};
use std::path::Path;

/// Run the config command against the file at `config_path`.
pub fn run_config(action: &ConfigAction, settings: Settings, config_path: &Path) -> Result<()> {
    match action {
        ConfigAction::Show => {
            if !config_path.exists() {
                Output::info("No config file yet; showing defaults.");
            }
            let rendered =
                toml::to_string_pretty(&settings).context("Failed to serialize config")?;
            println!("{}", rendered);
        }
        ConfigAction::Edit => edit(&settings, config_path)?,
        ConfigAction::Path => println!("{}", config_path.display()),
    }
    Ok(())
}

/// Open the config in `$EDITOR`, writing defaults first when missing, and
/// check that the result still loads.
fn edit(settings: &Settings, config_path: &Path) -> Result<()> {
    if !config_path.exists() {
        settings.save_to(&config_path.to_path_buf())?;
        Output::info(&format!("Created default config at {}", config_path.display()));
    }

    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vim".to_string());
    let status = std::process::Command::new(&editor)
        .arg(config_path)
        .status()
        .with_context(|| format!("Failed to open {} with {}", config_path.display(), editor))?;

    if !status.success() {
        Output::warning("Editor exited with non-zero status.");
        return Ok(());
    }

    match Settings::load_from(Some(&config_path.to_path_buf())) {
        Ok(_) => Output::success("Config saved."),
        Err(e) => Output::warning(&format!("Config saved but will not load: {}", e)),
    }
    Ok(())
}
