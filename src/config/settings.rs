//! Configuration settings for Innsikt.

use crate::error::{InnsiktError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub extraction: ExtractionSettings,
    pub sentiment: SentimentSettings,
    pub checkpoint: CheckpointSettings,
    pub cache: CacheSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.innsikt".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Knowledge extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// Model used for the combined extraction call.
    pub model: String,
    /// Model used for the degraded fallback call. Defaults to `model`.
    pub fallback_model: Option<String>,
    /// Maximum number of units processed concurrently.
    pub max_concurrent_units: usize,
    /// Per-unit timeout in seconds.
    pub unit_timeout_seconds: u64,
    /// Optional hard cap on an episode's whole batch, in seconds.
    pub batch_timeout_seconds: Option<u64>,
    /// Failure ratio above which an episode is considered failed.
    pub failure_threshold: f64,
    /// Number of preceding units passed to the model as context.
    pub context_units: usize,
    /// Sampling temperature for extraction requests.
    pub temperature: f32,
    /// HTTP timeout for a single request to the reasoning service.
    pub request_timeout_seconds: u64,
    /// Attempt a lighter extraction when the combined response is malformed.
    pub fallback_enabled: bool,
    /// Request JSON-object responses from the service when it supports them.
    pub structured_output: bool,
    /// Show a progress bar while collecting results.
    pub show_progress: bool,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            fallback_model: None,
            max_concurrent_units: 5,
            unit_timeout_seconds: 300,
            batch_timeout_seconds: None,
            failure_threshold: 0.5,
            context_units: 1,
            temperature: 0.2,
            request_timeout_seconds: 300,
            fallback_enabled: true,
            structured_output: true,
            show_progress: true,
        }
    }
}

impl ExtractionSettings {
    /// Model for the fallback path.
    pub fn fallback_model(&self) -> &str {
        self.fallback_model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.model)
    }
}

/// Numeric convention for sentiment scores.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SentimentScale {
    /// Scores in [-1.0, 1.0], 0.0 is neutral.
    #[default]
    Bipolar,
    /// Scores in [0.0, 1.0], 0.5 is neutral.
    Unit,
}

impl std::str::FromStr for SentimentScale {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bipolar" | "signed" => Ok(SentimentScale::Bipolar),
            "unit" | "unsigned" => Ok(SentimentScale::Unit),
            _ => Err(format!("Unknown sentiment scale: {}", s)),
        }
    }
}

impl std::fmt::Display for SentimentScale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SentimentScale::Bipolar => write!(f, "bipolar"),
            SentimentScale::Unit => write!(f, "unit"),
        }
    }
}

/// Sentiment normalization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct SentimentSettings {
    /// Range convention expected by the downstream consumer.
    pub scale: SentimentScale,
}

/// Checkpoint storage backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointProvider {
    /// One JSON file per episode (default).
    #[default]
    File,
    /// A single SQLite database.
    Sqlite,
    /// Process memory only; nothing survives a restart.
    Memory,
}

impl std::str::FromStr for CheckpointProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" | "json" => Ok(CheckpointProvider::File),
            "sqlite" => Ok(CheckpointProvider::Sqlite),
            "memory" => Ok(CheckpointProvider::Memory),
            _ => Err(format!("Unknown checkpoint provider: {}", s)),
        }
    }
}

impl std::fmt::Display for CheckpointProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointProvider::File => write!(f, "file"),
            CheckpointProvider::Sqlite => write!(f, "sqlite"),
            CheckpointProvider::Memory => write!(f, "memory"),
        }
    }
}

/// Checkpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointSettings {
    /// Persist progress so interrupted runs can resume.
    pub enabled: bool,
    /// Storage backend.
    pub provider: CheckpointProvider,
    /// Directory for JSON checkpoint files (file provider).
    pub dir: String,
    /// Path to the SQLite database (sqlite provider).
    pub sqlite_path: String,
    /// Save after every N completed units.
    pub save_interval: usize,
    /// Delete the checkpoint on success instead of marking it completed.
    pub delete_on_success: bool,
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: CheckpointProvider::File,
            dir: "~/.innsikt/checkpoints".to_string(),
            sqlite_path: "~/.innsikt/checkpoints.db".to_string(),
            save_interval: 1,
            delete_on_success: false,
        }
    }
}

/// Podcast context cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Seconds before a cached podcast context expires.
    pub podcast_ttl_seconds: u64,
    /// Maximum number of podcasts kept in the cache.
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            podcast_ttl_seconds: 3600,
            capacity: 64,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            settings.validate()?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Reject values the orchestrator cannot run with.
    pub fn validate(&self) -> Result<()> {
        let extraction = &self.extraction;
        if extraction.max_concurrent_units == 0 {
            return Err(InnsiktError::Config(
                "extraction.max_concurrent_units must be at least 1".to_string(),
            ));
        }
        if extraction.unit_timeout_seconds == 0 {
            return Err(InnsiktError::Config(
                "extraction.unit_timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if extraction.batch_timeout_seconds == Some(0) {
            return Err(InnsiktError::Config(
                "extraction.batch_timeout_seconds must be greater than 0 when set".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&extraction.failure_threshold) {
            return Err(InnsiktError::Config(format!(
                "extraction.failure_threshold must be between 0 and 1, got {}",
                extraction.failure_threshold
            )));
        }
        if self.checkpoint.save_interval == 0 {
            return Err(InnsiktError::Config(
                "checkpoint.save_interval must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| InnsiktError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("innsikt")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded checkpoint directory path.
    pub fn checkpoint_dir(&self) -> PathBuf {
        Self::expand_path(&self.checkpoint.dir)
    }

    /// Get the expanded SQLite checkpoint database path.
    pub fn checkpoint_sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.checkpoint.sqlite_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.extraction.max_concurrent_units, 5);
        assert_eq!(settings.extraction.failure_threshold, 0.5);
        assert_eq!(settings.extraction.fallback_model(), "gpt-4o-mini");
        assert_eq!(settings.sentiment.scale, SentimentScale::Bipolar);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [extraction]
            max_concurrent_units = 2
            fallback_model = "gpt-4.1-nano"

            [checkpoint]
            provider = "sqlite"
            "#,
        )
        .unwrap();

        assert_eq!(settings.extraction.max_concurrent_units, 2);
        assert_eq!(settings.extraction.unit_timeout_seconds, 300);
        assert_eq!(settings.extraction.fallback_model(), "gpt-4.1-nano");
        assert_eq!(settings.checkpoint.provider, CheckpointProvider::Sqlite);
        assert_eq!(settings.checkpoint.save_interval, 1);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.extraction.max_concurrent_units = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.extraction.failure_threshold = 1.5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.extraction.unit_timeout_seconds = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.extraction.batch_timeout_seconds = Some(0);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("unit".parse::<SentimentScale>(), Ok(SentimentScale::Unit));
        assert_eq!("SQLite".parse::<CheckpointProvider>(), Ok(CheckpointProvider::Sqlite));
        assert!("redis".parse::<CheckpointProvider>().is_err());
    }
}
