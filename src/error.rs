//! Error types for Innsikt.

use thiserror::Error;

/// Library-level error type for Innsikt operations.
///
/// Errors raised while processing a single meaningful unit never show up
/// here; they are captured as [`crate::extraction::ExtractionError`] inside
/// that unit's outcome. This type is for failures that abort a whole run.
#[derive(Error, Debug)]
pub enum InnsiktError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for Innsikt operations.
pub type Result<T> = std::result::Result<T, InnsiktError>;
