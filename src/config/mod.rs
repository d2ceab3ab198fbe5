//! Configuration module for Innsikt.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{ExtractionPrompts, FallbackPrompts, Prompts};
pub use settings::{
    CacheSettings, CheckpointProvider, CheckpointSettings, ExtractionSettings, GeneralSettings,
    PromptSettings, SentimentScale, SentimentSettings, Settings,
};
