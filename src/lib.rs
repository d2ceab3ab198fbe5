//! Innsikt - knowledge extraction from podcast transcripts
//!
//! Takes an episode already split into meaningful units and extracts
//! entities, quotes, insights, relationships and sentiment from each unit
//! through a reasoning service, concurrently and resumably.
//!
//! The name "Innsikt" is the Norwegian word for "insight."
//!
//! # Architecture
//!
//! - `config` - Settings and prompt templates
//! - `reasoning` - Reasoning-service abstraction (OpenAI implementation)
//! - `units` - Episode and meaningful-unit input types
//! - `extraction` - Extraction client, fallback extraction, unit processor
//! - `sentiment` - Sentiment normalization onto a fixed scale
//! - `checkpoint` - Persistent per-episode progress
//! - `orchestrator` - Bounded worker pool, timeouts and episode status
//! - `cache` - TTL cache for podcast context shared across episodes
//!
//! # Example
//!
//! ```rust,no_run
//! use innsikt::config::Settings;
//! use innsikt::orchestrator::Orchestrator;
//! use innsikt::reasoning::OpenAiReasoner;
//! use innsikt::units::EpisodeInput;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let reasoner = OpenAiReasoner::new(Duration::from_secs(300))?;
//!     let orchestrator = Orchestrator::from_settings(&settings, Arc::new(reasoner))?;
//!
//!     let episode = EpisodeInput::load("episode.json".as_ref())?;
//!     let extraction = orchestrator.run(&episode, true).await?;
//!     println!("{}: {} units extracted", extraction.status, extraction.results.len());
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod error;
pub mod extraction;
pub mod orchestrator;
pub mod reasoning;
pub mod sentiment;
pub mod units;

pub use error::{InnsiktError, Result};
