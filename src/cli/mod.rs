//! CLI module for Innsikt.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Innsikt - knowledge extraction from podcast transcripts
///
/// Runs every meaningful unit of an episode through a reasoning service,
/// concurrently and resumably, and writes the extracted knowledge as JSON.
/// The name "Innsikt" is Norwegian for "insight."
#[derive(Parser, Debug)]
#[command(name = "innsikt")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract knowledge from one or more episode files
    Extract {
        /// Episode JSON files (processed one after another)
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Write results to this file instead of stdout
        #[arg(short, long)]
        output: Option<String>,

        /// Ignore existing checkpoints and start over
        #[arg(long)]
        fresh: bool,

        /// Maximum units processed at the same time
        #[arg(long)]
        concurrency: Option<usize>,

        /// Seconds a single unit may take
        #[arg(long)]
        unit_timeout: Option<u64>,

        /// Failure ratio above which an episode is marked failed (0.0-1.0)
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Inspect or remove stored checkpoints
    Checkpoints {
        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CheckpointAction {
    /// List stored checkpoints
    List,

    /// Show one episode's checkpoint
    Show {
        /// Episode ID
        episode_id: String,
    },

    /// Delete one episode's checkpoint
    Clear {
        /// Episode ID
        episode_id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}
