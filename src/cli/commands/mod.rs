//! CLI command implementations.

mod checkpoints;
mod config;
mod extract;

pub use checkpoints::run_checkpoints;
pub use config::run_config;
pub use extract::{run_extract, ExtractOptions};
