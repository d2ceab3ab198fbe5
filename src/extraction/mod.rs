//! Knowledge extraction from meaningful units.

mod client;
mod context;
mod fallback;
mod models;
mod parse;
mod processor;

pub use client::{ExtractionClient, ResponseMode};
pub use context::{ExtractionContext, PodcastContext};
pub use fallback::FallbackExtractor;
pub use models::{
    Entity, ErrorKind, ErrorRecord, ExtractionError, ExtractionResult, Quote, RawExtraction,
    Relationship, UnitOutcome,
};
pub use processor::UnitProcessor;
