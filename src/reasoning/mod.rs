//! Reasoning service abstraction.
//!
//! The extraction pipeline talks to a language model through the
//! [`ReasoningService`] trait. Implementations report their capabilities
//! once; callers fix their request mode at construction time.

mod openai;

pub use openai::OpenAiReasoner;

use async_trait::async_trait;
use thiserror::Error;

/// What a reasoning service supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// The service can be asked to return a JSON object directly.
    pub structured_output: bool,
}

/// A single completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model name.
    pub model: String,
    /// System instructions.
    pub system: String,
    /// User prompt.
    pub prompt: String,
    /// Ask the service for a JSON object response.
    pub structured_output: bool,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Raw completion content. `None` when the service answered without content.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub content: Option<String>,
}

impl Completion {
    /// Completion carrying text content.
    #[cfg(test)]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
        }
    }
}

/// Failure to obtain a completion at all.
#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Trait for reasoning service implementations.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Static capabilities of this service.
    fn capabilities(&self) -> Capabilities;

    /// Issue one completion request. Implementations must not retry.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<Completion, ServiceError>;
}
