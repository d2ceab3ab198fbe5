//! Per-unit processing.
//!
//! [`UnitProcessor::process`] turns a unit into a [`UnitOutcome`]. Every
//! failure, panics included, becomes a failed outcome; nothing propagates to
//! the caller.

use super::client::ExtractionClient;
use super::context::ExtractionContext;
use super::fallback::FallbackExtractor;
use super::models::{ExtractionError, ExtractionResult, RawExtraction, UnitOutcome};
use crate::sentiment::SentimentNormalizer;
use crate::units::MeaningfulUnit;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Processes one unit at a time: combined extraction, optional fallback and
/// sentiment normalization.
#[derive(Clone)]
pub struct UnitProcessor {
    client: ExtractionClient,
    fallback: Option<FallbackExtractor>,
    normalizer: SentimentNormalizer,
}

impl UnitProcessor {
    pub fn new(client: ExtractionClient, normalizer: SentimentNormalizer) -> Self {
        Self {
            client,
            fallback: None,
            normalizer,
        }
    }

    /// Enable the degraded path for malformed responses.
    pub fn with_fallback(mut self, fallback: FallbackExtractor) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Process one unit. Never fails and never panics outward.
    pub async fn process(&self, unit: &MeaningfulUnit, context: &ExtractionContext) -> UnitOutcome {
        let started = Instant::now();

        let (result, fallback_used) = match AssertUnwindSafe(self.run(unit, context))
            .catch_unwind()
            .await
        {
            Ok(attempt) => attempt,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!("Unit {} panicked: {}", unit.index, message);
                (Err(ExtractionError::Internal(message)), false)
            }
        };

        let elapsed = started.elapsed();
        match &result {
            Ok(_) => debug!("Unit {} done in {:?}", unit.index, elapsed),
            Err(e) => warn!("Unit {} failed after {:?}: {}", unit.index, elapsed, e),
        }

        UnitOutcome {
            unit_index: unit.index,
            result,
            elapsed,
            fallback_used,
            restored: false,
        }
    }

    async fn run(
        &self,
        unit: &MeaningfulUnit,
        context: &ExtractionContext,
    ) -> (Result<ExtractionResult, ExtractionError>, bool) {
        match self.client.extract(unit, context).await {
            Ok(raw) => (Ok(self.finish(raw, unit)), false),
            Err(ExtractionError::MalformedResponse(reason)) => match &self.fallback {
                Some(fallback) => {
                    warn!(
                        "Unit {}: malformed response ({}), trying fallback extraction",
                        unit.index, reason
                    );
                    match fallback.extract(unit).await {
                        Ok(raw) => (Ok(self.finish(raw, unit)), true),
                        Err(e) => (Err(e), true),
                    }
                }
                None => (Err(ExtractionError::MalformedResponse(reason)), false),
            },
            Err(e) => (Err(e), false),
        }
    }

    fn finish(&self, raw: RawExtraction, unit: &MeaningfulUnit) -> ExtractionResult {
        let sentiment = self
            .normalizer
            .normalize_value(raw.sentiment.as_ref(), &unit.text);
        ExtractionResult {
            entities: raw.entities,
            quotes: raw.quotes,
            insights: raw.insights,
            relationships: raw.relationships,
            sentiment,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
