//! Per-unit and per-batch time limits.

use crate::extraction::{ExtractionError, UnitOutcome};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Thirty years; stands in for "no deadline".
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Enforces the two timeout layers of a run.
///
/// Each unit gets `unit_timeout` once it starts. The batch as a whole may
/// take `remaining units × unit_timeout`, recalculated after every
/// completion, and never past the optional overall cap.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutController {
    unit_timeout: Duration,
    batch_cap: Option<Duration>,
}

impl TimeoutController {
    pub fn new(unit_timeout: Duration) -> Self {
        Self {
            unit_timeout,
            batch_cap: None,
        }
    }

    pub fn with_batch_cap(mut self, cap: Option<Duration>) -> Self {
        self.batch_cap = cap;
        self
    }

    /// Run one unit under the per-unit timeout. A unit that runs out of time
    /// yields a timeout outcome.
    pub async fn run_unit<F>(&self, unit_index: usize, work: F) -> UnitOutcome
    where
        F: Future<Output = UnitOutcome>,
    {
        match tokio::time::timeout(self.unit_timeout, work).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("Unit {} timed out after {:?}", unit_index, self.unit_timeout);
                UnitOutcome::failure(
                    unit_index,
                    ExtractionError::Timeout(self.unit_timeout),
                    self.unit_timeout,
                )
            }
        }
    }

    /// Time the remaining units are allowed in total.
    pub fn batch_budget(&self, remaining: usize) -> Duration {
        let units = u32::try_from(remaining).unwrap_or(u32::MAX);
        self.unit_timeout.saturating_mul(units)
    }

    /// Deadline for the remaining units, measured from now and clamped to
    /// the overall cap measured from `started`.
    pub fn batch_deadline(&self, started: Instant, remaining: usize) -> Instant {
        let now = Instant::now();
        let deadline = now
            .checked_add(self.batch_budget(remaining))
            .unwrap_or_else(|| now + FAR_FUTURE);

        match self.batch_cap.and_then(|cap| started.checked_add(cap)) {
            Some(cap) => deadline.min(cap),
            None => deadline,
        }
    }
}
