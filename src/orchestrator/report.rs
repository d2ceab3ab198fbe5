//! Episode-level aggregation of unit outcomes.

use crate::extraction::{ErrorKind, ErrorRecord, ExtractionError, UnitOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// Terminal status of an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeStatus {
    /// Every unit succeeded.
    Succeeded,
    /// Some units failed, at or below the failure threshold.
    PartiallyFailed,
    /// More units failed than the threshold allows. Results are unusable.
    Failed,
}

impl EpisodeStatus {
    /// Decide the status from failure counts. A ratio exactly at the
    /// threshold is still a partial failure.
    pub fn decide(failed: usize, total: usize, threshold: f64) -> Self {
        if failed == 0 || total == 0 {
            return EpisodeStatus::Succeeded;
        }
        let ratio = failed as f64 / total as f64;
        if ratio > threshold {
            EpisodeStatus::Failed
        } else {
            EpisodeStatus::PartiallyFailed
        }
    }

    /// Whether downstream storage may use the results.
    pub fn is_usable(&self) -> bool {
        !matches!(self, EpisodeStatus::Failed)
    }
}

impl std::fmt::Display for EpisodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EpisodeStatus::Succeeded => write!(f, "succeeded"),
            EpisodeStatus::PartiallyFailed => write!(f, "partially failed"),
            EpisodeStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Summary of an episode run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub run_id: Uuid,
    pub status: EpisodeStatus,
    pub total_units: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failed_by_kind: BTreeMap<ErrorKind, usize>,
    pub timed_out: usize,
    /// Units that needed the degraded extraction path.
    pub fallback_used: usize,
    /// Units whose sentiment was estimated or defaulted.
    pub sentiment_fallbacks: usize,
    /// Outcomes taken from a checkpoint instead of processed in this run.
    pub restored: usize,
    pub failure_ratio: f64,
    pub avg_unit_ms: f64,
    pub min_unit_ms: u64,
    pub max_unit_ms: u64,
    pub wall_time_ms: u64,
    /// Sum of unit durations over wall time.
    pub parallelization_factor: f64,
    pub errors: Vec<ErrorRecord>,
}

impl ExtractionReport {
    /// Aggregate outcomes. `outcomes` holds at most one outcome per unit.
    pub fn build(
        run_id: Uuid,
        outcomes: &BTreeMap<usize, UnitOutcome>,
        total_units: usize,
        wall_time: Duration,
        failure_threshold: f64,
    ) -> Self {
        let mut failed_by_kind = BTreeMap::new();
        let mut errors = Vec::new();

        for record in outcomes.values().filter_map(|o| o.error_record()) {
            *failed_by_kind.entry(record.error_kind).or_insert(0) += 1;
            errors.push(record);
        }

        let failed = errors.len();
        let succeeded = outcomes.values().filter(|o| o.succeeded()).count();
        let timed_out = errors.iter().filter(|e| e.is_timeout).count();
        let fallback_used = outcomes.values().filter(|o| o.fallback_used).count();
        let sentiment_fallbacks = outcomes
            .values()
            .filter_map(|o| o.result.as_ref().ok())
            .filter(|r| r.sentiment.fallback_used)
            .count();
        let restored = outcomes.values().filter(|o| o.restored).count();

        // Durations of units that actually ran to an outcome in this run.
        let durations: Vec<Duration> = outcomes
            .values()
            .filter(|o| !o.restored && !matches!(o.error(), Some(ExtractionError::BatchDeadline)))
            .map(|o| o.elapsed)
            .collect();

        let total_processing: Duration = durations.iter().sum();
        let avg_unit_ms = if durations.is_empty() {
            0.0
        } else {
            total_processing.as_secs_f64() * 1000.0 / durations.len() as f64
        };
        let min_unit_ms = durations.iter().min().map(as_millis).unwrap_or(0);
        let max_unit_ms = durations.iter().max().map(as_millis).unwrap_or(0);

        let parallelization_factor = if wall_time.is_zero() {
            0.0
        } else {
            total_processing.as_secs_f64() / wall_time.as_secs_f64()
        };

        let failure_ratio = if total_units == 0 {
            0.0
        } else {
            failed as f64 / total_units as f64
        };

        Self {
            run_id,
            status: EpisodeStatus::decide(failed, total_units, failure_threshold),
            total_units,
            succeeded,
            failed,
            failed_by_kind,
            timed_out,
            fallback_used,
            sentiment_fallbacks,
            restored,
            failure_ratio,
            avg_unit_ms,
            min_unit_ms,
            max_unit_ms,
            wall_time_ms: as_millis(&wall_time),
            parallelization_factor,
            errors,
        }
    }
}

fn as_millis(d: &Duration) -> u64 {
    d.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::testing::{failure, success};

    #[test]
    fn test_threshold_boundary() {
        assert_eq!(EpisodeStatus::decide(0, 4, 0.5), EpisodeStatus::Succeeded);
        assert_eq!(EpisodeStatus::decide(1, 4, 0.5), EpisodeStatus::PartiallyFailed);
        assert_eq!(EpisodeStatus::decide(2, 4, 0.5), EpisodeStatus::PartiallyFailed);
        assert_eq!(EpisodeStatus::decide(3, 4, 0.5), EpisodeStatus::Failed);
        assert_eq!(EpisodeStatus::decide(3, 10, 0.3), EpisodeStatus::PartiallyFailed);
        assert_eq!(EpisodeStatus::decide(1, 10, 0.0), EpisodeStatus::Failed);
        assert_eq!(EpisodeStatus::decide(0, 0, 0.5), EpisodeStatus::Succeeded);
    }

    #[test]
    fn test_build_report() {
        let mut outcomes = BTreeMap::new();
        outcomes.insert(0, success(0));
        outcomes.insert(1, success(1));
        outcomes.insert(2, failure(2));
        outcomes.insert(
            3,
            UnitOutcome::failure(
                3,
                ExtractionError::Timeout(Duration::from_secs(2)),
                Duration::from_secs(2),
            ),
        );

        let report = ExtractionReport::build(
            Uuid::new_v4(),
            &outcomes,
            4,
            Duration::from_millis(2000),
            0.5,
        );

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(report.timed_out, 1);
        assert_eq!(report.failed_by_kind.get(&ErrorKind::Transport), Some(&1));
        assert_eq!(report.failed_by_kind.get(&ErrorKind::Timeout), Some(&1));
        assert_eq!(report.status, EpisodeStatus::PartiallyFailed);
        assert_eq!(report.min_unit_ms, 10);
        assert_eq!(report.max_unit_ms, 2000);
        assert!((report.parallelization_factor - 1.045).abs() < 1e-9);
        assert!((report.failure_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_restored_and_cancelled_units_excluded_from_timing() {
        let mut outcomes = BTreeMap::new();
        let mut restored = success(0);
        restored.restored = true;
        outcomes.insert(0, restored);
        outcomes.insert(
            1,
            UnitOutcome::failure(1, ExtractionError::BatchDeadline, Duration::from_secs(60)),
        );

        let report = ExtractionReport::build(Uuid::new_v4(), &outcomes, 2, Duration::from_secs(1), 0.5);
        assert_eq!(report.restored, 1);
        assert_eq!(report.timed_out, 1);
        assert_eq!(report.avg_unit_ms, 0.0);
        assert_eq!(report.parallelization_factor, 0.0);
    }
}
