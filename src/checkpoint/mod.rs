//! Checkpoint persistence for resumable extraction.
//!
//! A checkpoint records which units of an episode have been extracted and
//! their results, so an interrupted run can resume without reprocessing them.

mod file;
mod manager;
mod memory;
mod sqlite;

pub use file::FileCheckpointStore;
pub use manager::CheckpointManager;
pub use memory::MemoryCheckpointStore;
pub use sqlite::SqliteCheckpointStore;

use crate::config::{CheckpointProvider, Settings};
use crate::error::Result;
use crate::extraction::{ErrorRecord, ExtractionError, ExtractionResult, UnitOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle state of a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    InProgress,
    /// The episode finished and its results are usable.
    Completed,
    /// The episode finished with too many failures.
    Failed,
    /// The run was aborted by a fatal error.
    Abandoned,
}

impl CheckpointStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CheckpointStatus::InProgress)
    }
}

impl std::fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointStatus::InProgress => write!(f, "in progress"),
            CheckpointStatus::Completed => write!(f, "completed"),
            CheckpointStatus::Failed => write!(f, "failed"),
            CheckpointStatus::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// A persisted unit result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResult {
    pub result: ExtractionResult,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub fallback_used: bool,
}

/// Persisted progress of one episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeCheckpoint {
    pub episode_id: String,
    pub status: CheckpointStatus,
    pub total_units: usize,
    pub completed_unit_indices: BTreeSet<usize>,
    /// Results of completed units, keyed by unit index.
    pub results: BTreeMap<usize, StoredResult>,
    /// Latest failure of each unit that has not yet succeeded.
    #[serde(default)]
    pub failures: BTreeMap<usize, ErrorRecord>,
    /// Failures that were present when the episode was last finalized as
    /// completed. Only these are restored as final on resume; any other
    /// failure is retried.
    #[serde(default)]
    pub settled_failures: BTreeSet<usize>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EpisodeCheckpoint {
    pub fn new(episode_id: impl Into<String>, total_units: usize) -> Self {
        let now = Utc::now();
        Self {
            episode_id: episode_id.into(),
            status: CheckpointStatus::InProgress,
            total_units,
            completed_unit_indices: BTreeSet::new(),
            results: BTreeMap::new(),
            failures: BTreeMap::new(),
            settled_failures: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self, unit_index: usize) -> bool {
        self.completed_unit_indices.contains(&unit_index)
    }

    pub fn completed_count(&self) -> usize {
        self.completed_unit_indices.len()
    }

    /// Apply one unit outcome. Successes join the completed set; a failure
    /// never removes a unit that already completed.
    pub fn record(&mut self, outcome: &UnitOutcome) {
        match &outcome.result {
            Ok(result) => {
                self.completed_unit_indices.insert(outcome.unit_index);
                self.failures.remove(&outcome.unit_index);
                self.settled_failures.remove(&outcome.unit_index);
                self.results.insert(
                    outcome.unit_index,
                    StoredResult {
                        result: result.clone(),
                        elapsed_ms: outcome.elapsed.as_millis() as u64,
                        fallback_used: outcome.fallback_used,
                    },
                );
            }
            Err(_) => {
                if !self.is_completed(outcome.unit_index) {
                    if let Some(record) = outcome.error_record() {
                        self.failures.insert(outcome.unit_index, record);
                    }
                }
            }
        }
        self.updated_at = Utc::now();
    }

    /// Union another snapshot of the same episode into this one.
    pub fn merge(&mut self, other: &EpisodeCheckpoint) {
        for index in &other.completed_unit_indices {
            self.completed_unit_indices.insert(*index);
            self.failures.remove(index);
            self.settled_failures.remove(index);
        }
        for (index, stored) in &other.results {
            self.results.entry(*index).or_insert_with(|| stored.clone());
        }
        for (index, record) in &other.failures {
            if !self.is_completed(*index) {
                self.failures.insert(*index, record.clone());
            }
        }
        for index in &other.settled_failures {
            if !self.is_completed(*index) {
                self.settled_failures.insert(*index);
            }
        }
        self.total_units = self.total_units.max(other.total_units);
        self.created_at = self.created_at.min(other.created_at);
        self.updated_at = Utc::now();
    }

    /// Outcomes restored from this checkpoint for every completed unit.
    pub fn restored_outcomes(&self) -> Vec<UnitOutcome> {
        self.completed_unit_indices
            .iter()
            .filter_map(|index| {
                self.results.get(index).map(|stored| UnitOutcome {
                    unit_index: *index,
                    result: Ok(stored.result.clone()),
                    elapsed: Duration::from_millis(stored.elapsed_ms),
                    fallback_used: stored.fallback_used,
                    restored: true,
                })
            })
            .collect()
    }

    /// Move to a terminal status. Finalizing as completed settles the current
    /// failures; any other status leaves every failure open for a retry.
    pub fn finish(&mut self, status: CheckpointStatus) {
        self.settled_failures = if status == CheckpointStatus::Completed {
            self.failures.keys().copied().collect()
        } else {
            BTreeSet::new()
        };
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Outcomes restored from this checkpoint for every settled failure.
    pub fn restored_failures(&self) -> Vec<UnitOutcome> {
        self.failures
            .values()
            .filter(|record| self.settled_failures.contains(&record.unit_index))
            .map(|record| UnitOutcome {
                unit_index: record.unit_index,
                result: Err(ExtractionError::from_record(record)),
                elapsed: Duration::ZERO,
                fallback_used: false,
                restored: true,
            })
            .collect()
    }

    pub fn summary(&self) -> CheckpointSummary {
        CheckpointSummary {
            episode_id: self.episode_id.clone(),
            status: self.status,
            completed_units: self.completed_count(),
            failed_units: self.failures.len(),
            total_units: self.total_units,
            updated_at: self.updated_at,
        }
    }
}

/// Overview of a stored checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub episode_id: String,
    pub status: CheckpointStatus,
    pub completed_units: usize,
    pub failed_units: usize,
    pub total_units: usize,
    pub updated_at: DateTime<Utc>,
}

/// Trait for checkpoint storage backends. Every `save` must be atomic: a
/// reader sees either the previous checkpoint or the new one.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint for an episode.
    async fn load(&self, episode_id: &str) -> Result<Option<EpisodeCheckpoint>>;

    /// Replace the stored checkpoint for `checkpoint.episode_id`.
    async fn save(&self, checkpoint: &EpisodeCheckpoint) -> Result<()>;

    /// Delete an episode's checkpoint. Returns whether one existed.
    async fn delete(&self, episode_id: &str) -> Result<bool>;

    /// List all stored checkpoints, most recently updated first.
    async fn list(&self) -> Result<Vec<CheckpointSummary>>;
}

/// Open the checkpoint store selected in settings.
pub fn open_store(settings: &Settings) -> Result<Arc<dyn CheckpointStore>> {
    let store: Arc<dyn CheckpointStore> = match settings.checkpoint.provider {
        CheckpointProvider::File => Arc::new(FileCheckpointStore::new(&settings.checkpoint_dir())?),
        CheckpointProvider::Sqlite => {
            Arc::new(SqliteCheckpointStore::new(&settings.checkpoint_sqlite_path())?)
        }
        CheckpointProvider::Memory => Arc::new(MemoryCheckpointStore::new()),
    };
    Ok(store)
}
