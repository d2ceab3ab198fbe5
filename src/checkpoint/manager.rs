//! Serialized checkpoint updates on top of a [`CheckpointStore`].

use super::{CheckpointStatus, CheckpointStore, EpisodeCheckpoint};
use crate::error::{InnsiktError, Result};
use crate::extraction::UnitOutcome;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

struct Tracked {
    checkpoint: EpisodeCheckpoint,
    /// Updates applied since the last write.
    unsaved: usize,
}

/// Owns the in-progress checkpoints of a run. All mutations and writes go
/// through one async mutex, so concurrent callers never lose an update.
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    save_interval: usize,
    delete_on_success: bool,
    tracked: Mutex<HashMap<String, Tracked>>,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            store,
            save_interval: 1,
            delete_on_success: false,
            tracked: Mutex::new(HashMap::new()),
        }
    }

    /// Write after every `interval` recorded outcomes.
    pub fn with_save_interval(mut self, interval: usize) -> Self {
        self.save_interval = interval.max(1);
        self
    }

    /// Delete the checkpoint instead of marking it completed on success.
    pub fn with_delete_on_success(mut self, delete: bool) -> Self {
        self.delete_on_success = delete;
        self
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Last persisted state of an episode.
    pub async fn load(&self, episode_id: &str) -> Result<Option<EpisodeCheckpoint>> {
        self.store.load(episode_id).await
    }

    /// Start tracking an episode. With `resume`, the stored checkpoint (if
    /// any) is picked up; otherwise it is discarded and a fresh one written.
    #[instrument(skip(self))]
    pub async fn begin(
        &self,
        episode_id: &str,
        total_units: usize,
        resume: bool,
    ) -> Result<EpisodeCheckpoint> {
        let mut tracked = self.tracked.lock().await;

        let existing = if resume {
            self.store.load(episode_id).await?
        } else {
            if self.store.delete(episode_id).await? {
                info!("Discarded existing checkpoint for {}", episode_id);
            }
            None
        };

        let checkpoint = match existing {
            Some(mut checkpoint) => {
                info!(
                    "Resuming {} from checkpoint: {}/{} units done",
                    episode_id,
                    checkpoint.completed_count(),
                    total_units
                );
                if checkpoint.status.is_terminal() {
                    debug!("Reopening checkpoint last marked {}", checkpoint.status);
                }
                checkpoint.total_units = checkpoint.total_units.max(total_units);
                checkpoint.status = CheckpointStatus::InProgress;
                checkpoint
            }
            None => EpisodeCheckpoint::new(episode_id, total_units),
        };

        self.store.save(&checkpoint).await?;
        tracked.insert(
            episode_id.to_string(),
            Tracked {
                checkpoint: checkpoint.clone(),
                unsaved: 0,
            },
        );
        Ok(checkpoint)
    }

    /// Apply one outcome, writing when the save interval is reached.
    pub async fn record(&self, episode_id: &str, outcome: &UnitOutcome) -> Result<()> {
        let mut tracked = self.tracked.lock().await;
        let entry = tracked.get_mut(episode_id).ok_or_else(|| not_tracked(episode_id))?;

        entry.checkpoint.record(outcome);
        entry.unsaved += 1;

        if entry.unsaved >= self.save_interval {
            self.store.save(&entry.checkpoint).await?;
            entry.unsaved = 0;
        }
        Ok(())
    }

    /// Union a full snapshot into the tracked state and write it now.
    pub async fn save(&self, checkpoint: &EpisodeCheckpoint) -> Result<()> {
        let mut tracked = self.tracked.lock().await;
        let entry = tracked
            .entry(checkpoint.episode_id.clone())
            .or_insert_with(|| Tracked {
                checkpoint: EpisodeCheckpoint::new(
                    checkpoint.episode_id.clone(),
                    checkpoint.total_units,
                ),
                unsaved: 0,
            });

        entry.checkpoint.merge(checkpoint);
        self.store.save(&entry.checkpoint).await?;
        entry.unsaved = 0;
        Ok(())
    }

    /// Write any pending updates for an episode.
    pub async fn flush(&self, episode_id: &str) -> Result<()> {
        let mut tracked = self.tracked.lock().await;
        if let Some(entry) = tracked.get_mut(episode_id) {
            if entry.unsaved > 0 {
                self.store.save(&entry.checkpoint).await?;
                entry.unsaved = 0;
            }
        }
        Ok(())
    }

    /// Mark an episode terminal and stop tracking it. A completed episode's
    /// checkpoint is deleted instead when `delete_on_success` is set.
    #[instrument(skip(self))]
    pub async fn finalize(&self, episode_id: &str, status: CheckpointStatus) -> Result<()> {
        let mut tracked = self.tracked.lock().await;
        let mut entry = tracked.remove(episode_id).ok_or_else(|| not_tracked(episode_id))?;

        if status == CheckpointStatus::Completed && self.delete_on_success {
            self.store.delete(episode_id).await?;
            debug!("Deleted checkpoint for completed episode {}", episode_id);
            return Ok(());
        }

        entry.checkpoint.finish(status);
        self.store.save(&entry.checkpoint).await?;
        debug!("Checkpoint for {} marked {}", episode_id, status);
        Ok(())
    }
}

fn not_tracked(episode_id: &str) -> InnsiktError {
    InnsiktError::Checkpoint(format!("Episode {} has no active checkpoint", episode_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::testing::{failure, success};
    use crate::checkpoint::{CheckpointSummary, MemoryCheckpointStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Memory store that counts writes.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryCheckpointStore,
        saves: AtomicUsize,
    }

    #[async_trait]
    impl CheckpointStore for CountingStore {
        async fn load(&self, episode_id: &str) -> Result<Option<EpisodeCheckpoint>> {
            self.inner.load(episode_id).await
        }
        async fn save(&self, checkpoint: &EpisodeCheckpoint) -> Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.inner.save(checkpoint).await
        }
        async fn delete(&self, episode_id: &str) -> Result<bool> {
            self.inner.delete(episode_id).await
        }
        async fn list(&self) -> Result<Vec<CheckpointSummary>> {
            self.inner.list().await
        }
    }

    #[tokio::test]
    async fn test_record_persists_each_outcome() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let manager = CheckpointManager::new(store.clone());

        manager.begin("ep", 3, true).await.unwrap();
        manager.record("ep", &success(2)).await.unwrap();
        manager.record("ep", &failure(0)).await.unwrap();

        let stored = store.load("ep").await.unwrap().unwrap();
        assert!(stored.is_completed(2));
        assert!(stored.failures.contains_key(&0));
    }

    #[tokio::test]
    async fn test_save_interval_batches_writes() {
        let store = Arc::new(CountingStore::default());
        let manager = CheckpointManager::new(store.clone()).with_save_interval(3);

        manager.begin("ep", 5, true).await.unwrap();
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);

        for index in 0..5 {
            manager.record("ep", &success(index)).await.unwrap();
        }
        assert_eq!(store.saves.load(Ordering::SeqCst), 2);
        assert_eq!(store.load("ep").await.unwrap().unwrap().completed_count(), 3);

        manager.flush("ep").await.unwrap();
        assert_eq!(store.saves.load(Ordering::SeqCst), 3);
        assert_eq!(store.load("ep").await.unwrap().unwrap().completed_count(), 5);
    }

    #[tokio::test]
    async fn test_resume_and_fresh() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let manager = CheckpointManager::new(store.clone());

        manager.begin("ep", 4, true).await.unwrap();
        manager.record("ep", &success(1)).await.unwrap();

        let resumed = CheckpointManager::new(store.clone());
        let checkpoint = resumed.begin("ep", 6, true).await.unwrap();
        assert!(checkpoint.is_completed(1));
        assert_eq!(checkpoint.total_units, 6);

        let fresh = CheckpointManager::new(store.clone());
        let checkpoint = fresh.begin("ep", 6, false).await.unwrap();
        assert_eq!(checkpoint.completed_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_records_are_not_lost() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let manager = Arc::new(CheckpointManager::new(store.clone()));
        manager.begin("ep", 50, true).await.unwrap();

        let mut handles = Vec::new();
        for index in 0..50 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager.record("ep", &success(index)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.load("ep").await.unwrap().unwrap().completed_count(), 50);
    }

    #[tokio::test]
    async fn test_save_merges_snapshots() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let manager = CheckpointManager::new(store.clone());

        let mut first = EpisodeCheckpoint::new("ep", 4);
        first.record(&success(0));
        let mut second = EpisodeCheckpoint::new("ep", 4);
        second.record(&success(3));

        manager.save(&second).await.unwrap();
        manager.save(&first).await.unwrap();

        let stored = store.load("ep").await.unwrap().unwrap();
        assert_eq!(stored.completed_count(), 2);
    }

    #[tokio::test]
    async fn test_finalize_marks_terminal_or_deletes() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let manager = CheckpointManager::new(store.clone()).with_save_interval(10);

        manager.begin("ep", 1, true).await.unwrap();
        manager.record("ep", &success(0)).await.unwrap();
        manager.finalize("ep", CheckpointStatus::Completed).await.unwrap();

        let stored = store.load("ep").await.unwrap().unwrap();
        assert_eq!(stored.status, CheckpointStatus::Completed);
        assert!(stored.is_completed(0));
        assert!(manager.record("ep", &success(0)).await.is_err());

        let deleting = CheckpointManager::new(store.clone()).with_delete_on_success(true);
        deleting.begin("ep2", 1, true).await.unwrap();
        deleting.finalize("ep2", CheckpointStatus::Completed).await.unwrap();
        assert!(store.load("ep2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_completed_checkpoint_reopens_in_progress() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let manager = CheckpointManager::new(store.clone());

        manager.begin("ep", 2, true).await.unwrap();
        manager.record("ep", &success(0)).await.unwrap();
        manager.record("ep", &failure(1)).await.unwrap();
        manager.finalize("ep", CheckpointStatus::Completed).await.unwrap();

        let reopened = CheckpointManager::new(store.clone());
        let checkpoint = reopened.begin("ep", 3, true).await.unwrap();
        assert_eq!(checkpoint.status, CheckpointStatus::InProgress);
        assert!(checkpoint.settled_failures.contains(&1));

        // Interrupted before finalize: the new failure is persisted but unsettled.
        reopened.record("ep", &failure(2)).await.unwrap();
        let stored = store.load("ep").await.unwrap().unwrap();
        assert_eq!(stored.status, CheckpointStatus::InProgress);
        assert!(stored.failures.contains_key(&2));
        let restored: Vec<usize> = stored
            .restored_failures()
            .iter()
            .map(|o| o.unit_index)
            .collect();
        assert_eq!(restored, vec![1]);
    }
}
