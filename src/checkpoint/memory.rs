//! In-memory checkpoint store.
//!
//! Useful for testing and for runs that do not need to survive a restart.

use super::{CheckpointStore, CheckpointSummary, EpisodeCheckpoint};
use crate::error::{InnsiktError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory checkpoint store.
pub struct MemoryCheckpointStore {
    checkpoints: RwLock<HashMap<String, EpisodeCheckpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self {
            checkpoints: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> InnsiktError {
    InnsiktError::Checkpoint(format!("Failed to acquire lock: {}", e))
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, episode_id: &str) -> Result<Option<EpisodeCheckpoint>> {
        let checkpoints = self.checkpoints.read().map_err(poisoned)?;
        Ok(checkpoints.get(episode_id).cloned())
    }

    async fn save(&self, checkpoint: &EpisodeCheckpoint) -> Result<()> {
        let mut checkpoints = self.checkpoints.write().map_err(poisoned)?;
        checkpoints.insert(checkpoint.episode_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn delete(&self, episode_id: &str) -> Result<bool> {
        let mut checkpoints = self.checkpoints.write().map_err(poisoned)?;
        Ok(checkpoints.remove(episode_id).is_some())
    }

    async fn list(&self) -> Result<Vec<CheckpointSummary>> {
        let checkpoints = self.checkpoints.read().map_err(poisoned)?;
        let mut summaries: Vec<_> = checkpoints.values().map(|c| c.summary()).collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::testing::success;
    use tokio_test::block_on;

    #[test]
    fn test_save_load_delete() {
        let store = MemoryCheckpointStore::new();
        let mut checkpoint = EpisodeCheckpoint::new("ep", 2);
        checkpoint.record(&success(1));

        block_on(store.save(&checkpoint)).unwrap();
        let loaded = block_on(store.load("ep")).unwrap().unwrap();
        assert!(loaded.is_completed(1));

        assert!(block_on(store.delete("ep")).unwrap());
        assert!(!block_on(store.delete("ep")).unwrap());
        assert!(block_on(store.load("ep")).unwrap().is_none());
    }

    #[test]
    fn test_list_newest_first() {
        let store = MemoryCheckpointStore::new();
        let older = EpisodeCheckpoint::new("older", 1);
        let mut newer = EpisodeCheckpoint::new("newer", 1);
        newer.updated_at = older.updated_at + chrono::Duration::seconds(5);

        block_on(store.save(&older)).unwrap();
        block_on(store.save(&newer)).unwrap();

        let ids: Vec<_> = block_on(store.list())
            .unwrap()
            .into_iter()
            .map(|s| s.episode_id)
            .collect();
        assert_eq!(ids, vec!["newer", "older"]);
    }
}
