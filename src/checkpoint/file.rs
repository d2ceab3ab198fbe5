//! JSON file checkpoint store.
//!
//! One file per episode. Writes go to a temporary file in the same
//! directory which is synced and then renamed over the previous checkpoint.

use super::{CheckpointStore, CheckpointSummary, EpisodeCheckpoint};
use crate::error::{InnsiktError, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Longest file stem written. Longer encodings are cut and suffixed with a
/// hash of the full id, keeping names under common filesystem limits.
const MAX_STEM_LEN: usize = 200;

/// Directory of `<episode>.json` checkpoint files.
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Path of the checkpoint file for an episode.
    pub fn path_for(&self, episode_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(episode_id)))
    }

    fn read(path: &Path) -> Result<EpisodeCheckpoint> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            InnsiktError::Checkpoint(format!("Corrupt checkpoint {:?}: {}", path, e))
        })
    }
}

/// Encode an episode id as a file stem. Unsafe bytes become `%XX`, so
/// distinct ids never share a file. Stems over [`MAX_STEM_LEN`] keep a
/// prefix and end in `~` plus a name-based UUID of the id; `~` is always
/// escaped in the plain encoding, so the two forms cannot collide.
fn file_stem(episode_id: &str) -> String {
    let mut stem = String::with_capacity(episode_id.len());
    for byte in episode_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("%{:02X}", byte));
        }
    }

    if stem.len() > MAX_STEM_LEN {
        let hash = Uuid::new_v5(&Uuid::NAMESPACE_OID, episode_id.as_bytes())
            .simple()
            .to_string();
        // The encoding is pure ASCII, so any byte offset is a char boundary.
        stem.truncate(MAX_STEM_LEN - hash.len() - 1);
        stem.push('~');
        stem.push_str(&hash);
    }
    stem
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    #[instrument(skip(self))]
    async fn load(&self, episode_id: &str) -> Result<Option<EpisodeCheckpoint>> {
        let path = self.path_for(episode_id);
        if !path.exists() {
            return Ok(None);
        }
        let checkpoint = Self::read(&path)?;
        debug!(
            "Loaded checkpoint for {} ({} units done)",
            episode_id,
            checkpoint.completed_count()
        );
        Ok(Some(checkpoint))
    }

    #[instrument(skip(self, checkpoint), fields(episode = %checkpoint.episode_id))]
    async fn save(&self, checkpoint: &EpisodeCheckpoint) -> Result<()> {
        let path = self.path_for(&checkpoint.episode_id);
        let json = serde_json::to_vec_pretty(checkpoint)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| InnsiktError::Io(e.error))?;

        debug!("Saved checkpoint to {:?}", path);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, episode_id: &str) -> Result<bool> {
        match std::fs::remove_file(self.path_for(episode_id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<CheckpointSummary>> {
        let mut summaries = Vec::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read(&path) {
                Ok(checkpoint) => summaries.push(checkpoint.summary()),
                Err(e) => warn!("Skipping unreadable checkpoint {:?}: {}", path, e),
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::testing::success;
    use crate::checkpoint::CheckpointStatus;

    #[tokio::test]
    async fn test_save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();

        assert!(store.load("ep-1").await.unwrap().is_none());

        let mut checkpoint = EpisodeCheckpoint::new("ep-1", 3);
        checkpoint.record(&success(0));
        checkpoint.record(&success(2));
        store.save(&checkpoint).await.unwrap();

        let loaded = store.load("ep-1").await.unwrap().unwrap();
        assert_eq!(loaded, checkpoint);

        assert!(store.delete("ep-1").await.unwrap());
        assert!(!store.delete("ep-1").await.unwrap());
        assert!(store.load("ep-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_replaces_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();

        let mut checkpoint = EpisodeCheckpoint::new("ep", 10);
        for index in 0..10 {
            checkpoint.record(&success(index));
            store.save(&checkpoint).await.unwrap();
        }

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert_eq!(store.load("ep").await.unwrap().unwrap().completed_count(), 10);
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();
        std::fs::write(store.path_for("ep"), "{\"episode_id\": \"ep\", ").unwrap();

        assert!(matches!(
            store.load("ep").await,
            Err(InnsiktError::Checkpoint(_))
        ));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_and_unsafe_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();

        let mut a = EpisodeCheckpoint::new("show/ep 1", 2);
        a.status = CheckpointStatus::Completed;
        store.save(&a).await.unwrap();
        store.save(&EpisodeCheckpoint::new("show_ep_1", 2)).await.unwrap();

        assert_ne!(store.path_for("show/ep 1"), store.path_for("show_ep_1"));
        assert!(store.path_for("../escape").starts_with(dir.path()));

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().any(|s| s.episode_id == "show/ep 1"
            && s.status == CheckpointStatus::Completed));
    }

    #[tokio::test]
    async fn test_long_ids_get_bounded_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();

        let first = format!("{}-1", "Ødegård".repeat(60));
        let second = format!("{}-2", "Ødegård".repeat(60));

        let path = store.path_for(&first);
        let name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(name.len(), MAX_STEM_LEN + ".json".len());
        assert!(name.contains('~'));
        assert_ne!(path, store.path_for(&second));
        assert_eq!(path, store.path_for(&first));

        let mut checkpoint = EpisodeCheckpoint::new(first.clone(), 2);
        checkpoint.record(&success(1));
        store.save(&checkpoint).await.unwrap();
        store.save(&EpisodeCheckpoint::new(second.clone(), 2)).await.unwrap();

        assert_eq!(store.load(&first).await.unwrap().unwrap(), checkpoint);
        assert_eq!(store.list().await.unwrap().len(), 2);

        assert_eq!(file_stem("short-id"), "short-id");
    }
}
