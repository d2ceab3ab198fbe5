//! SQLite checkpoint store.
//!
//! One row per episode holding the checkpoint as JSON, plus a few columns for
//! listing without decoding every row.

use super::{CheckpointStatus, CheckpointStore, CheckpointSummary, EpisodeCheckpoint};
use crate::error::{InnsiktError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS checkpoints (
    episode_id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    completed_units INTEGER NOT NULL,
    failed_units INTEGER NOT NULL,
    total_units INTEGER NOT NULL,
    checkpoint_json TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_checkpoints_updated_at ON checkpoints(updated_at);
"#;

/// SQLite-backed checkpoint store.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointStore {
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite checkpoint store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| InnsiktError::Checkpoint(format!("Failed to acquire lock: {}", e)))
    }
}

fn status_to_str(status: CheckpointStatus) -> &'static str {
    match status {
        CheckpointStatus::InProgress => "in_progress",
        CheckpointStatus::Completed => "completed",
        CheckpointStatus::Failed => "failed",
        CheckpointStatus::Abandoned => "abandoned",
    }
}

fn status_from_str(s: &str) -> CheckpointStatus {
    match s {
        "completed" => CheckpointStatus::Completed,
        "failed" => CheckpointStatus::Failed,
        "abandoned" => CheckpointStatus::Abandoned,
        _ => CheckpointStatus::InProgress,
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    #[instrument(skip(self))]
    async fn load(&self, episode_id: &str) -> Result<Option<EpisodeCheckpoint>> {
        let conn = self.lock()?;

        let json = conn.query_row(
            "SELECT checkpoint_json FROM checkpoints WHERE episode_id = ?1",
            params![episode_id],
            |row| row.get::<_, String>(0),
        );

        match json {
            Ok(json) => {
                let checkpoint = serde_json::from_str(&json).map_err(|e| {
                    InnsiktError::Checkpoint(format!(
                        "Corrupt checkpoint for {}: {}",
                        episode_id, e
                    ))
                })?;
                Ok(Some(checkpoint))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, checkpoint), fields(episode = %checkpoint.episode_id))]
    async fn save(&self, checkpoint: &EpisodeCheckpoint) -> Result<()> {
        let json = serde_json::to_string(checkpoint)?;
        let conn = self.lock()?;

        let tx = conn.unchecked_transaction()?;
        tx.execute(
            r#"
            INSERT INTO checkpoints
            (episode_id, status, completed_units, failed_units, total_units, checkpoint_json, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(episode_id) DO UPDATE SET
                status = excluded.status,
                completed_units = excluded.completed_units,
                failed_units = excluded.failed_units,
                total_units = excluded.total_units,
                checkpoint_json = excluded.checkpoint_json,
                updated_at = excluded.updated_at
            "#,
            params![
                checkpoint.episode_id,
                status_to_str(checkpoint.status),
                checkpoint.completed_count() as i64,
                checkpoint.failures.len() as i64,
                checkpoint.total_units as i64,
                json,
                checkpoint.updated_at.to_rfc3339(),
            ],
        )?;
        tx.commit()?;

        debug!("Saved checkpoint for {}", checkpoint.episode_id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, episode_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM checkpoints WHERE episode_id = ?1",
            params![episode_id],
        )?;
        Ok(deleted > 0)
    }

    async fn list(&self) -> Result<Vec<CheckpointSummary>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT episode_id, status, completed_units, failed_units, total_units, updated_at
            FROM checkpoints
            ORDER BY updated_at DESC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            let status: String = row.get(1)?;
            let completed: i64 = row.get(2)?;
            let failed: i64 = row.get(3)?;
            let total: i64 = row.get(4)?;
            let updated_at: String = row.get(5)?;
            Ok(CheckpointSummary {
                episode_id: row.get(0)?,
                status: status_from_str(&status),
                completed_units: completed as usize,
                failed_units: failed as usize,
                total_units: total as usize,
                updated_at: DateTime::parse_from_rfc3339(&updated_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        })?;

        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::testing::{failure, success};

    #[tokio::test]
    async fn test_upsert_and_load() {
        let store = SqliteCheckpointStore::in_memory().unwrap();

        let mut checkpoint = EpisodeCheckpoint::new("ep", 4);
        checkpoint.record(&success(0));
        store.save(&checkpoint).await.unwrap();

        checkpoint.record(&success(1));
        checkpoint.record(&failure(3));
        store.save(&checkpoint).await.unwrap();

        let loaded = store.load("ep").await.unwrap().unwrap();
        assert_eq!(loaded, checkpoint);

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].completed_units, 2);
        assert_eq!(listed[0].failed_units, 1);
        assert_eq!(listed[0].status, CheckpointStatus::InProgress);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = SqliteCheckpointStore::in_memory().unwrap();
        store.save(&EpisodeCheckpoint::new("ep", 1)).await.unwrap();

        assert!(store.delete("ep").await.unwrap());
        assert!(!store.delete("ep").await.unwrap());
        assert!(store.load("ep").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints.db");

        {
            let store = SqliteCheckpointStore::new(&path).unwrap();
            let mut checkpoint = EpisodeCheckpoint::new("ep", 2);
            checkpoint.record(&success(1));
            store.save(&checkpoint).await.unwrap();
        }

        let reopened = SqliteCheckpointStore::new(&path).unwrap();
        let loaded = reopened.load("ep").await.unwrap().unwrap();
        assert!(loaded.is_completed(1));
    }
}
