//! Snapshot persistence
//!
//! Narrow key-value contract for completed results and in-flight
//! checkpoints, consumed by the scheduler and the CLI. Implementations must
//! treat a corrupt, unreadable, or absent store as "nothing saved", never
//! as an error.

use crate::error::{Error, Result};
use crate::pipeline::ProcessingCheckpoint;
use crate::stats::StatsSnapshot;
use crate::store::MediaItem;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A persisted completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedRun {
    pub items: Vec<MediaItem>,
    pub stats: StatsSnapshot,
    pub saved_at: DateTime<Utc>,
}

impl CompletedRun {
    pub fn new(items: Vec<MediaItem>, stats: StatsSnapshot) -> Self {
        Self {
            items,
            stats,
            saved_at: Utc::now(),
        }
    }
}

/// Durable key-value snapshotting of pipeline state
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save_completed(&self, run: &CompletedRun) -> Result<()>;
    async fn load_completed(&self) -> Result<Option<CompletedRun>>;
    async fn clear_completed(&self) -> Result<()>;

    async fn save_checkpoint(&self, checkpoint: &ProcessingCheckpoint) -> Result<()>;
    async fn load_checkpoint(&self) -> Result<Option<ProcessingCheckpoint>>;
    async fn clear_checkpoint(&self) -> Result<()>;
}

const COMPLETED_KEY: &str = "completed.json";
const CHECKPOINT_KEY: &str = "checkpoint.json";

/// JSON-file backed store under the configured store directory
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    async fn write_key<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.key_path(key);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(value)?;

        // Write-then-rename so a crash never leaves a truncated snapshot
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!("Saved snapshot to {:?}", path);
        Ok(())
    }

    async fn read_key<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.key_path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!("Ignoring unreadable snapshot {:?}: {}", path, e);
                return Ok(None);
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Ignoring corrupt snapshot {:?}: {}", path, e);
                Ok(None)
            }
        }
    }

    async fn remove_key(&self, key: &str) -> Result<()> {
        let path = self.key_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Persistence(format!(
                "failed to remove {:?}: {}",
                path, e
            ))),
        }
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn save_completed(&self, run: &CompletedRun) -> Result<()> {
        self.write_key(COMPLETED_KEY, run).await
    }

    async fn load_completed(&self) -> Result<Option<CompletedRun>> {
        self.read_key(COMPLETED_KEY).await
    }

    async fn clear_completed(&self) -> Result<()> {
        self.remove_key(COMPLETED_KEY).await
    }

    async fn save_checkpoint(&self, checkpoint: &ProcessingCheckpoint) -> Result<()> {
        self.write_key(CHECKPOINT_KEY, checkpoint).await
    }

    async fn load_checkpoint(&self) -> Result<Option<ProcessingCheckpoint>> {
        self.read_key(CHECKPOINT_KEY).await
    }

    async fn clear_checkpoint(&self) -> Result<()> {
        self.remove_key(CHECKPOINT_KEY).await
    }
}

/// In-memory store for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryStore {
    completed: Mutex<Option<CompletedRun>>,
    checkpoint: Mutex<Option<ProcessingCheckpoint>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn save_completed(&self, run: &CompletedRun) -> Result<()> {
        *self.completed.lock().await = Some(run.clone());
        Ok(())
    }

    async fn load_completed(&self) -> Result<Option<CompletedRun>> {
        Ok(self.completed.lock().await.clone())
    }

    async fn clear_completed(&self) -> Result<()> {
        *self.completed.lock().await = None;
        Ok(())
    }

    async fn save_checkpoint(&self, checkpoint: &ProcessingCheckpoint) -> Result<()> {
        *self.checkpoint.lock().await = Some(checkpoint.clone());
        Ok(())
    }

    async fn load_checkpoint(&self) -> Result<Option<ProcessingCheckpoint>> {
        Ok(self.checkpoint.lock().await.clone())
    }

    async fn clear_checkpoint(&self) -> Result<()> {
        *self.checkpoint.lock().await = None;
        Ok(())
    }
}

/// Best-effort checkpoint write: failures are logged, never fatal
pub async fn checkpoint_best_effort(store: &dyn SnapshotStore, checkpoint: &ProcessingCheckpoint) {
    if let Err(e) = store.save_checkpoint(checkpoint).await {
        warn!("Checkpoint write failed (continuing): {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MediaItem;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn sample_run() -> CompletedRun {
        let items = vec![MediaItem::unmatched(
            "Show",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        )];
        let stats = crate::stats::aggregate(&items, 10);
        CompletedRun::new(items, stats)
    }

    #[tokio::test]
    async fn test_completed_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = JsonFileStore::new(tmp.path());

        assert!(store.load_completed().await.unwrap().is_none());
        store.save_completed(&sample_run()).await.unwrap();

        let loaded = store.load_completed().await.unwrap().unwrap();
        assert_eq!(loaded.items.len(), 1);
        assert_eq!(loaded.stats.total_watched, 1);

        store.clear_completed().await.unwrap();
        assert!(store.load_completed().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_loads_as_none() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(COMPLETED_KEY), b"{ not json").unwrap();

        let store = JsonFileStore::new(tmp.path());
        assert!(store.load_completed().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreadable_snapshot_loads_as_none() {
        let tmp = TempDir::new().unwrap();
        // A directory where the snapshot file should be fails the read with
        // an error other than NotFound; loads must still degrade to None.
        std::fs::create_dir(tmp.path().join(CHECKPOINT_KEY)).unwrap();

        let store = JsonFileStore::new(tmp.path());
        assert!(store.load_checkpoint().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_missing_is_ok() {
        let tmp = TempDir::new().unwrap();
        let store = JsonFileStore::new(tmp.path());
        store.clear_checkpoint().await.unwrap();
        store.clear_completed().await.unwrap();
    }

    #[tokio::test]
    async fn test_checkpoint_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = JsonFileStore::new(tmp.path());

        let checkpoint = ProcessingCheckpoint {
            records: vec![crate::ingest::ViewingRecord {
                title: "Show".to_string(),
                watched_on: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            }],
            processed_count: 0,
            partial_items: Vec::new(),
            active: true,
            source_digest: "abc".to_string(),
        };

        store.save_checkpoint(&checkpoint).await.unwrap();
        let loaded = store.load_checkpoint().await.unwrap().unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert!(loaded.active);
        assert_eq!(loaded.source_digest, "abc");
    }
}
