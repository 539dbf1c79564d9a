//! Atomic, write-temp-then-rename snapshot persistence.
//!
//! Every component in the orchestration core treats its in-memory state as
//! the source of truth and periodically (or on every mutation) snapshots
//! it to a single JSON blob under a component-specific path (spec §6).
//! `SnapshotStore<T>` is the shared mechanism: load on construction,
//! persist explicitly, never partially written.

use orch_core::error::{OrchError, OrchResult};
use serde::{de::DeserializeOwned, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Holds one component's whole-state blob in memory and knows how to
/// write it back to disk atomically.
#[derive(Clone)]
pub struct SnapshotStore<T> {
    path: PathBuf,
    state: Arc<RwLock<T>>,
}

impl<T> SnapshotStore<T>
where
    T: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
{
    /// Load existing state from `path`, or start from `T::default()`.
    pub async fn open(path: impl Into<PathBuf>) -> OrchResult<Self> {
        let path = path.into();
        let loaded = Self::read(&path).await?.unwrap_or_default();
        Ok(Self {
            path,
            state: Arc::new(RwLock::new(loaded)),
        })
    }

    async fn read(path: &PathBuf) -> OrchResult<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = tokio::fs::read(path).await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| OrchError::fatal(format!("failed to parse snapshot {path:?}: {e}")))?;
        Ok(Some(value))
    }

    pub async fn read_state(&self) -> tokio::sync::RwLockReadGuard<'_, T> {
        self.state.read().await
    }

    pub async fn write_state(&self) -> tokio::sync::RwLockWriteGuard<'_, T> {
        self.state.write().await
    }

    /// Snapshot the current in-memory state to disk. Persistence errors are
    /// `Fatal` to the calling operation; they never corrupt the on-disk
    /// copy since the write lands on a sibling `.tmp` file first.
    pub async fn persist(&self) -> OrchResult<()> {
        let snapshot = {
            let guard = self.state.read().await;
            serde_json::to_vec_pretty(&*guard)
                .map_err(|e| OrchError::fatal(format!("failed to encode snapshot: {e}")))?
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &snapshot).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::debug!(path = %self.path.display(), bytes = snapshot.len(), "persisted snapshot");
        Ok(())
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq, Clone)]
    struct Counter {
        value: u64,
    }

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state.json");

        {
            let store = SnapshotStore::<Counter>::open(&path).await.unwrap();
            {
                let mut state = store.write_state().await;
                state.value = 42;
            }
            store.persist().await.unwrap();
        }

        let reopened = SnapshotStore::<Counter>::open(&path).await.unwrap();
        assert_eq!(reopened.read_state().await.value, 42);
    }

    #[tokio::test]
    async fn missing_file_starts_from_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let store = SnapshotStore::<Counter>::open(&path).await.unwrap();
        assert_eq!(*store.read_state().await, Counter::default());
    }
}
