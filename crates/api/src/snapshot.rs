//! Last-known-good dashboard payloads.
//!
//! Every successful dashboard read is remembered in memory and, when a
//! directory is configured, written to `<dir>/<sha256(key)>.json`. If the
//! database later becomes unreachable the dashboard serves these copies
//! instead.
//!
//! At most `max_entries` keys are kept; the oldest key is evicted (and its
//! file removed) to make room for a new one.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

/// Default bound on the number of remembered keys.
pub const DEFAULT_MAX_SNAPSHOTS: usize = 256;

/// On-disk form. The key is stored so a file can never answer for another key.
#[derive(Serialize, Deserialize)]
struct StoredSnapshot {
    key: String,
    data: Value,
}

#[derive(Default)]
struct Entries {
    values: HashMap<String, Value>,
    /// Keys in insertion order, oldest first.
    order: VecDeque<String>,
}

pub struct SnapshotCache {
    dir: Option<PathBuf>,
    max_entries: usize,
    entries: RwLock<Entries>,
}

impl SnapshotCache {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self::with_max_entries(dir, DEFAULT_MAX_SNAPSHOTS)
    }

    pub fn with_max_entries(dir: Option<PathBuf>, max_entries: usize) -> Self {
        Self {
            dir,
            max_entries: max_entries.max(1),
            entries: RwLock::new(Entries::default()),
        }
    }

    /// Remember `value` under `key`. Disk failures are logged, not returned.
    pub async fn put(&self, key: &str, value: Value) {
        if let Some(path) = self.path_for(key) {
            let stored = StoredSnapshot {
                key: key.to_string(),
                data: value.clone(),
            };
            let write = async {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let bytes = serde_json::to_vec(&stored).map_err(std::io::Error::other)?;
                tokio::fs::write(&path, bytes).await
            };
            if let Err(e) = write.await {
                tracing::warn!(key, path = %path.display(), error = %e, "Failed to persist dashboard snapshot");
            }
        }
        let evicted = self.remember(key, value).await;
        for old in evicted {
            self.remove_file(&old).await;
        }
    }

    /// The last snapshot for `key`, from memory or disk.
    pub async fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.entries.read().await.values.get(key) {
            return Some(value.clone());
        }
        let path = self.path_for(key)?;
        let bytes = tokio::fs::read(&path).await.ok()?;
        match serde_json::from_slice::<StoredSnapshot>(&bytes) {
            Ok(stored) if stored.key == key => {
                let evicted = self.remember(key, stored.data.clone()).await;
                for old in evicted {
                    self.remove_file(&old).await;
                }
                Some(stored.data)
            }
            Ok(stored) => {
                tracing::warn!(key, found = %stored.key, path = %path.display(), "Ignoring dashboard snapshot stored for another key");
                None
            }
            Err(e) => {
                tracing::warn!(key, path = %path.display(), error = %e, "Ignoring corrupt dashboard snapshot");
                None
            }
        }
    }

    /// Number of keys held in memory.
    pub async fn len(&self) -> usize {
        self.entries.read().await.values.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Insert into memory, returning the keys evicted to stay within bounds.
    async fn remember(&self, key: &str, value: Value) -> Vec<String> {
        let mut entries = self.entries.write().await;
        if entries.values.insert(key.to_string(), value).is_some() {
            return Vec::new();
        }
        entries.order.push_back(key.to_string());
        let mut evicted = Vec::new();
        while entries.order.len() > self.max_entries {
            if let Some(old) = entries.order.pop_front() {
                entries.values.remove(&old);
                evicted.push(old);
            }
        }
        evicted
    }

    async fn remove_file(&self, key: &str) {
        let Some(path) = self.path_for(key) else {
            return;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(key, path = %path.display(), error = %e, "Failed to remove evicted dashboard snapshot");
            }
        }
    }

    fn path_for(&self, key: &str) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        let digest = Sha256::digest(key.as_bytes());
        Some(dir.join(format!("{digest:x}.json")))
    }
}
