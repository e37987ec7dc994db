//! Token store persisted as a JSON map on disk.
//!
//! Lets a host that runs once per delivery reuse a token across
//! invocations. Expiry is wall-clock (unix seconds) so it survives restarts.

use crate::credential::KeyValueStore;
use async_trait::async_trait;
use geofence_core::error::{GeofenceError, GeofenceResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileEntry {
    value: String,
    expires_at_secs: u64,
}

type Entries = HashMap<String, FileEntry>;

pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// A missing file is an empty store.
    async fn load(&self) -> GeofenceResult<Entries> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                GeofenceError::Store(format!("Corrupt token store {}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Entries::new()),
            Err(e) => Err(GeofenceError::Store(format!(
                "Failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn save(&self, entries: &Entries) -> GeofenceResult<()> {
        let io_err =
            |e: io::Error| GeofenceError::Store(format!("Failed to write {}: {e}", self.path.display()));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|e| GeofenceError::Store(format!("Failed to encode token store: {e}")))?;

        // Atomic replace.
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, bytes).await.map_err(io_err)?;
        tokio::fs::rename(&temp_path, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> GeofenceResult<Option<String>> {
        let now = unix_now();
        Ok(self
            .load()
            .await?
            .remove(key)
            .filter(|entry| now < entry.expires_at_secs)
            .map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> GeofenceResult<()> {
        let _guard = self.write_lock.lock().await;
        let now = unix_now();

        // Unreadable contents are dropped.
        let mut entries = match self.load().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable token store");
                Entries::new()
            }
        };
        entries.retain(|_, entry| now < entry.expires_at_secs);
        entries.insert(
            key.to_string(),
            FileEntry {
                value: value.to_string(),
                expires_at_secs: now.saturating_add(ttl.as_secs()),
            },
        );
        self.save(&entries).await
    }
}
