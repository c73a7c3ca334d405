//! Persisted state (§4.12, §6, §9).
//!
//! A single JSON document at `<dataDir>/state.json`: stats, last-known public IPs, and
//! tracked-record summaries. Writes go through an explicit [`DebouncedWriter`] rather
//! than closures tucked inside a timer: callers `mark()` the state dirty and a
//! background task flushes at most once per debounce window, using an atomic
//! temp-file-plus-rename write pattern. Loading is tolerant of a corrupt or
//! missing file — startup never fails because of a bad state document.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::time::Duration;

const STATE_FILE_VERSION: &str = "1.0";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateStats {
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    pub errors: u64,
    pub last_poll: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedRecordSummary {
    pub hostname: String,
    pub record_type: crate::model::RecordType,
    pub provider_id: String,
    pub external_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub stats: StateStats,
    #[serde(default)]
    pub last_known_public_ipv4: Option<String>,
    #[serde(default)]
    pub last_known_public_ipv6: Option<String>,
    #[serde(default)]
    pub tracked_records: HashMap<String, TrackedRecordSummary>,
}

fn default_version() -> String {
    STATE_FILE_VERSION.to_string()
}

impl Default for StateDocument {
    fn default() -> Self {
        Self {
            version: default_version(),
            stats: StateStats::default(),
            last_known_public_ipv4: None,
            last_known_public_ipv6: None,
            tracked_records: HashMap::new(),
        }
    }
}

/// Owns the in-memory state document plus its on-disk path; mutation happens through
/// `with_mut`, persistence through the paired [`DebouncedWriter`].
pub struct StateManager {
    path: PathBuf,
    document: Mutex<StateDocument>,
}

impl StateManager {
    /// Loads `<data_dir>/state.json`, tolerating a missing or corrupt file by falling
    /// back to an empty document rather than failing startup.
    pub async fn load(data_dir: impl AsRef<Path>) -> Self {
        let path = data_dir.as_ref().join("state.json");
        let document = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match serde_json::from_str::<StateDocument>(&contents) {
                Ok(doc) => {
                    if doc.version != STATE_FILE_VERSION {
                        tracing::warn!(
                            found = %doc.version,
                            expected = STATE_FILE_VERSION,
                            "state file version mismatch; continuing anyway"
                        );
                    }
                    doc
                }
                Err(e) => {
                    tracing::warn!(error = %e, "state file corrupt; starting from empty state");
                    StateDocument::default()
                }
            },
            Err(_) => StateDocument::default(),
        };

        Self {
            path,
            document: Mutex::new(document),
        }
    }

    pub async fn with_mut<F: FnOnce(&mut StateDocument)>(&self, f: F) {
        let mut guard = self.document.lock().await;
        f(&mut guard);
    }

    pub async fn snapshot(&self) -> StateDocument {
        self.document.lock().await.clone()
    }

    /// Atomic temp-file + rename write.
    async fn write_now(&self) -> std::io::Result<()> {
        let document = self.document.lock().await.clone();
        let contents = serde_json::to_string_pretty(&document)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &contents).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

/// Debounces calls to persist a [`StateManager`]: `mark()` flags the state dirty; a
/// background task flushes at most once per `debounce` window.
pub struct DebouncedWriter {
    notify: Arc<Notify>,
}

impl DebouncedWriter {
    /// Spawns the background flush task. Dropping the returned `DebouncedWriter` does
    /// not stop the task; call `shutdown` explicitly for a clean stop.
    pub fn spawn(state: Arc<StateManager>, debounce: Duration) -> Self {
        let notify = Arc::new(Notify::new());
        let task_notify = notify.clone();

        tokio::spawn(async move {
            loop {
                task_notify.notified().await;
                tokio::time::sleep(debounce).await;
                // Drain any marks that arrived during the debounce window.
                while tokio::time::timeout(Duration::from_millis(0), task_notify.notified())
                    .await
                    .is_ok()
                {}

                if let Err(e) = state.write_now().await {
                    tracing::error!(error = %e, "failed to persist state document");
                }
            }
        });

        Self { notify }
    }

    /// Flags the state dirty; the background task will flush within one debounce window.
    pub fn mark(&self) {
        self.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_default_document() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateManager::load(dir.path()).await;
        let snap = state.snapshot().await;
        assert_eq!(snap.stats.created, 0);
    }

    #[tokio::test]
    async fn corrupt_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("state.json"), "{ not json")
            .await
            .unwrap();
        let state = StateManager::load(dir.path()).await;
        let snap = state.snapshot().await;
        assert_eq!(snap.stats.created, 0);
    }

    #[tokio::test]
    async fn write_now_round_trips_via_atomic_rename() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateManager::load(dir.path()).await;
        state.with_mut(|doc| doc.stats.created = 7).await;
        state.write_now().await.unwrap();

        let reloaded = StateManager::load(dir.path()).await;
        let snap = reloaded.snapshot().await;
        assert_eq!(snap.stats.created, 7);
    }
}
