//! Resumable-backfill checkpoint persistence.
//!
//! One JSON file tracks the last processed message id per chat. Updates are
//! monotonic: a lower id is never written, so replays after a crash re-read
//! at most `checkpoint_interval` messages and idempotent chunk writes absorb
//! the duplicates.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

/// Progress record for a single chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillRecord {
    pub last_message_id: i64,
    /// ISO-8601 instant of the last update.
    pub updated_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BackfillSnapshot {
    chats: HashMap<String, BackfillRecord>,
}

/// Persists per-chat backfill progress to a JSON file.
///
/// The store is the only writer of its file; all mutation happens under an
/// internal lock.
pub struct BackfillStateStore {
    path: PathBuf,
    state: Mutex<HashMap<String, BackfillRecord>>,
}

impl BackfillStateStore {
    /// Opens the store, loading any existing snapshot from disk.
    ///
    /// A missing or corrupt file starts the store empty; the parent
    /// directory is created on demand.
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let state = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<BackfillSnapshot>(&content) {
                Ok(snapshot) => snapshot.chats,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt backfill state file, starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e),
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Returns the last processed message id for a chat, if any.
    pub async fn last_message_id(&self, chat_id: &str) -> Option<i64> {
        self.state
            .lock()
            .await
            .get(chat_id)
            .map(|r| r.last_message_id)
    }

    /// Persists progress for a chat. Regressions are ignored.
    pub async fn update_chat(&self, chat_id: &str, message_id: i64) -> io::Result<()> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.get(chat_id) {
            if existing.last_message_id >= message_id {
                return Ok(());
            }
        }

        state.insert(
            chat_id.to_string(),
            BackfillRecord {
                last_message_id: message_id,
                updated_at: Utc::now().to_rfc3339(),
            },
        );
        self.persist(&state).await
    }

    /// Returns a copy of the in-memory state.
    pub async fn snapshot(&self) -> HashMap<String, BackfillRecord> {
        self.state.lock().await.clone()
    }

    async fn persist(&self, state: &HashMap<String, BackfillRecord>) -> io::Result<()> {
        let snapshot = BackfillSnapshot {
            chats: state.clone(),
        };
        let content = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        tokio::fs::write(&self.path, content).await
    }
}
