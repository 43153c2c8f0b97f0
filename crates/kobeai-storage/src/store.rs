// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`ClientStore`] backed by the SQLite database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kobeai_core::{ClientStore, ConversationId, KobeError, PendingOfflineMessage, StorageKey};
use tracing::warn;

use crate::database::Database;
use crate::queries::{kv, pending};

/// Durable client store.
///
/// Slot reads and writes never fail the caller; errors are logged and reads
/// degrade to `None`. Queue operations propagate errors.
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open the database at `path` and wrap it.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, KobeError> {
        Ok(Self::new(Database::open_with(path, wal_mode).await?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn close(self) -> Result<(), KobeError> {
        self.db.close().await
    }
}

#[async_trait]
impl ClientStore for SqliteStore {
    async fn get(&self, key: StorageKey) -> Option<String> {
        match kv::get(&self.db, &key.to_string()).await {
            Ok(value) => value,
            Err(e) => {
                warn!(%key, error = %e, "failed to read client slot");
                None
            }
        }
    }

    async fn set(&self, key: StorageKey, value: &str) {
        if let Err(e) = kv::set(&self.db, &key.to_string(), value).await {
            warn!(%key, error = %e, "failed to write client slot");
        }
    }

    async fn remove(&self, key: StorageKey) {
        if let Err(e) = kv::remove(&self.db, &key.to_string()).await {
            warn!(%key, error = %e, "failed to remove client slot");
        }
    }

    async fn enqueue_pending(
        &self,
        conversation_id: ConversationId,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<PendingOfflineMessage, KobeError> {
        pending::enqueue(&self.db, conversation_id, content, at).await
    }

    async fn pending_messages(&self) -> Vec<PendingOfflineMessage> {
        pending::list(&self.db).await.unwrap_or_else(|e| {
            warn!(error = %e, "failed to read offline queue");
            Vec::new()
        })
    }

    async fn remove_pending(&self, id: i64) -> Result<(), KobeError> {
        if !pending::remove(&self.db, id).await? {
            warn!(id, "queued send was already removed");
        }
        Ok(())
    }

    async fn clear_pending(&self) -> Result<(), KobeError> {
        pending::clear(&self.db).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn slots_and_queue_through_trait() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        let store = SqliteStore::open(path.to_str().unwrap(), true).await.unwrap();
        let store: &dyn ClientStore = &store;

        store.set(StorageKey::Token, "Bearer abc").await;
        assert_eq!(store.get(StorageKey::Token).await.as_deref(), Some("Bearer abc"));
        store.remove(StorageKey::Token).await;
        assert_eq!(store.get(StorageKey::Token).await, None);

        let item = store
            .enqueue_pending(ConversationId(42), "hi", Utc::now())
            .await
            .unwrap();
        assert_eq!(store.pending_messages().await.len(), 1);
        store.remove_pending(item.id).await.unwrap();
        assert!(store.pending_messages().await.is_empty());
    }
}
