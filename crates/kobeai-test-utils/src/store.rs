// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kobeai_core::{ClientStore, ConversationId, KobeError, PendingOfflineMessage, StorageKey};

/// `ClientStore` kept entirely in memory.
#[derive(Default)]
pub struct InMemoryStore {
    slots: Mutex<HashMap<StorageKey, String>>,
    queue: Mutex<Vec<PendingOfflineMessage>>,
    next_id: Mutex<i64>,
    fail_queue: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every queue operation fail until reset.
    pub fn set_queue_failing(&self, failing: bool) {
        self.fail_queue.store(failing, Ordering::SeqCst);
    }

    fn queue_error(&self) -> Result<(), KobeError> {
        if self.fail_queue.load(Ordering::SeqCst) {
            return Err(KobeError::Storage {
                source: "queue unavailable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ClientStore for InMemoryStore {
    async fn get(&self, key: StorageKey) -> Option<String> {
        self.slots.lock().unwrap().get(&key).cloned()
    }

    async fn set(&self, key: StorageKey, value: &str) {
        self.slots.lock().unwrap().insert(key, value.to_string());
    }

    async fn remove(&self, key: StorageKey) {
        self.slots.lock().unwrap().remove(&key);
    }

    async fn enqueue_pending(
        &self,
        conversation_id: ConversationId,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<PendingOfflineMessage, KobeError> {
        self.queue_error()?;
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            *next
        };
        let item = PendingOfflineMessage {
            id,
            conversation_id,
            content: content.to_string(),
            timestamp: at,
        };
        self.queue.lock().unwrap().push(item.clone());
        Ok(item)
    }

    async fn pending_messages(&self) -> Vec<PendingOfflineMessage> {
        self.queue.lock().unwrap().clone()
    }

    async fn remove_pending(&self, id: i64) -> Result<(), KobeError> {
        self.queue_error()?;
        self.queue.lock().unwrap().retain(|m| m.id != id);
        Ok(())
    }

    async fn clear_pending(&self) -> Result<(), KobeError> {
        self.queue_error()?;
        self.queue.lock().unwrap().clear();
        Ok(())
    }
}
