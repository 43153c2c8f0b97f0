// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable client-side storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::KobeError;
use crate::types::{ConversationId, PendingOfflineMessage, StorageKey};

/// Durable storage for credentials, cached state, and the offline queue.
///
/// Key-value reads fail soft: a missing or unreadable slot is `None`.
/// Key-value writes are best-effort; implementations log failures instead of
/// returning them. Queue operations report errors because losing a queued
/// send is not acceptable.
#[async_trait]
pub trait ClientStore: Send + Sync + 'static {
    /// Reads a slot.
    async fn get(&self, key: StorageKey) -> Option<String>;

    /// Writes a slot, returning once the write has been attempted.
    async fn set(&self, key: StorageKey, value: &str);

    /// Removes a slot.
    async fn remove(&self, key: StorageKey);

    /// Appends a send to the offline queue.
    async fn enqueue_pending(
        &self,
        conversation_id: ConversationId,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<PendingOfflineMessage, KobeError>;

    /// All queued sends in insertion order.
    async fn pending_messages(&self) -> Vec<PendingOfflineMessage>;

    /// Removes one queued send after it was confirmed.
    async fn remove_pending(&self, id: i64) -> Result<(), KobeError>;

    /// Drops every queued send.
    async fn clear_pending(&self) -> Result<(), KobeError>;
}
