// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation CRUD surface of the backend.

use async_trait::async_trait;

use crate::error::KobeError;
use crate::types::{Conversation, ConversationId, MessagePage};

/// Thin request/response wrapper over the conversation endpoints.
#[async_trait]
pub trait ConversationApi: Send + Sync + 'static {
    async fn list(&self) -> Result<Vec<Conversation>, KobeError>;

    async fn create(&self, title: &str) -> Result<Conversation, KobeError>;

    async fn get(&self, id: ConversationId) -> Result<Conversation, KobeError>;

    async fn rename(&self, id: ConversationId, title: &str) -> Result<(), KobeError>;

    async fn delete(&self, id: ConversationId) -> Result<(), KobeError>;

    /// One page of history older than `cursor`; `None` starts from the newest.
    async fn messages(
        &self,
        id: ConversationId,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<MessagePage, KobeError>;
}
