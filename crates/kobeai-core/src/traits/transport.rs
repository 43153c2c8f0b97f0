// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming reply transport.

use async_trait::async_trait;

use crate::error::KobeError;
use crate::types::{ConversationId, Message};

/// A single user turn to be answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub conversation_id: ConversationId,
    pub message: String,
}

/// Produces one assistant reply for a user turn.
///
/// `on_update` receives the cumulative reply text every time it changes.
/// Implementations resolve exactly once: with the final assistant message or
/// with a classified error.
#[async_trait]
pub trait ChatTransport: Send + Sync + 'static {
    async fn stream_reply(
        &self,
        request: &ChatRequest,
        bearer: &str,
        on_update: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<Message, KobeError>;
}
