// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the client crates.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::KobeError;

/// Server-assigned conversation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub i64);

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message identifier. Locally created messages use the creation instant in
/// milliseconds until the server assigns a real id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl MessageId {
    /// Id derived from a local timestamp.
    pub fn local(at: DateTime<Utc>) -> Self {
        MessageId(at.timestamp_millis())
    }
}

/// Author of a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One message inside a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Set on the assistant placeholder while a reply is streaming.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pending: bool,
}

impl Message {
    /// A message created on this device at `at`.
    pub fn local(role: Role, content: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::local(at),
            role,
            content: content.into(),
            created_at: at,
            pending: false,
        }
    }
}

/// A conversation and the portion of its history loaded so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default)]
    pub title: Option<String>,
    /// Oldest first.
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// One page of message history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// A send that was recorded while offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOfflineMessage {
    /// Queue position assigned by the store; strictly increasing.
    pub id: i64,
    pub conversation_id: ConversationId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Link state as seen by the connectivity monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum LinkState {
    Unknown,
    Online,
    Offline,
}

/// Snapshot published by the connectivity monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityState {
    pub link: LinkState,
    /// Round-trip time of the most recent successful probe.
    pub latency: Option<Duration>,
}

impl Default for ConnectivityState {
    fn default() -> Self {
        Self {
            link: LinkState::Unknown,
            latency: None,
        }
    }
}

/// Account tier reported by the profile endpoint.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum UserRole {
    Normal,
    Vip,
    Svip,
    Admin,
}

/// Profile of the signed-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    pub user_role: UserRole,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Token issued by the login or refresh endpoints.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    /// Lifetime from the instant of issue; `None` means the configured default.
    pub ttl: Option<Duration>,
}

/// Response envelope used by every JSON endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    /// Code 200 is success; every other code is an application failure.
    pub fn into_result(self) -> Result<Option<T>, KobeError> {
        if self.code == 200 {
            Ok(self.data)
        } else {
            Err(KobeError::Api {
                code: self.code,
                message: self.message.unwrap_or_else(|| "request failed".to_string()),
            })
        }
    }

    /// Like [`ApiEnvelope::into_result`] but requires a payload.
    pub fn into_data(self) -> Result<T, KobeError> {
        self.into_result()?
            .ok_or_else(|| KobeError::Internal("response envelope carried no data".into()))
    }
}

/// Durable key-value slots owned by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum StorageKey {
    Token,
    TokenExpiry,
    UserProfile,
    Conversations,
    CurrentConversation,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn role_uses_uppercase_wire_names() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"ASSISTANT\"");
        let parsed: Role = serde_json::from_str("\"USER\"").unwrap();
        assert_eq!(parsed, Role::User);
        assert_eq!(Role::from_str("assistant").unwrap(), Role::Assistant);
    }

    #[test]
    fn message_deserializes_backend_shape() {
        let json = r#"{"id":7,"role":"ASSISTANT","content":"hi","createdAt":"2026-01-02T03:04:05Z"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, MessageId(7));
        assert_eq!(msg.role, Role::Assistant);
        assert!(!msg.pending);
    }

    #[test]
    fn pending_flag_is_not_serialized_when_false() {
        let msg = Message::local(Role::User, "hello", Utc::now());
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("pending"));
    }

    #[test]
    fn envelope_success_and_failure() {
        let ok: ApiEnvelope<i64> = serde_json::from_str(r#"{"code":200,"data":5}"#).unwrap();
        assert_eq!(ok.into_data().unwrap(), 5);

        let err: ApiEnvelope<i64> =
            serde_json::from_str(r#"{"code":500,"message":"boom","data":null}"#).unwrap();
        match err.into_result() {
            Err(KobeError::Api { code, message }) => {
                assert_eq!(code, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn storage_keys_are_snake_case() {
        assert_eq!(StorageKey::TokenExpiry.to_string(), "token_expiry");
        assert_eq!(StorageKey::CurrentConversation.to_string(), "current_conversation");
    }

    #[test]
    fn profile_deserializes_with_optional_fields_missing() {
        let json = r#"{"id":1,"username":"kobe","userRole":"VIP"}"#;
        let profile: UserProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.user_role, UserRole::Vip);
        assert!(profile.email.is_none());
    }
}
