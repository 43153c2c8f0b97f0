// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the KobeAI chat client.
//!
//! This crate provides the error taxonomy, the shared data model, and the
//! collaborator traits that the auth, connectivity, stream, and chat crates
//! plug into.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{KobeError, StreamFailure};
pub use types::{
    ApiEnvelope, ConnectivityState, Conversation, ConversationId, IssuedToken, LinkState,
    Message, MessageId, MessagePage, PendingOfflineMessage, Role, StorageKey, UserProfile,
    UserRole,
};

pub use traits::{
    ChatRequest, ChatTransport, ClientStore, ConnectivityProbe, ConversationApi,
    CredentialRefresher, ProbeResult,
};
