// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Send coordination and conversation state for the KobeAI chat client.
//!
//! [`SendCoordinator`] retries and classifies individual sends,
//! [`ConversationReconciler`] keeps local conversations in step with them and
//! owns the offline queue, and [`ClientContext`] wires both to the real
//! transport, probe, and store.

pub mod context;
pub mod conversations_api;
pub mod coordinator;
pub mod reconciler;

pub use context::ClientContext;
pub use conversations_api::HttpConversationApi;
pub use coordinator::{SendCoordinator, SendPhase};
pub use kobeai_auth::SessionEvent;
pub use reconciler::{ConversationReconciler, DrainReport, SendOutcome};
