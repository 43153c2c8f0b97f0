// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits at the seams between client components.
//!
//! All traits use `#[async_trait]` so they can be held as `Arc<dyn _>` and
//! swapped for in-memory fakes in tests.

pub mod conversation;
pub mod probe;
pub mod refresh;
pub mod store;
pub mod transport;

pub use conversation::ConversationApi;
pub use probe::{ConnectivityProbe, ProbeResult};
pub use refresh::CredentialRefresher;
pub use store::ClientStore;
pub use transport::{ChatRequest, ChatTransport};
