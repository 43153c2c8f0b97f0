// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for KobeAI client tests.
//!
//! In-memory fakes for every collaborator trait in `kobeai-core`, plus
//! helpers for building SSE bodies that arrive on a (paused) tokio clock.
//!
//! # Components
//!
//! - [`InMemoryStore`] - `ClientStore` over plain maps
//! - [`ScriptedTransport`] - `ChatTransport` replaying scripted outcomes
//! - [`MockRefresher`], [`MockProbe`], [`MockConversationApi`]
//! - [`sse`] - frame builders and [`sse::TimedBody`]

pub mod mock_api;
pub mod mock_transport;
pub mod sse;
pub mod store;

pub use mock_api::{MockConversationApi, MockProbe, MockRefresher};
pub use mock_transport::{Scripted, ScriptedTransport, TransportCall};
pub use store::InMemoryStore;
