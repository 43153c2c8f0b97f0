// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming reply ingestion for the KobeAI chat client.
//!
//! Bytes from the chat-completions endpoint flow through four stages:
//! [`decode`] turns chunks into lines, [`frame`] classifies lines into typed
//! frames, [`session`] folds frames into content and tracks liveness, and
//! [`engine`] runs the read loop with its timers. [`client`] wires this to
//! HTTP and implements the core `ChatTransport` trait.

pub mod client;
pub mod decode;
pub mod engine;
pub mod frame;
pub mod identity;
pub mod session;

pub use client::ChatClient;
pub use engine::StreamEngine;
pub use frame::{Frame, FrameClassifier, Payload};
pub use session::StreamPolicy;
