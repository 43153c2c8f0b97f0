// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential handling for the KobeAI chat client.
//!
//! - [`TokenGuard`] owns the bearer credential and its expiry.
//! - [`AuthClient`] wraps the login, refresh, logout, and profile endpoints.
//! - [`ApiClient`] is the shared JSON request helper for envelope endpoints.
//! - [`redact`] keeps credentials out of log output.

pub mod api;
pub mod client;
pub mod guard;
pub mod redact;

pub use api::ApiClient;
pub use client::AuthClient;
pub use guard::{Credential, SessionEvent, TokenGuard};
pub use redact::{RedactingWriter, SecretValues};
