// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;

use crate::error::KobeError;
use crate::types::IssuedToken;

/// Exchanges a still-valid bearer credential for a fresh one.
#[async_trait]
pub trait CredentialRefresher: Send + Sync + 'static {
    /// `bearer` is the full `Bearer <token>` header value.
    async fn refresh(&self, bearer: &str) -> Result<IssuedToken, KobeError>;
}
