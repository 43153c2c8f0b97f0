// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

use async_trait::async_trait;

/// Outcome of one reachability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// The server answered with some HTTP status.
    Reachable { status: u16, latency: Duration },
    /// No HTTP response was received.
    Unreachable { reason: String },
}

/// Active reachability check against the backend.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync + 'static {
    async fn probe(&self) -> ProbeResult;
}
