// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connectivity monitoring for the KobeAI chat client.

pub mod monitor;
pub mod probe;

pub use monitor::ConnectivityMonitor;
pub use probe::HttpProbe;
