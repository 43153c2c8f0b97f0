// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the KobeAI chat client.
//!
//! [`KobeError`] is the only error type that crosses crate boundaries.
//! Stream-level failures are classified by [`StreamFailure`] so the retry
//! coordinator can decide between retrying and surfacing.

use std::time::Duration;

use thiserror::Error;

/// Classified failure of a single streaming attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamFailure {
    /// Only liveness frames arrived and the byte stream then went silent.
    #[error("server unresponsive")]
    ServerUnresponsive,

    /// Liveness frames kept arriving but no content was produced in time.
    #[error("server scheduling delay")]
    SchedulingDelay,

    /// The response head did not arrive within the connect window.
    #[error("connection timed out")]
    ConnectTimeout,

    /// The overall read ceiling elapsed before the stream completed.
    #[error("request timed out")]
    RequestTimeout,

    /// The stream completed without producing any content.
    #[error("empty response")]
    EmptyResult,

    /// The stream completed with only the connection-established placeholder.
    #[error("response contained only the connection placeholder")]
    PlaceholderOnly,

    /// Non-success HTTP status other than 401.
    #[error("unexpected HTTP status {status}")]
    HttpStatus { status: u16 },

    /// The server emitted an explicit error event.
    #[error("server error: {message}")]
    ServerError { message: String },

    /// The byte stream failed mid-read.
    #[error("transport error: {message}")]
    Transport { message: String },
}

/// The primary error type used across the client.
#[derive(Debug, Error)]
pub enum KobeError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Durable storage errors (database open, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Transport-level failures talking to the backend.
    #[error("network error: {message}")]
    Network {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A classified streaming failure.
    #[error(transparent)]
    Stream(#[from] StreamFailure),

    /// The credential is missing, expired, rejected, or could not be refreshed.
    #[error("session expired: {message}")]
    AuthExpired { message: String },

    /// The backend returned an application-level failure envelope.
    #[error("api error {code}: {message}")]
    Api { code: i64, message: String },

    /// Input rejected before any work was started.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The link is offline; the send was not attempted.
    #[error("offline")]
    Offline,

    /// Every retry attempt failed.
    #[error("send failed after {attempts} attempts: {last}")]
    SendFailed { attempts: u32, last: StreamFailure },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl KobeError {
    /// Whether a send attempt failing with this error may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            KobeError::Stream(_) | KobeError::Timeout { .. } => true,
            KobeError::Network { .. } => true,
            _ => false,
        }
    }

    /// Whether this error means the credential is no longer usable.
    pub fn is_auth(&self) -> bool {
        matches!(self, KobeError::AuthExpired { .. })
    }

    /// Short message suitable for showing to the person using the client.
    pub fn user_message(&self) -> String {
        match self {
            KobeError::AuthExpired { .. } => "登录已过期，请重新登录".to_string(),
            KobeError::Validation(msg) => msg.clone(),
            KobeError::Offline => "网络已断开，消息将在恢复连接后发送".to_string(),
            KobeError::SendFailed { .. } => "发送消息失败，请稍后重试".to_string(),
            KobeError::Stream(StreamFailure::ServerUnresponsive) => {
                "服务器响应超时，请稍后重试".to_string()
            }
            KobeError::Stream(StreamFailure::SchedulingDelay) => {
                "服务器调度延迟，请稍后重试".to_string()
            }
            KobeError::Stream(StreamFailure::EmptyResult)
            | KobeError::Stream(StreamFailure::PlaceholderOnly) => {
                "服务器返回了空响应".to_string()
            }
            other => other.to_string(),
        }
    }
}
