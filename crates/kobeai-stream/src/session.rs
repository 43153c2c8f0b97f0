// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-attempt stream state: assembled content, liveness counters, and the
//! timer rules evaluated against them.

use std::time::Duration;

use kobeai_config::model::StreamConfig;
use kobeai_core::StreamFailure;
use tokio::time::Instant;

use crate::frame::{Frame, Payload};

/// Timer thresholds and liveness rules for one stream.
#[derive(Debug, Clone)]
pub struct StreamPolicy {
    pub read_timeout: Duration,
    pub stall_timeout: Duration,
    pub stall_liveness_threshold: u32,
    pub keepalive_only_timeout: Duration,
    pub tick_interval: Duration,
    pub keepalive_markers: Vec<String>,
    pub placeholder: String,
}

impl StreamPolicy {
    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            read_timeout: config.read_timeout(),
            stall_timeout: config.stall_timeout(),
            stall_liveness_threshold: config.stall_liveness_threshold,
            keepalive_only_timeout: config.keepalive_only_timeout(),
            tick_interval: config.tick_interval(),
            keepalive_markers: config.keepalive_markers.clone(),
            placeholder: config.placeholder_text.clone(),
        }
    }
}

impl Default for StreamPolicy {
    fn default() -> Self {
        Self::from_config(&StreamConfig::default())
    }
}

/// Result of applying one frame to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Nothing visible changed.
    Continue,
    /// The assembled content changed.
    Updated,
    /// The server signalled completion.
    Complete,
    Fail(StreamFailure),
}

#[derive(Debug)]
pub struct StreamSession {
    policy: StreamPolicy,
    content: String,
    content_seen: bool,
    /// Liveness frames since the last content frame.
    liveness: u32,
    liveness_total: u32,
    started_at: Instant,
    last_byte_at: Instant,
}

impl StreamSession {
    pub fn new(policy: StreamPolicy, now: Instant) -> Self {
        Self {
            policy,
            content: String::new(),
            content_seen: false,
            liveness: 0,
            liveness_total: 0,
            started_at: now,
            last_byte_at: now,
        }
    }

    pub fn policy(&self) -> &StreamPolicy {
        &self.policy
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Record that bytes arrived, whatever they turn out to contain.
    pub fn on_bytes(&mut self, now: Instant) {
        self.last_byte_at = now;
    }

    pub fn apply(&mut self, frame: Frame) -> Step {
        match frame {
            Frame::KeepAlive => {
                self.liveness = self.liveness.saturating_add(1);
                self.liveness_total = self.liveness_total.saturating_add(1);
                Step::Continue
            }
            Frame::Payload(Payload::ContentDelta(text)) if !text.is_empty() => {
                self.content.push_str(&text);
                self.mark_content();
                Step::Updated
            }
            Frame::Payload(Payload::FullReplace(text)) if !text.is_empty() => {
                if self.content == text {
                    self.mark_content();
                    return Step::Continue;
                }
                self.content = text;
                self.mark_content();
                Step::Updated
            }
            Frame::Payload(_) | Frame::Ignored => Step::Continue,
            Frame::Done => Step::Complete,
            Frame::ServerError(message) => Step::Fail(StreamFailure::ServerError { message }),
        }
    }

    /// Evaluate the stall and keep-alive-only rules.
    pub fn check_timers(&self, now: Instant) -> Option<StreamFailure> {
        if self.content_seen {
            return None;
        }
        let silence = now.saturating_duration_since(self.last_byte_at);
        if silence >= self.policy.stall_timeout
            && self.liveness >= self.policy.stall_liveness_threshold
        {
            return Some(StreamFailure::ServerUnresponsive);
        }
        let elapsed = now.saturating_duration_since(self.started_at);
        if elapsed > self.policy.keepalive_only_timeout && self.liveness_total > 0 {
            return Some(StreamFailure::SchedulingDelay);
        }
        None
    }

    /// Validate the assembled content once the stream is complete.
    pub fn finish(self) -> Result<String, StreamFailure> {
        let trimmed = self.content.trim();
        if trimmed.is_empty() {
            Err(StreamFailure::EmptyResult)
        } else if trimmed == self.policy.placeholder {
            Err(StreamFailure::PlaceholderOnly)
        } else {
            Ok(self.content)
        }
    }

    fn mark_content(&mut self) {
        self.content_seen = true;
        self.liveness = 0;
    }
}
