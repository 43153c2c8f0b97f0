// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The stream read loop.
//!
//! One `select!` drives the body reads, the periodic timer tick, and the
//! overall read deadline, so a stream has exactly one terminal outcome. The
//! body is owned by a [`ReaderGuard`] and released once, whichever way the
//! loop ends (including when the future itself is dropped).

use std::fmt::Display;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use kobeai_core::StreamFailure;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::decode::LineDecoder;
use crate::frame::{Frame, FrameClassifier};
use crate::session::{Step, StreamPolicy, StreamSession};

/// Owns the response body and releases it exactly once.
struct ReaderGuard<S> {
    reader: Option<S>,
}

impl<S> ReaderGuard<S> {
    fn new(reader: S) -> Self {
        Self {
            reader: Some(reader),
        }
    }

    fn get_mut(&mut self) -> Option<&mut S> {
        self.reader.as_mut()
    }

    fn release(&mut self, outcome: &str) {
        if let Some(reader) = self.reader.take() {
            drop(reader);
            debug!(outcome, "stream reader released");
        }
    }
}

impl<S> Drop for ReaderGuard<S> {
    fn drop(&mut self) {
        self.release("dropped");
    }
}

/// Consumes SSE response bodies into assembled assistant text.
#[derive(Debug, Clone, Default)]
pub struct StreamEngine {
    policy: StreamPolicy,
}

impl StreamEngine {
    pub fn new(policy: StreamPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &StreamPolicy {
        &self.policy
    }

    /// Read `body` to completion.
    ///
    /// `on_update` receives the cumulative content every time it changes.
    pub async fn run<S, E>(
        &self,
        body: S,
        on_update: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<String, StreamFailure>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: Display,
    {
        let mut guard = ReaderGuard::new(body);
        let outcome = match guard.get_mut() {
            Some(reader) => self.drive(reader, on_update).await,
            None => Err(StreamFailure::Transport {
                message: "stream reader already released".into(),
            }),
        };
        match &outcome {
            Ok(content) => {
                info!(chars = content.chars().count(), "stream completed");
                guard.release("completed");
            }
            Err(failure) => {
                warn!(%failure, "stream failed");
                guard.release("failed");
            }
        }
        outcome
    }

    async fn drive<S, E>(
        &self,
        reader: &mut S,
        on_update: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<String, StreamFailure>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: Display,
    {
        let start = Instant::now();
        let mut session = StreamSession::new(self.policy.clone(), start);
        let mut decoder = LineDecoder::new();
        let mut classifier = FrameClassifier::new(
            self.policy.keepalive_markers.clone(),
            self.policy.placeholder.clone(),
        );

        let deadline = tokio::time::sleep_until(start + self.policy.read_timeout);
        tokio::pin!(deadline);
        let mut ticker =
            tokio::time::interval_at(start + self.policy.tick_interval, self.policy.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                () = &mut deadline => {
                    return Err(StreamFailure::RequestTimeout);
                }

                _ = ticker.tick() => {
                    if let Some(failure) = session.check_timers(Instant::now()) {
                        return Err(failure);
                    }
                }

                chunk = reader.next() => {
                    let frames = match chunk {
                        Some(Ok(bytes)) => {
                            session.on_bytes(Instant::now());
                            decoder
                                .feed(&bytes)
                                .iter()
                                .flat_map(|line| classifier.classify(line))
                                .collect::<Vec<_>>()
                        }
                        Some(Err(e)) => {
                            return Err(StreamFailure::Transport { message: e.to_string() });
                        }
                        None => {
                            debug!("stream body ended");
                            let mut frames: Vec<Frame> = decoder
                                .finish()
                                .map(|line| classifier.classify(&line))
                                .unwrap_or_default();
                            frames.extend(classifier.finish());
                            frames.push(Frame::Done);
                            frames
                        }
                    };

                    if apply_frames(&mut session, frames, on_update)? {
                        return session.finish();
                    }
                    if let Some(failure) = session.check_timers(Instant::now()) {
                        return Err(failure);
                    }
                }
            }
        }
    }
}

/// Apply frames in order. Returns `Ok(true)` once a completion frame is seen;
/// frames after it are not applied.
fn apply_frames(
    session: &mut StreamSession,
    frames: Vec<Frame>,
    on_update: &mut (dyn for<'s> FnMut(&'s str) + Send),
) -> Result<bool, StreamFailure> {
    for frame in frames {
        debug!(?frame, "stream frame");
        match session.apply(frame) {
            Step::Continue => {}
            Step::Updated => on_update(session.content()),
            Step::Complete => return Ok(true),
            Step::Fail(failure) => return Err(failure),
        }
    }
    Ok(false)
}
