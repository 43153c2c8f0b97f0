// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE body builders.
//!
//! [`TimedBody`] yields chunks after fixed delays on the tokio clock, so
//! timer behavior can be tested with `start_paused = true`. It counts how
//! many times it has been dropped so tests can assert the reader was
//! released exactly once.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;

/// `data: <payload>` followed by a blank line.
pub fn data(payload: &str) -> String {
    format!("data: {payload}\n\n")
}

/// A `choices[0].delta.content` frame.
pub fn delta(content: &str) -> String {
    data(&serde_json::json!({"choices": [{"delta": {"content": content}}]}).to_string())
}

/// A delta frame nested under a `data` wrapper.
pub fn wrapped_delta(content: &str) -> String {
    data(&serde_json::json!({"data": {"choices": [{"delta": {"content": content}}]}}).to_string())
}

/// SSE comment keep-alive.
pub fn keep_alive() -> String {
    ": keep-alive\n\n".to_string()
}

/// Terminal frame.
pub fn done() -> String {
    data("[DONE]")
}

/// What a [`TimedBody`] does after its last chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEnd {
    /// End of stream.
    Close,
    /// Stay open without sending anything.
    Hang,
}

/// Byte stream with scheduled chunks.
pub struct TimedBody {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>,
    drops: Arc<AtomicUsize>,
}

impl TimedBody {
    /// Each entry is `(delay before this chunk, chunk)`.
    pub fn new(chunks: Vec<(Duration, Vec<u8>)>, end: BodyEnd) -> Self {
        let queue: VecDeque<(Duration, Vec<u8>)> = chunks.into();
        let inner = futures::stream::unfold(queue, move |mut queue| async move {
            match queue.pop_front() {
                Some((delay, chunk)) => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Some((Ok(Bytes::from(chunk)), queue))
                }
                None => {
                    if end == BodyEnd::Hang {
                        futures::future::pending::<()>().await;
                    }
                    None
                }
            }
        });
        Self {
            inner: Box::pin(inner),
            drops: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// All chunks immediately, then close.
    pub fn immediate<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Vec<u8>>,
    {
        Self::new(
            chunks
                .into_iter()
                .map(|c| (Duration::ZERO, c.into()))
                .collect(),
            BodyEnd::Close,
        )
    }

    /// Chunks, then a transport error.
    pub fn failing_after<I, S>(chunks: I, message: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Vec<u8>>,
    {
        let items: Vec<Result<Bytes, std::io::Error>> = chunks
            .into_iter()
            .map(|c| Ok(Bytes::from(c.into())))
            .chain(std::iter::once(Err(std::io::Error::other(message.to_string()))))
            .collect();
        Self {
            inner: Box::pin(futures::stream::iter(items)),
            drops: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter incremented when this body is dropped.
    pub fn drop_counter(&self) -> Arc<AtomicUsize> {
        self.drops.clone()
    }
}

impl Stream for TimedBody {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.as_mut().poll_next(cx)
    }
}

impl Drop for TimedBody {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Split `body` into pieces at the given byte offsets.
pub fn split_at_offsets(body: &[u8], offsets: &[usize]) -> Vec<Vec<u8>> {
    let mut cuts: Vec<usize> = offsets
        .iter()
        .copied()
        .filter(|&o| o > 0 && o < body.len())
        .collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut pieces = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts {
        pieces.push(body[start..cut].to_vec());
        start = cut;
    }
    pieces.push(body[start..].to_vec());
    pieces
}
