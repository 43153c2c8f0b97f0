// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted `ChatTransport` for coordinator and reconciler tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use kobeai_core::{ChatRequest, ChatTransport, KobeError, Message, Role, StreamFailure};

/// One scripted outcome, consumed per call.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Emit each update in order, then resolve with the last one.
    Reply(Vec<String>),
    /// Emit the updates, then fail with the given stream failure.
    PartialThenFail(Vec<String>, StreamFailure),
    Fail(StreamFailure),
    AuthExpired,
    Network(String),
}

impl Scripted {
    pub fn reply(text: &str) -> Self {
        Scripted::Reply(vec![text.to_string()])
    }
}

/// A recorded call.
#[derive(Debug, Clone)]
pub struct TransportCall {
    pub request: ChatRequest,
    pub bearer: String,
    pub at: tokio::time::Instant,
}

/// Replays a queue of [`Scripted`] outcomes. An exhausted script replies
/// `"mock reply"`.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<TransportCall>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, outcome: Scripted) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn stream_reply(
        &self,
        request: &ChatRequest,
        bearer: &str,
        on_update: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<Message, KobeError> {
        self.calls.lock().unwrap().push(TransportCall {
            request: request.clone(),
            bearer: bearer.to_string(),
            at: tokio::time::Instant::now(),
        });
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Scripted::reply("mock reply"));

        match next {
            Scripted::Reply(updates) => {
                for update in &updates {
                    tokio::task::yield_now().await;
                    on_update(update);
                }
                let content = updates.last().cloned().unwrap_or_default();
                Ok(Message::local(Role::Assistant, content, Utc::now()))
            }
            Scripted::PartialThenFail(updates, failure) => {
                for update in &updates {
                    on_update(update);
                }
                Err(failure.into())
            }
            Scripted::Fail(failure) => Err(failure.into()),
            Scripted::AuthExpired => Err(KobeError::AuthExpired {
                message: "HTTP 401".into(),
            }),
            Scripted::Network(message) => Err(KobeError::Network {
                message,
                source: None,
            }),
        }
    }
}
