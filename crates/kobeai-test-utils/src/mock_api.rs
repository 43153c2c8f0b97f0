// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fakes for the refresh, probe, and conversation collaborators.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use kobeai_core::{
    ConnectivityProbe, Conversation, ConversationApi, ConversationId, CredentialRefresher,
    IssuedToken, KobeError, MessagePage, ProbeResult,
};

/// Refresher returning queued tokens; `None` entries fail with an auth error.
/// An exhausted queue issues `"refreshed-token"`.
#[derive(Default)]
pub struct MockRefresher {
    results: Mutex<VecDeque<Option<String>>>,
    calls: AtomicUsize,
}

impl MockRefresher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let r = Self::default();
        r.results.lock().unwrap().push_back(None);
        r
    }

    pub fn push(&self, result: Option<&str>) {
        self.results
            .lock()
            .unwrap()
            .push_back(result.map(str::to_string));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialRefresher for MockRefresher {
    async fn refresh(&self, _bearer: &str) -> Result<IssuedToken, KobeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Some("refreshed-token".to_string()));
        match next {
            Some(token) => Ok(IssuedToken {
                token,
                ttl: Some(Duration::from_secs(24 * 60 * 60)),
            }),
            None => Err(KobeError::AuthExpired {
                message: "refresh rejected".into(),
            }),
        }
    }
}

/// Probe whose answer is toggled by the test.
pub struct MockProbe {
    reachable: AtomicBool,
    calls: AtomicUsize,
}

impl MockProbe {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectivityProbe for MockProbe {
    async fn probe(&self) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reachable.load(Ordering::SeqCst) {
            ProbeResult::Reachable {
                status: 200,
                latency: Duration::from_millis(12),
            }
        } else {
            ProbeResult::Unreachable {
                reason: "connection refused".into(),
            }
        }
    }
}

/// Conversation API over an in-memory list.
#[derive(Default)]
pub struct MockConversationApi {
    conversations: Mutex<Vec<Conversation>>,
    pages: Mutex<HashMap<ConversationId, VecDeque<MessagePage>>>,
    next_id: AtomicI64,
    fail_create: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl MockConversationApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a conversation as if it already existed on the server.
    pub fn insert(&self, conversation: Conversation) {
        self.next_id.fetch_max(conversation.id.0, Ordering::SeqCst);
        self.conversations.lock().unwrap().push(conversation);
    }

    /// Queue history pages served by successive `messages` calls.
    pub fn push_page(&self, id: ConversationId, page: MessagePage) {
        self.pages
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .push_back(page);
    }

    pub fn set_create_failing(&self, failing: bool) {
        self.fail_create.store(failing, Ordering::SeqCst);
    }

    /// Names of the calls made so far, e.g. `"create"` or `"delete:3"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn not_found(id: ConversationId) -> KobeError {
        KobeError::Api {
            code: 404,
            message: format!("conversation {id} not found"),
        }
    }
}

#[async_trait]
impl ConversationApi for MockConversationApi {
    async fn list(&self) -> Result<Vec<Conversation>, KobeError> {
        self.record("list".into());
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn create(&self, title: &str) -> Result<Conversation, KobeError> {
        self.record("create".into());
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(KobeError::Network {
                message: "create failed".into(),
                source: None,
            });
        }
        let id = ConversationId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let conversation = Conversation {
            id,
            title: Some(title.to_string()),
            messages: Vec::new(),
            created_at: Utc::now(),
            updated_at: None,
            has_more: false,
            next_cursor: None,
        };
        self.conversations
            .lock()
            .unwrap()
            .insert(0, conversation.clone());
        Ok(conversation)
    }

    async fn get(&self, id: ConversationId) -> Result<Conversation, KobeError> {
        self.record(format!("get:{id}"));
        self.conversations
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| Self::not_found(id))
    }

    async fn rename(&self, id: ConversationId, title: &str) -> Result<(), KobeError> {
        self.record(format!("rename:{id}"));
        let mut conversations = self.conversations.lock().unwrap();
        let conversation = conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Self::not_found(id))?;
        conversation.title = Some(title.to_string());
        Ok(())
    }

    async fn delete(&self, id: ConversationId) -> Result<(), KobeError> {
        self.record(format!("delete:{id}"));
        self.conversations.lock().unwrap().retain(|c| c.id != id);
        Ok(())
    }

    async fn messages(
        &self,
        id: ConversationId,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<MessagePage, KobeError> {
        self.record(format!(
            "messages:{id}:{}:{limit}",
            cursor.unwrap_or("-")
        ));
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get_mut(&id)
            .and_then(|q| q.pop_front())
            .unwrap_or(MessagePage {
                messages: Vec::new(),
                has_more: false,
                next_cursor: None,
            }))
    }
}
