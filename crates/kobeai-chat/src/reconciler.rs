// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local conversation state kept consistent with sends, failures, and the
//! offline queue.
//!
//! The conversation list and the selected conversation are persisted as a
//! versioned snapshot after every structural change, so a restart resumes
//! where the previous session left off.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use kobeai_core::{
    ChatRequest, ClientStore, Conversation, ConversationApi, ConversationId, KobeError, Message,
    MessageId, PendingOfflineMessage, Role, StorageKey,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::coordinator::SendCoordinator;

pub const DEFAULT_TITLE: &str = "新对话";
pub const OFFLINE_NOTICE: &str = "当前网络不可用，消息将在网络恢复后自动发送";
const PAGE_SIZE: u32 = 20;
const SNAPSHOT_VERSION: &str = "1.0";

/// How a send ended when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Delivered(Message),
    /// The server was unreachable; the message waits in the offline queue.
    Queued(PendingOfflineMessage),
}

/// Result of draining the offline queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    pub sent: usize,
    pub remaining: usize,
}

#[derive(Debug, Default)]
struct ChatState {
    conversations: Vec<Conversation>,
    current: Option<ConversationId>,
}

impl ChatState {
    fn conversation_mut(&mut self, id: ConversationId) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: String,
    conversations: Vec<Conversation>,
}

pub struct ConversationReconciler {
    coordinator: Arc<SendCoordinator>,
    api: Arc<dyn ConversationApi>,
    store: Arc<dyn ClientStore>,
    state: Mutex<ChatState>,
    last_local_id: AtomicI64,
    draining: tokio::sync::Mutex<()>,
}

impl ConversationReconciler {
    pub fn new(
        coordinator: Arc<SendCoordinator>,
        api: Arc<dyn ConversationApi>,
        store: Arc<dyn ClientStore>,
    ) -> Self {
        Self {
            coordinator,
            api,
            store,
            state: Mutex::new(ChatState::default()),
            last_local_id: AtomicI64::new(0),
            draining: tokio::sync::Mutex::new(()),
        }
    }

    pub fn coordinator(&self) -> &Arc<SendCoordinator> {
        &self.coordinator
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.with_state(|s| s.conversations.clone())
    }

    pub fn current_id(&self) -> Option<ConversationId> {
        self.with_state(|s| s.current)
    }

    pub fn current_conversation(&self) -> Option<Conversation> {
        self.with_state(|s| {
            let id = s.current?;
            s.conversations.iter().find(|c| c.id == id).cloned()
        })
    }

    /// Load the persisted snapshot. A missing, unreadable, or differently
    /// versioned snapshot restores an empty state.
    pub async fn restore(&self) {
        let conversations = match self.store.get(StorageKey::Conversations).await {
            Some(json) => match serde_json::from_str::<Snapshot>(&json) {
                Ok(snapshot) if snapshot.version == SNAPSHOT_VERSION => snapshot.conversations,
                Ok(snapshot) => {
                    warn!(version = %snapshot.version, "ignoring conversation snapshot with unknown version");
                    Vec::new()
                }
                Err(e) => {
                    warn!(error = %e, "conversation snapshot is malformed");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        let current = self
            .store
            .get(StorageKey::CurrentConversation)
            .await
            .and_then(|raw| raw.parse::<i64>().ok())
            .map(ConversationId)
            .filter(|id| conversations.iter().any(|c| c.id == *id));

        debug!(count = conversations.len(), ?current, "conversation state restored");
        self.with_state(|s| {
            s.conversations = conversations;
            s.current = current;
        });
    }

    /// Write the snapshot and the selected conversation id.
    pub async fn persist(&self) {
        let (snapshot, current) = self.with_state(|s| {
            (
                Snapshot {
                    version: SNAPSHOT_VERSION.to_string(),
                    conversations: s.conversations.clone(),
                },
                s.current,
            )
        });
        match serde_json::to_string(&snapshot) {
            Ok(json) => self.store.set(StorageKey::Conversations, &json).await,
            Err(e) => warn!(error = %e, "failed to serialize conversation snapshot"),
        }
        match current {
            Some(id) => {
                self.store
                    .set(StorageKey::CurrentConversation, &id.to_string())
                    .await
            }
            None => self.store.remove(StorageKey::CurrentConversation).await,
        }
    }

    /// Fetch the conversation list, selecting the first one when nothing
    /// valid is selected. Already loaded history is kept.
    pub async fn load_conversations(&self) -> Result<Vec<Conversation>, KobeError> {
        let fetched = self.on_rejection(self.api.list().await).await?;
        let list = self.with_state(|s| {
            let previous = std::mem::take(&mut s.conversations);
            s.conversations = fetched
                .into_iter()
                .map(|mut fresh| {
                    if fresh.messages.is_empty()
                        && let Some(old) = previous.iter().find(|c| c.id == fresh.id)
                    {
                        fresh.messages = old.messages.clone();
                        fresh.has_more = old.has_more;
                        fresh.next_cursor = old.next_cursor.clone();
                    }
                    fresh
                })
                .collect();
            let selected_exists = s
                .current
                .is_some_and(|id| s.conversations.iter().any(|c| c.id == id));
            if !selected_exists {
                s.current = s.conversations.first().map(|c| c.id);
            }
            s.conversations.clone()
        });
        info!(count = list.len(), "conversations loaded");
        self.persist().await;
        Ok(list)
    }

    /// Create a conversation on the server, put it first, and select it.
    pub async fn create_conversation(&self, title: Option<&str>) -> Result<Conversation, KobeError> {
        let title = title.map(str::trim).filter(|t| !t.is_empty()).unwrap_or(DEFAULT_TITLE);
        let conversation = self.on_rejection(self.api.create(title).await).await?;
        self.with_state(|s| {
            s.conversations.retain(|c| c.id != conversation.id);
            s.conversations.insert(0, conversation.clone());
            s.current = Some(conversation.id);
        });
        info!(conversation_id = %conversation.id, "conversation created");
        self.persist().await;
        Ok(conversation)
    }

    /// Select a known conversation, fetching its newest page when no history
    /// is loaded yet.
    pub async fn switch_conversation(&self, id: ConversationId) -> Result<Conversation, KobeError> {
        let needs_history = self.with_state(|s| {
            s.conversations
                .iter()
                .find(|c| c.id == id)
                .map(|c| c.messages.is_empty())
        });
        let Some(needs_history) = needs_history else {
            return Err(KobeError::Validation(format!("对话 {id} 不存在")));
        };

        let page = if needs_history {
            Some(self.on_rejection(self.api.messages(id, None, PAGE_SIZE).await).await?)
        } else {
            None
        };

        let conversation = self.with_state(|s| {
            s.current = Some(id);
            let conversation = s.conversation_mut(id)?;
            if let Some(page) = page {
                conversation.messages = page.messages;
                conversation.has_more = page.has_more;
                conversation.next_cursor = page.next_cursor;
            }
            Some(conversation.clone())
        });
        self.persist().await;
        conversation.ok_or_else(|| KobeError::Validation(format!("对话 {id} 不存在")))
    }

    /// Prepend the next older page of the selected conversation. Returns the
    /// number of messages added; zero when there is nothing more to load.
    pub async fn load_more_messages(&self) -> Result<usize, KobeError> {
        let target = self.with_state(|s| {
            let id = s.current?;
            let c = s.conversations.iter().find(|c| c.id == id)?;
            c.has_more.then(|| (id, c.next_cursor.clone()))
        });
        let Some((id, cursor)) = target else {
            return Ok(0);
        };

        let page = self
            .on_rejection(self.api.messages(id, cursor.as_deref(), PAGE_SIZE).await)
            .await?;
        let added = page.messages.len();
        self.with_state(|s| {
            if let Some(c) = s.conversation_mut(id) {
                let newer = std::mem::take(&mut c.messages);
                c.messages = page.messages;
                c.messages.extend(newer);
                c.has_more = page.has_more;
                c.next_cursor = page.next_cursor;
            }
        });
        debug!(conversation_id = %id, added, "older messages loaded");
        self.persist().await;
        Ok(added)
    }

    pub async fn rename_conversation(&self, id: ConversationId, title: &str) -> Result<(), KobeError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(KobeError::Validation("标题不能为空".into()));
        }
        self.on_rejection(self.api.rename(id, title).await).await?;
        self.with_state(|s| {
            if let Some(c) = s.conversation_mut(id) {
                c.title = Some(title.to_string());
            }
        });
        self.persist().await;
        Ok(())
    }

    /// Delete a conversation. When it was selected, the first remaining one
    /// becomes selected.
    pub async fn delete_conversation(&self, id: ConversationId) -> Result<(), KobeError> {
        self.on_rejection(self.api.delete(id).await).await?;
        self.with_state(|s| {
            s.conversations.retain(|c| c.id != id);
            if s.current == Some(id) {
                s.current = s.conversations.first().map(|c| c.id);
            }
        });
        info!(conversation_id = %id, "conversation deleted");
        self.persist().await;
        Ok(())
    }

    /// Drop all local conversation state.
    pub async fn clear(&self) {
        self.with_state(|s| *s = ChatState::default());
        self.store.remove(StorageKey::Conversations).await;
        self.store.remove(StorageKey::CurrentConversation).await;
    }

    pub async fn has_pending_messages(&self) -> bool {
        !self.store.pending_messages().await.is_empty()
    }

    /// Send `content` in the selected conversation, creating one first when
    /// none is selected.
    ///
    /// `on_update` receives the cumulative reply while it streams. When the
    /// server cannot be reached the message is queued and
    /// [`SendOutcome::Queued`] is returned instead of an error.
    pub async fn send_message(
        &self,
        content: &str,
        on_update: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<SendOutcome, KobeError> {
        if content.trim().is_empty() {
            return Err(KobeError::Validation("消息内容不能为空".into()));
        }
        let conversation_id = match self.current_id() {
            Some(id) => id,
            None => self.create_conversation(None).await?.id,
        };

        let now = Utc::now();
        let user = Message {
            id: self.next_local_id(now),
            ..Message::local(Role::User, content, now)
        };
        self.with_state(|s| {
            if let Some(c) = s.conversation_mut(conversation_id) {
                c.messages.push(user);
                c.updated_at = Some(now);
            }
        });

        match self.deliver(conversation_id, content, on_update).await {
            Ok(message) => Ok(SendOutcome::Delivered(message)),
            Err(KobeError::Offline) => {
                let queued = self.queue_offline(conversation_id, content).await?;
                Ok(SendOutcome::Queued(queued))
            }
            Err(e) => Err(e),
        }
    }

    /// Send every queued message in insertion order. Stops at the first
    /// failure so later messages never overtake earlier ones.
    pub async fn drain_pending(&self) -> Result<DrainReport, KobeError> {
        let Ok(_drain) = self.draining.try_lock() else {
            debug!("offline queue drain already running");
            return Ok(DrainReport::default());
        };

        let pending = self.store.pending_messages().await;
        if pending.is_empty() {
            return Ok(DrainReport::default());
        }
        info!(count = pending.len(), "draining offline queue");

        let mut report = DrainReport {
            sent: 0,
            remaining: pending.len(),
        };
        for item in pending {
            match self
                .deliver(item.conversation_id, &item.content, &mut |_: &str| {})
                .await
            {
                Ok(_) => {
                    self.store.remove_pending(item.id).await?;
                    report.sent += 1;
                    report.remaining -= 1;
                }
                Err(KobeError::Offline) => {
                    info!(remaining = report.remaining, "still offline; keeping queued messages");
                    break;
                }
                Err(e) => {
                    warn!(pending_id = item.id, error = %e, "queued message not delivered");
                    if e.is_auth() {
                        return Err(e);
                    }
                    break;
                }
            }
        }
        Ok(report)
    }

    /// Stream one reply into a pending assistant placeholder. On failure the
    /// placeholder is removed and the user message stays.
    async fn deliver(
        &self,
        conversation_id: ConversationId,
        content: &str,
        on_update: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<Message, KobeError> {
        let placeholder_id = self.next_local_id(Utc::now());
        let placeholder = Message {
            id: placeholder_id,
            pending: true,
            ..Message::local(Role::Assistant, "", Utc::now())
        };
        self.with_state(|s| {
            if let Some(c) = s.conversation_mut(conversation_id) {
                c.messages.push(placeholder);
            }
        });
        self.persist().await;

        let request = ChatRequest {
            conversation_id,
            message: content.to_string(),
        };
        let state = &self.state;
        let mut forward = |text: &str| {
            if let Some(m) = lock(state)
                .conversation_mut(conversation_id)
                .and_then(|c| c.messages.iter_mut().find(|m| m.id == placeholder_id))
            {
                m.content = text.to_string();
            }
            on_update(text);
        };
        let result = self
            .coordinator
            .send(&request, &mut forward)
            .await
            .map(|reply| Message {
                id: self.next_local_id(reply.created_at),
                pending: false,
                ..reply
            });

        self.with_state(|s| {
            let Some(c) = s.conversation_mut(conversation_id) else {
                return;
            };
            match &result {
                Ok(reply) => {
                    if let Some(m) = c.messages.iter_mut().find(|m| m.id == placeholder_id) {
                        *m = reply.clone();
                    }
                    c.updated_at = Some(reply.created_at);
                }
                Err(_) => c.messages.retain(|m| m.id != placeholder_id),
            }
        });
        if !matches!(&result, Err(e) if e.is_auth()) {
            self.persist().await;
        }
        self.on_rejection(result).await
    }

    async fn queue_offline(
        &self,
        conversation_id: ConversationId,
        content: &str,
    ) -> Result<PendingOfflineMessage, KobeError> {
        let now = Utc::now();
        let notice = Message {
            id: self.next_local_id(now),
            ..Message::local(Role::System, OFFLINE_NOTICE, now)
        };
        self.with_state(|s| {
            if let Some(c) = s.conversation_mut(conversation_id) {
                c.messages.push(notice);
            }
        });
        self.persist().await;
        let queued = self
            .store
            .enqueue_pending(conversation_id, content, now)
            .await?;
        info!(conversation_id = %conversation_id, pending_id = queued.id, "message queued until reconnect");
        Ok(queued)
    }

    /// Millisecond timestamp ids, bumped so ids created in the same
    /// millisecond stay distinct.
    fn next_local_id(&self, at: DateTime<Utc>) -> MessageId {
        let candidate = MessageId::local(at).0;
        let mut last = self.last_local_id.load(Ordering::SeqCst);
        loop {
            let next = candidate.max(last + 1);
            match self
                .last_local_id
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return MessageId(next),
                Err(actual) => last = actual,
            }
        }
    }

    /// Drop all local conversation state when the credential was rejected.
    async fn on_rejection<T>(&self, result: Result<T, KobeError>) -> Result<T, KobeError> {
        if let Err(e) = &result
            && e.is_auth()
        {
            info!("session ended; dropping local conversation state");
            self.clear().await;
        }
        result
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ChatState) -> R) -> R {
        f(&mut lock(&self.state))
    }
}

fn lock(state: &Mutex<ChatState>) -> std::sync::MutexGuard<'_, ChatState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
