// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation state behavior over scripted collaborators.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kobeai_auth::TokenGuard;
use kobeai_chat::reconciler::{DEFAULT_TITLE, OFFLINE_NOTICE};
use kobeai_chat::{ConversationReconciler, SendCoordinator, SendOutcome};
use kobeai_config::model::{AuthConfig, RetryConfig};
use kobeai_connectivity::ConnectivityMonitor;
use kobeai_core::{
    ClientStore, Conversation, ConversationId, KobeError, Message, MessageId, MessagePage, Role,
    StorageKey, StreamFailure,
};
use kobeai_test_utils::{
    InMemoryStore, MockConversationApi, MockProbe, MockRefresher, Scripted, ScriptedTransport,
};

struct Harness {
    reconciler: Arc<ConversationReconciler>,
    transport: Arc<ScriptedTransport>,
    api: Arc<MockConversationApi>,
    probe: Arc<MockProbe>,
    monitor: Arc<ConnectivityMonitor>,
    store: Arc<InMemoryStore>,
}

async fn harness(script: Vec<Scripted>) -> Harness {
    harness_with_store(script, Arc::new(InMemoryStore::new())).await
}

async fn harness_with_store(script: Vec<Scripted>, store: Arc<InMemoryStore>) -> Harness {
    let guard = Arc::new(TokenGuard::load(store.clone(), &AuthConfig::default()).await);
    guard
        .set_credential(Some("tok"), Some(Duration::from_secs(86_400)))
        .await;
    let transport = Arc::new(ScriptedTransport::new(script));
    let probe = Arc::new(MockProbe::new(true));
    let monitor = Arc::new(ConnectivityMonitor::new(
        probe.clone(),
        Duration::from_secs(30),
    ));
    let coordinator = Arc::new(SendCoordinator::new(
        transport.clone(),
        guard,
        Arc::new(MockRefresher::new()),
        monitor.clone(),
        &RetryConfig::default(),
    ));
    let api = Arc::new(MockConversationApi::new());
    let reconciler = Arc::new(ConversationReconciler::new(
        coordinator,
        api.clone(),
        store.clone(),
    ));
    Harness {
        reconciler,
        transport,
        api,
        probe,
        monitor,
        store,
    }
}

fn conversation(id: i64, title: &str) -> Conversation {
    Conversation {
        id: ConversationId(id),
        title: Some(title.to_string()),
        messages: Vec::new(),
        created_at: Utc::now(),
        updated_at: None,
        has_more: false,
        next_cursor: None,
    }
}

fn message(id: i64, role: Role, content: &str) -> Message {
    Message {
        id: MessageId(id),
        ..Message::local(role, content, Utc::now())
    }
}

fn roles(conversation: &Conversation) -> Vec<Role> {
    conversation.messages.iter().map(|m| m.role).collect()
}

#[tokio::test]
async fn blank_content_is_rejected_without_side_effects() {
    let h = harness(vec![]).await;
    let err = h
        .reconciler
        .send_message("   \n", &mut |_: &str| {})
        .await
        .unwrap_err();
    assert!(matches!(err, KobeError::Validation(_)));
    assert!(h.api.calls().is_empty());
    assert_eq!(h.transport.call_count(), 0);
}

#[tokio::test]
async fn first_send_creates_conversation_and_fills_placeholder() {
    let h = harness(vec![Scripted::Reply(vec!["你".into(), "你好".into()])]).await;
    let reconciler = h.reconciler.clone();
    let mut seen_in_placeholder = Vec::new();

    let outcome = h
        .reconciler
        .send_message("打个招呼", &mut |text: &str| {
            let current = reconciler.current_conversation().unwrap();
            let last = current.messages.last().unwrap();
            assert!(last.pending);
            seen_in_placeholder.push(last.content.clone());
            assert_eq!(text, last.content);
        })
        .await
        .unwrap();

    assert_eq!(seen_in_placeholder, vec!["你", "你好"]);
    let SendOutcome::Delivered(reply) = outcome else {
        panic!("expected delivery");
    };
    assert_eq!(reply.content, "你好");

    assert_eq!(h.api.calls(), vec!["create".to_string()]);
    let current = h.reconciler.current_conversation().unwrap();
    assert_eq!(current.title.as_deref(), Some(DEFAULT_TITLE));
    assert_eq!(roles(&current), vec![Role::User, Role::Assistant]);
    let last = current.messages.last().unwrap();
    assert!(!last.pending);
    assert_eq!(last.content, "你好");
    assert_eq!(last.id, reply.id);
    assert_ne!(current.messages[0].id, last.id);
}

#[tokio::test(start_paused = true)]
async fn failed_send_removes_only_the_placeholder() {
    let h = harness(vec![
        Scripted::PartialThenFail(vec!["半".into()], StreamFailure::ServerUnresponsive),
        Scripted::Fail(StreamFailure::EmptyResult),
        Scripted::Fail(StreamFailure::EmptyResult),
    ])
    .await;
    h.api.insert(conversation(3, "existing"));
    h.reconciler.load_conversations().await.unwrap();

    let err = h
        .reconciler
        .send_message("hello", &mut |_: &str| {})
        .await
        .unwrap_err();

    assert!(matches!(err, KobeError::SendFailed { attempts: 3, .. }));
    let current = h.reconciler.current_conversation().unwrap();
    assert_eq!(roles(&current), vec![Role::User]);
    assert_eq!(current.messages[0].content, "hello");
    assert!(!h.reconciler.has_pending_messages().await);
}

#[tokio::test]
async fn rejected_credential_drops_conversation_snapshot() {
    let h = harness(vec![Scripted::AuthExpired]).await;
    h.api.insert(conversation(3, "existing"));
    h.reconciler.load_conversations().await.unwrap();
    h.store
        .enqueue_pending(ConversationId(3), "queued earlier", Utc::now())
        .await
        .unwrap();
    assert!(h.store.get(StorageKey::Conversations).await.is_some());

    let err = h
        .reconciler
        .send_message("hello", &mut |_: &str| {})
        .await
        .unwrap_err();

    assert!(err.is_auth());
    assert!(h.store.get(StorageKey::Conversations).await.is_none());
    assert!(h.store.get(StorageKey::CurrentConversation).await.is_none());
    assert!(h.store.get(StorageKey::Token).await.is_none());
    assert!(h.reconciler.conversations().is_empty());
    assert!(h.reconciler.current_id().is_none());
    assert!(h.reconciler.has_pending_messages().await);
}

#[tokio::test]
async fn offline_send_is_queued_and_delivered_once_on_reconnect() {
    let h = harness(vec![Scripted::reply("回复")]).await;
    h.api.insert(conversation(42, "chat"));
    h.reconciler.load_conversations().await.unwrap();
    h.monitor.set_platform_online(false).await;

    let outcome = h
        .reconciler
        .send_message("离线消息", &mut |_: &str| {})
        .await
        .unwrap();

    let SendOutcome::Queued(queued) = outcome else {
        panic!("expected the message to be queued");
    };
    assert_eq!(queued.conversation_id, ConversationId(42));
    assert!(h.reconciler.has_pending_messages().await);
    assert_eq!(h.transport.call_count(), 0);

    let current = h.reconciler.current_conversation().unwrap();
    assert_eq!(roles(&current), vec![Role::User, Role::System]);
    assert_eq!(current.messages[1].content, OFFLINE_NOTICE);

    h.monitor.set_platform_online(true).await;
    let report = h.reconciler.drain_pending().await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(report.remaining, 0);
    assert!(!h.reconciler.has_pending_messages().await);

    let calls = h.transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].request.conversation_id, ConversationId(42));
    assert_eq!(calls[0].request.message, "离线消息");

    let current = h.reconciler.current_conversation().unwrap();
    assert_eq!(roles(&current), vec![Role::User, Role::System, Role::Assistant]);
    let user_messages = current
        .messages
        .iter()
        .filter(|m| m.role == Role::User)
        .count();
    assert_eq!(user_messages, 1);
}

#[tokio::test]
async fn drain_while_still_offline_keeps_queue() {
    let h = harness(vec![]).await;
    h.api.insert(conversation(1, "chat"));
    h.reconciler.load_conversations().await.unwrap();
    h.monitor.set_platform_online(false).await;
    h.reconciler
        .send_message("one", &mut |_: &str| {})
        .await
        .unwrap();

    let report = h.reconciler.drain_pending().await.unwrap();
    assert_eq!(report.sent, 0);
    assert_eq!(report.remaining, 1);
    assert!(h.reconciler.has_pending_messages().await);
}

#[tokio::test(start_paused = true)]
async fn drain_preserves_order_and_stops_at_failure() {
    let h = harness(vec![
        Scripted::reply("first reply"),
        Scripted::Fail(StreamFailure::EmptyResult),
        Scripted::Fail(StreamFailure::EmptyResult),
        Scripted::Fail(StreamFailure::EmptyResult),
    ])
    .await;
    h.api.insert(conversation(1, "chat"));
    h.reconciler.load_conversations().await.unwrap();
    h.monitor.set_platform_online(false).await;
    for text in ["a", "b", "c"] {
        h.reconciler
            .send_message(text, &mut |_: &str| {})
            .await
            .unwrap();
    }

    h.monitor.set_platform_online(true).await;
    let report = h.reconciler.drain_pending().await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(report.remaining, 2);

    let pending: Vec<String> = h
        .store
        .pending_messages()
        .await
        .into_iter()
        .map(|p| p.content)
        .collect();
    assert_eq!(pending, vec!["b", "c"]);
    let sent: Vec<String> = h
        .transport
        .calls()
        .into_iter()
        .map(|c| c.request.message)
        .collect();
    assert_eq!(sent, vec!["a", "b", "b", "b"]);
}

#[tokio::test]
async fn unreachable_probe_after_transport_error_queues() {
    let h = harness(vec![Scripted::Network("connection refused".into())]).await;
    h.api.insert(conversation(1, "chat"));
    h.reconciler.load_conversations().await.unwrap();
    h.probe.set_reachable(false);

    let outcome = h
        .reconciler
        .send_message("hello", &mut |_: &str| {})
        .await
        .unwrap();
    assert!(matches!(outcome, SendOutcome::Queued(_)));
    assert_eq!(h.transport.call_count(), 1);
}

#[tokio::test]
async fn snapshot_survives_restart() {
    let store = Arc::new(InMemoryStore::new());
    let h = harness_with_store(vec![Scripted::reply("pong")], store.clone()).await;
    h.api.insert(conversation(1, "first"));
    h.api.insert(conversation(2, "second"));
    h.reconciler.load_conversations().await.unwrap();
    h.reconciler
        .switch_conversation(ConversationId(2))
        .await
        .unwrap();
    h.reconciler
        .send_message("ping", &mut |_: &str| {})
        .await
        .unwrap();

    let restarted = harness_with_store(vec![], store).await;
    restarted.reconciler.restore().await;
    assert_eq!(restarted.reconciler.conversations().len(), 2);
    let current = restarted.reconciler.current_conversation().unwrap();
    assert_eq!(current.id, ConversationId(2));
    assert_eq!(current.messages.len(), 2);
    assert_eq!(current.messages[1].content, "pong");
}

#[tokio::test]
async fn snapshot_with_other_version_restores_empty() {
    let h = harness(vec![]).await;
    h.store
        .set(
            StorageKey::Conversations,
            r#"{"version":"0.9","conversations":[{"id":1,"createdAt":"2026-01-01T00:00:00Z"}]}"#,
        )
        .await;
    h.store.set(StorageKey::CurrentConversation, "1").await;

    h.reconciler.restore().await;
    assert!(h.reconciler.conversations().is_empty());
    assert_eq!(h.reconciler.current_id(), None);
}

#[tokio::test]
async fn malformed_snapshot_restores_empty() {
    let h = harness(vec![]).await;
    h.store.set(StorageKey::Conversations, "not json").await;
    h.reconciler.restore().await;
    assert!(h.reconciler.conversations().is_empty());
}

#[tokio::test]
async fn switch_loads_history_and_load_more_prepends() {
    let h = harness(vec![]).await;
    h.api.insert(conversation(1, "first"));
    h.api.insert(conversation(5, "paged"));
    h.api.push_page(
        ConversationId(5),
        MessagePage {
            messages: vec![message(30, Role::User, "q3"), message(31, Role::Assistant, "a3")],
            has_more: true,
            next_cursor: Some("c30".into()),
        },
    );
    h.api.push_page(
        ConversationId(5),
        MessagePage {
            messages: vec![message(20, Role::User, "q2"), message(21, Role::Assistant, "a2")],
            has_more: false,
            next_cursor: None,
        },
    );
    h.reconciler.load_conversations().await.unwrap();
    assert_eq!(h.reconciler.current_id(), Some(ConversationId(1)));

    let switched = h
        .reconciler
        .switch_conversation(ConversationId(5))
        .await
        .unwrap();
    assert_eq!(switched.messages.len(), 2);
    assert!(switched.has_more);

    assert_eq!(h.reconciler.load_more_messages().await.unwrap(), 2);
    let current = h.reconciler.current_conversation().unwrap();
    let contents: Vec<&str> = current.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["q2", "a2", "q3", "a3"]);
    assert!(!current.has_more);

    assert_eq!(h.reconciler.load_more_messages().await.unwrap(), 0);
    let calls = h.api.calls();
    assert!(calls.contains(&"messages:5:-:20".to_string()));
    assert!(calls.contains(&"messages:5:c30:20".to_string()));
    assert_eq!(calls.iter().filter(|c| c.starts_with("messages")).count(), 2);
}

#[tokio::test]
async fn switch_to_unknown_conversation_fails() {
    let h = harness(vec![]).await;
    let err = h
        .reconciler
        .switch_conversation(ConversationId(99))
        .await
        .unwrap_err();
    assert!(matches!(err, KobeError::Validation(_)));
}

#[tokio::test]
async fn create_rename_delete() {
    let h = harness(vec![]).await;
    h.api.insert(conversation(1, "old"));
    h.reconciler.load_conversations().await.unwrap();

    let created = h.reconciler.create_conversation(Some("  ")).await.unwrap();
    assert_eq!(created.title.as_deref(), Some(DEFAULT_TITLE));
    assert_eq!(h.reconciler.current_id(), Some(created.id));
    assert_eq!(h.reconciler.conversations()[0].id, created.id);

    h.reconciler
        .rename_conversation(created.id, "旅行计划")
        .await
        .unwrap();
    assert_eq!(
        h.reconciler.current_conversation().unwrap().title.as_deref(),
        Some("旅行计划")
    );
    assert!(matches!(
        h.reconciler.rename_conversation(created.id, " ").await,
        Err(KobeError::Validation(_))
    ));

    h.reconciler.delete_conversation(created.id).await.unwrap();
    assert_eq!(h.reconciler.current_id(), Some(ConversationId(1)));
    assert_eq!(h.reconciler.conversations().len(), 1);
}

#[tokio::test]
async fn clear_drops_local_state_but_not_queue() {
    let h = harness(vec![]).await;
    h.api.insert(conversation(1, "chat"));
    h.reconciler.load_conversations().await.unwrap();
    h.monitor.set_platform_online(false).await;
    h.reconciler
        .send_message("later", &mut |_: &str| {})
        .await
        .unwrap();

    h.reconciler.clear().await;
    assert!(h.reconciler.conversations().is_empty());
    assert!(h.store.get(StorageKey::Conversations).await.is_none());
    assert!(h.reconciler.has_pending_messages().await);
}
