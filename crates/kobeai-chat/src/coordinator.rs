// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry and recovery around a single send.
//!
//! A send moves through an explicit phase machine:
//!
//! ```text
//! Idle -> Sending -> Streaming -> Success
//!            |          |
//!            +----------+--> Retrying -> Sending ...
//!            |          |
//!            +----------+--> Failed
//! ```
//!
//! Authentication failures are terminal and sign the session out. Offline
//! sends are not retried; the caller queues them. Every other failure is
//! retried with a linearly growing delay until the attempt budget runs out.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kobeai_auth::{SessionEvent, TokenGuard};
use kobeai_config::model::RetryConfig;
use kobeai_connectivity::ConnectivityMonitor;
use kobeai_core::{
    ChatRequest, ChatTransport, CredentialRefresher, KobeError, Message, StreamFailure,
};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

/// Where the current send is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPhase {
    Idle,
    /// Attempt `n` (1-based) is being set up.
    Sending { attempt: u32 },
    /// Content is arriving for attempt `n`.
    Streaming { attempt: u32 },
    /// Attempt `n` failed; waiting before the next one.
    Retrying { attempt: u32 },
    Success,
    Failed,
}

impl std::fmt::Display for SendPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendPhase::Idle => write!(f, "idle"),
            SendPhase::Sending { attempt } => write!(f, "sending (attempt {attempt})"),
            SendPhase::Streaming { attempt } => write!(f, "streaming (attempt {attempt})"),
            SendPhase::Retrying { attempt } => write!(f, "retrying after attempt {attempt}"),
            SendPhase::Success => write!(f, "success"),
            SendPhase::Failed => write!(f, "failed"),
        }
    }
}

pub struct SendCoordinator {
    transport: Arc<dyn ChatTransport>,
    guard: Arc<TokenGuard>,
    refresher: Arc<dyn CredentialRefresher>,
    monitor: Arc<ConnectivityMonitor>,
    max_attempts: u32,
    base_delay: Duration,
    phase: watch::Sender<SendPhase>,
}

impl SendCoordinator {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        guard: Arc<TokenGuard>,
        refresher: Arc<dyn CredentialRefresher>,
        monitor: Arc<ConnectivityMonitor>,
        retry: &RetryConfig,
    ) -> Self {
        let (phase, _) = watch::channel(SendPhase::Idle);
        Self {
            transport,
            guard,
            refresher,
            monitor,
            max_attempts: retry.max_attempts.max(1),
            base_delay: retry.base_delay(),
            phase,
        }
    }

    pub fn phase(&self) -> SendPhase {
        *self.phase.borrow()
    }

    pub fn watch_phase(&self) -> watch::Receiver<SendPhase> {
        self.phase.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.guard.subscribe_events()
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn guard(&self) -> &Arc<TokenGuard> {
        &self.guard
    }

    /// Deliver one user turn, retrying recoverable failures.
    ///
    /// Returns `KobeError::Offline` without retrying when the server cannot be
    /// reached, `AuthExpired` when the session is no longer usable, and
    /// `SendFailed` once every attempt has failed.
    pub async fn send(
        &self,
        request: &ChatRequest,
        on_update: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<Message, KobeError> {
        let mut last_failure = StreamFailure::EmptyResult;

        for attempt in 1..=self.max_attempts {
            if !self.monitor.is_online() {
                info!(attempt, "offline before attempt; not sending");
                return Err(self.fail(KobeError::Offline));
            }
            self.set_phase(SendPhase::Sending { attempt });

            let bearer = match self.authorize().await {
                Ok(bearer) => bearer,
                Err(e) => return Err(self.sign_out(e).await),
            };

            let phase = &self.phase;
            let mut streaming = false;
            let mut forward = |content: &str| {
                if !streaming {
                    streaming = true;
                    phase.send_replace(SendPhase::Streaming { attempt });
                }
                on_update(content);
            };

            let error = match self
                .transport
                .stream_reply(request, &bearer, &mut forward)
                .await
            {
                Ok(message) => {
                    info!(attempt, conversation_id = %request.conversation_id, "message delivered");
                    self.set_phase(SendPhase::Success);
                    return Ok(message);
                }
                Err(e) => e,
            };

            if error.is_auth() {
                return Err(self.sign_out(error).await);
            }
            if matches!(error, KobeError::Network { .. }) && !self.monitor.check_connection().await
            {
                info!(attempt, error = %error, "server unreachable; treating send as offline");
                return Err(self.fail(KobeError::Offline));
            }
            if !error.is_retryable() {
                error!(attempt, error = %error, "send failed with a non-retryable error");
                return Err(self.fail(error));
            }

            last_failure = stream_failure(&error);
            let delay = self.base_delay * attempt;
            warn!(
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "send attempt failed"
            );
            self.set_phase(SendPhase::Retrying { attempt });
            tokio::time::sleep(delay).await;
        }

        error!(attempts = self.max_attempts, last = %last_failure, "send failed after all attempts");
        Err(self.fail(KobeError::SendFailed {
            attempts: self.max_attempts,
            last: last_failure,
        }))
    }

    /// A bearer value for the next attempt, refreshing it first when due.
    async fn authorize(&self) -> Result<String, KobeError> {
        let now = Utc::now();
        let credential = self
            .guard
            .credential()
            .filter(|c| c.is_valid_at(now))
            .ok_or_else(|| KobeError::AuthExpired {
                message: "no valid credential".into(),
            })?;

        if !self.guard.is_refresh_due_at(now) {
            return Ok(credential.bearer());
        }

        debug!(expires_at = %credential.expires_at(), "credential near expiry; refreshing");
        let issued = self
            .refresher
            .refresh(&credential.bearer())
            .await
            .map_err(|e| KobeError::AuthExpired {
                message: format!("credential refresh failed: {e}"),
            })?;
        self.guard
            .set_credential(Some(&issued.token), issued.ttl)
            .await;
        self.guard.bearer().ok_or_else(|| KobeError::AuthExpired {
            message: "refreshed credential is not usable".into(),
        })
    }

    async fn sign_out(&self, error: KobeError) -> KobeError {
        self.guard.sign_out(&error).await;
        self.fail(error)
    }

    fn fail(&self, error: KobeError) -> KobeError {
        self.set_phase(SendPhase::Failed);
        error
    }

    fn set_phase(&self, phase: SendPhase) {
        debug!(%phase, "send phase");
        self.phase.send_replace(phase);
    }
}

/// The stream-level classification of a retryable error.
fn stream_failure(error: &KobeError) -> StreamFailure {
    match error {
        KobeError::Stream(failure) => failure.clone(),
        KobeError::Timeout { .. } => StreamFailure::RequestTimeout,
        other => StreamFailure::Transport {
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use kobeai_config::model::AuthConfig;
    use kobeai_core::{ClientStore, ConversationId, StorageKey};
    use kobeai_test_utils::{InMemoryStore, MockProbe, MockRefresher, Scripted, ScriptedTransport};
    use tokio::time::Instant;

    use super::*;

    struct Harness {
        coordinator: SendCoordinator,
        transport: Arc<ScriptedTransport>,
        refresher: Arc<MockRefresher>,
        probe: Arc<MockProbe>,
        store: Arc<InMemoryStore>,
        guard: Arc<TokenGuard>,
    }

    async fn harness(script: Vec<Scripted>, ttl: Duration) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let guard = Arc::new(TokenGuard::load(store.clone(), &AuthConfig::default()).await);
        guard.set_credential(Some("tok"), Some(ttl)).await;
        let transport = Arc::new(ScriptedTransport::new(script));
        let refresher = Arc::new(MockRefresher::new());
        let probe = Arc::new(MockProbe::new(true));
        let monitor = Arc::new(ConnectivityMonitor::new(
            probe.clone(),
            Duration::from_secs(30),
        ));
        let coordinator = SendCoordinator::new(
            transport.clone(),
            guard.clone(),
            refresher.clone(),
            monitor,
            &RetryConfig::default(),
        );
        Harness {
            coordinator,
            transport,
            refresher,
            probe,
            store,
            guard,
        }
    }

    fn request() -> ChatRequest {
        ChatRequest {
            conversation_id: ConversationId(7),
            message: "hello".into(),
        }
    }

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[tokio::test(start_paused = true)]
    async fn success_on_first_attempt() {
        let h = harness(vec![Scripted::Reply(vec!["He".into(), "Hello".into()])], DAY).await;
        let mut phases = h.coordinator.watch_phase();
        let mut updates = Vec::new();

        let message = h
            .coordinator
            .send(&request(), &mut |c: &str| updates.push(c.to_string()))
            .await
            .unwrap();

        assert_eq!(message.content, "Hello");
        assert_eq!(updates, vec!["He", "Hello"]);
        assert_eq!(h.transport.calls()[0].bearer, "Bearer tok");
        assert_eq!(*phases.borrow_and_update(), SendPhase::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn three_retryable_failures_surface_one_send_failed() {
        let h = harness(
            vec![
                Scripted::Fail(StreamFailure::ServerUnresponsive),
                Scripted::Fail(StreamFailure::EmptyResult),
                Scripted::Fail(StreamFailure::SchedulingDelay),
                Scripted::reply("never reached"),
            ],
            DAY,
        )
        .await;
        let started = Instant::now();

        let err = h
            .coordinator
            .send(&request(), &mut |_: &str| {})
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            KobeError::SendFailed {
                attempts: 3,
                last: StreamFailure::SchedulingDelay
            }
        ));
        assert_eq!(err.user_message(), "发送消息失败，请稍后重试");

        let calls = h.transport.calls();
        assert_eq!(calls.len(), 3);
        let offsets: Vec<u128> = calls
            .iter()
            .map(|c| (c.at - started).as_millis())
            .collect();
        assert_eq!(offsets, vec![0, 1000, 3000]);
        assert_eq!(started.elapsed(), Duration::from_millis(6000));
        assert_eq!(h.coordinator.phase(), SendPhase::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_then_success() {
        let h = harness(
            vec![
                Scripted::PartialThenFail(vec!["par".into()], StreamFailure::RequestTimeout),
                Scripted::reply("full answer"),
            ],
            DAY,
        )
        .await;
        let message = h
            .coordinator
            .send(&request(), &mut |_: &str| {})
            .await
            .unwrap();
        assert_eq!(message.content, "full answer");
        assert_eq!(h.transport.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_mid_stream_is_terminal_and_clears_credential() {
        let h = harness(vec![Scripted::AuthExpired, Scripted::reply("no")], DAY).await;
        let mut events = h.coordinator.subscribe_events();

        let err = h
            .coordinator
            .send(&request(), &mut |_: &str| {})
            .await
            .unwrap_err();

        assert!(err.is_auth());
        assert_eq!(h.transport.call_count(), 1);
        assert!(h.guard.credential().is_none());
        assert!(h.store.get(StorageKey::Token).await.is_none());
        assert_eq!(events.try_recv().unwrap(), SessionEvent::SignedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_credential_never_reaches_transport() {
        let h = harness(vec![], DAY).await;
        h.guard.set_credential(None, None).await;

        let err = h
            .coordinator
            .send(&request(), &mut |_: &str| {})
            .await
            .unwrap_err();
        assert!(err.is_auth());
        assert_eq!(h.transport.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_due_credential_is_refreshed_first() {
        let h = harness(vec![Scripted::reply("ok")], Duration::from_secs(10 * 60)).await;
        h.coordinator
            .send(&request(), &mut |_: &str| {})
            .await
            .unwrap();
        assert_eq!(h.refresher.calls(), 1);
        assert_eq!(h.transport.calls()[0].bearer, "Bearer refreshed-token");
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_failure_is_terminal() {
        let h = harness(vec![Scripted::reply("ok")], Duration::from_secs(10 * 60)).await;
        h.refresher.push(None);

        let err = h
            .coordinator
            .send(&request(), &mut |_: &str| {})
            .await
            .unwrap_err();
        assert!(err.is_auth());
        assert_eq!(h.transport.call_count(), 0);
        assert!(h.guard.credential().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn offline_monitor_short_circuits() {
        let h = harness(vec![], DAY).await;
        h.coordinator.monitor().set_platform_online(false).await;

        let err = h
            .coordinator
            .send(&request(), &mut |_: &str| {})
            .await
            .unwrap_err();
        assert!(matches!(err, KobeError::Offline));
        assert_eq!(h.transport.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_network_failure_is_offline_without_retry() {
        let h = harness(vec![Scripted::Network("connection reset".into())], DAY).await;
        h.probe.set_reachable(false);

        let err = h
            .coordinator
            .send(&request(), &mut |_: &str| {})
            .await
            .unwrap_err();
        assert!(matches!(err, KobeError::Offline));
        assert_eq!(h.transport.call_count(), 1);
        assert_eq!(h.probe.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unconfirmed_network_failure_is_retried() {
        let h = harness(
            vec![Scripted::Network("connection reset".into()), Scripted::reply("ok")],
            DAY,
        )
        .await;
        let message = h
            .coordinator
            .send(&request(), &mut |_: &str| {})
            .await
            .unwrap();
        assert_eq!(message.content, "ok");
        assert_eq!(h.transport.call_count(), 2);
    }

    #[test]
    fn phase_display() {
        assert_eq!(SendPhase::Idle.to_string(), "idle");
        assert_eq!(
            SendPhase::Retrying { attempt: 2 }.to_string(),
            "retrying after attempt 2"
        );
    }
}
