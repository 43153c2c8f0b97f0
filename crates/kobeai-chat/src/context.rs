// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Explicit construction and lifecycle of the client's shared services.
//!
//! One [`ClientContext`] owns the HTTP client, the credential, the
//! connectivity monitor, and the send pipeline. [`ClientContext::start`]
//! launches the background probe and the reconnect watcher that drains the
//! offline queue; [`ClientContext::stop`] shuts both down.

use std::sync::Arc;

use kobeai_auth::{ApiClient, AuthClient, SecretValues, TokenGuard};
use kobeai_config::ClientConfig;
use kobeai_connectivity::{ConnectivityMonitor, HttpProbe};
use kobeai_core::{
    ChatTransport, ClientStore, ConnectivityProbe, ConversationApi, KobeError, LinkState,
};
use kobeai_storage::SqliteStore;
use kobeai_stream::ChatClient;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::conversations_api::HttpConversationApi;
use crate::coordinator::SendCoordinator;
use crate::reconciler::ConversationReconciler;

pub struct ClientContext {
    config: ClientConfig,
    store: Arc<dyn ClientStore>,
    guard: Arc<TokenGuard>,
    auth: Arc<AuthClient>,
    monitor: Arc<ConnectivityMonitor>,
    coordinator: Arc<SendCoordinator>,
    reconciler: Arc<ConversationReconciler>,
    cancel: std::sync::Mutex<Option<CancellationToken>>,
}

impl ClientContext {
    /// Open the SQLite store named in the config and build the context on it.
    pub async fn open(config: ClientConfig, secrets: Option<SecretValues>) -> Result<Self, KobeError> {
        let store = SqliteStore::open(&config.storage.database_path, config.storage.wal_mode).await?;
        Self::build(config, Arc::new(store), secrets).await
    }

    /// Wire every service over `store`, talking to `config.server.base_url`.
    pub async fn build(
        config: ClientConfig,
        store: Arc<dyn ClientStore>,
        secrets: Option<SecretValues>,
    ) -> Result<Self, KobeError> {
        let api = ApiClient::new(&config.server.base_url, config.server.request_timeout())?;
        let transport: Arc<dyn ChatTransport> =
            Arc::new(ChatClient::new(api.clone(), &config.server, &config.stream));
        let probe = Arc::new(HttpProbe::new(api.clone(), &config.connectivity));
        Self::assemble(config, store, secrets, api, transport, probe).await
    }

    /// Like [`build`](Self::build) with caller-supplied transport and probe.
    pub async fn assemble(
        config: ClientConfig,
        store: Arc<dyn ClientStore>,
        secrets: Option<SecretValues>,
        api: ApiClient,
        transport: Arc<dyn ChatTransport>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Result<Self, KobeError> {
        let mut guard = TokenGuard::load(store.clone(), &config.auth).await;
        if let Some(secrets) = secrets {
            guard = guard.with_redaction(secrets);
        }
        let guard = Arc::new(guard);
        let auth = Arc::new(AuthClient::new(api.clone(), guard.clone()));
        let monitor = Arc::new(ConnectivityMonitor::new(
            probe,
            config.connectivity.probe_interval(),
        ));
        let coordinator = Arc::new(SendCoordinator::new(
            transport,
            guard.clone(),
            auth.clone(),
            monitor.clone(),
            &config.retry,
        ));
        let conversations: Arc<dyn ConversationApi> =
            Arc::new(HttpConversationApi::new(api, guard.clone()));
        let reconciler = Arc::new(ConversationReconciler::new(
            coordinator.clone(),
            conversations,
            store.clone(),
        ));
        reconciler.restore().await;

        debug!(base_url = %config.server.base_url, "client context built");
        Ok(Self {
            config,
            store,
            guard,
            auth,
            monitor,
            coordinator,
            reconciler,
            cancel: std::sync::Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ClientStore> {
        &self.store
    }

    pub fn guard(&self) -> &Arc<TokenGuard> {
        &self.guard
    }

    pub fn auth(&self) -> &Arc<AuthClient> {
        &self.auth
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn coordinator(&self) -> &Arc<SendCoordinator> {
        &self.coordinator
    }

    pub fn reconciler(&self) -> &Arc<ConversationReconciler> {
        &self.reconciler
    }

    /// Start the probe loop and the reconnect watcher. Idempotent.
    pub fn start(&self) -> bool {
        let Ok(mut slot) = self.cancel.lock() else {
            return false;
        };
        if slot.is_some() {
            return false;
        }
        // Subscribe first so the first probe result is seen as a change.
        let mut link = self.monitor.subscribe();
        self.monitor.start();

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let reconciler = self.reconciler.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = link.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let online = link.borrow_and_update().link == LinkState::Online;
                        if online && reconciler.has_pending_messages().await {
                            match reconciler.drain_pending().await {
                                Ok(report) => info!(
                                    sent = report.sent,
                                    remaining = report.remaining,
                                    "offline queue drained"
                                ),
                                Err(e) => warn!(error = %e, "offline queue drain failed"),
                            }
                        }
                    }
                    _ = token.cancelled() => {
                        debug!("reconnect watcher shutting down");
                        break;
                    }
                }
            }
        });

        *slot = Some(cancel);
        info!("client context started");
        true
    }

    /// Stop background work started by [`start`](Self::start). Idempotent.
    pub fn stop(&self) -> bool {
        let cancel = self.cancel.lock().ok().and_then(|mut slot| slot.take());
        match cancel {
            Some(cancel) => {
                cancel.cancel();
                self.monitor.stop();
                info!("client context stopped");
                true
            }
            None => false,
        }
    }
}
