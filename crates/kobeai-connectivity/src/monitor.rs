// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Online/offline state tracking.
//!
//! State moves `Unknown -> Online | Offline` and then between `Online` and
//! `Offline`. Two inputs drive it: platform network signals, where going
//! offline is trusted at once and coming back online is confirmed by a probe,
//! and a periodic background probe. Subscribers are notified on link changes
//! only; latency is refreshed silently.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use kobeai_core::{ConnectivityProbe, ConnectivityState, LinkState, ProbeResult};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct ConnectivityMonitor {
    probe: Arc<dyn ConnectivityProbe>,
    interval: Duration,
    state: watch::Sender<ConnectivityState>,
    task: Mutex<Option<CancellationToken>>,
}

impl ConnectivityMonitor {
    pub fn new(probe: Arc<dyn ConnectivityProbe>, interval: Duration) -> Self {
        let (state, _) = watch::channel(ConnectivityState::default());
        Self {
            probe,
            interval,
            state,
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    /// `Unknown` counts as online until a probe or platform signal says otherwise.
    pub fn is_online(&self) -> bool {
        self.state().link != LinkState::Offline
    }

    pub fn latency(&self) -> Option<Duration> {
        self.state().latency
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state.subscribe()
    }

    /// Probe now and update the state. Returns whether the server is reachable.
    pub async fn check_connection(&self) -> bool {
        let result = self.probe.probe().await;
        match result {
            ProbeResult::Reachable { status, latency } => {
                debug!(status, ?latency, "probe reachable");
                self.update(LinkState::Online, Some(latency));
                true
            }
            ProbeResult::Unreachable { reason } => {
                debug!(%reason, "probe unreachable");
                self.update(LinkState::Offline, None);
                false
            }
        }
    }

    /// Platform network signal.
    pub async fn set_platform_online(&self, online: bool) {
        if online {
            debug!("platform reports network available, confirming");
            self.check_connection().await;
        } else {
            self.update(LinkState::Offline, None);
        }
    }

    /// Start the background probe. Returns `false` if it is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let Ok(mut task) = self.task.lock() else {
            warn!("connectivity task lock poisoned");
            return false;
        };
        if task.is_some() {
            return false;
        }

        let cancel = CancellationToken::new();
        let monitor = Arc::clone(self);
        let token = cancel.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        monitor.check_connection().await;
                    }
                    _ = token.cancelled() => {
                        info!("connectivity probe shutting down");
                        break;
                    }
                }
            }
        });
        info!(interval_secs = self.interval.as_secs(), "connectivity probe started");
        *task = Some(cancel);
        true
    }

    /// Stop the background probe. Returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        let taken = match self.task.lock() {
            Ok(mut task) => task.take(),
            Err(_) => None,
        };
        match taken {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().map(|t| t.is_some()).unwrap_or(false)
    }

    fn update(&self, link: LinkState, latency: Option<Duration>) {
        self.state.send_if_modified(|state| {
            let previous = state.link;
            state.latency = latency;
            state.link = link;
            if previous != link {
                info!(from = %previous, to = %link, "connectivity changed");
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use kobeai_test_utils::MockProbe;

    use super::*;

    fn monitor(reachable: bool) -> (Arc<ConnectivityMonitor>, Arc<MockProbe>) {
        let probe = Arc::new(MockProbe::new(reachable));
        let monitor = Arc::new(ConnectivityMonitor::new(
            probe.clone(),
            Duration::from_secs(30),
        ));
        (monitor, probe)
    }

    #[tokio::test]
    async fn unknown_counts_as_online() {
        let (monitor, probe) = monitor(false);
        assert_eq!(monitor.state().link, LinkState::Unknown);
        assert!(monitor.is_online());
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test]
    async fn check_connection_follows_probe() {
        let (monitor, probe) = monitor(true);
        assert!(monitor.check_connection().await);
        assert_eq!(monitor.state().link, LinkState::Online);
        assert_eq!(monitor.latency(), Some(Duration::from_millis(12)));

        probe.set_reachable(false);
        assert!(!monitor.check_connection().await);
        assert!(!monitor.is_online());
        assert_eq!(monitor.latency(), None);
    }

    #[tokio::test]
    async fn platform_offline_is_immediate_online_is_probed() {
        let (monitor, probe) = monitor(true);
        monitor.set_platform_online(false).await;
        assert!(!monitor.is_online());
        assert_eq!(probe.calls(), 0);

        monitor.set_platform_online(true).await;
        assert!(monitor.is_online());
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test]
    async fn platform_online_with_dead_server_stays_offline() {
        let (monitor, _probe) = monitor(false);
        monitor.set_platform_online(false).await;
        monitor.set_platform_online(true).await;
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn subscribers_see_link_changes_only() {
        let (monitor, _probe) = monitor(true);
        let mut rx = monitor.subscribe();

        monitor.check_connection().await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().link, LinkState::Online);

        monitor.check_connection().await;
        assert!(!rx.has_changed().unwrap());

        monitor.set_platform_online(false).await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().link, LinkState::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_loop_runs_once_per_interval() {
        let (monitor, probe) = monitor(true);
        assert!(monitor.start());
        assert!(!monitor.start());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(probe.calls(), 1);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(probe.calls(), 2);

        assert!(monitor.stop());
        assert!(!monitor.stop());
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn background_probe_detects_outage() {
        let (monitor, probe) = monitor(true);
        monitor.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(monitor.is_online());

        probe.set_reachable(false);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!monitor.is_online());
        monitor.stop();
    }
}
