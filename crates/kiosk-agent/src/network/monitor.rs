//! Network state monitor.
//!
//! Raw online/offline observations arrive on an unbounded channel (from the
//! probe task, the CLI or tests) and are folded into [`ConnectivityState`].
//! Only edges cause side effects: an edge broadcast, an informational pending
//! count, and on reconnect a resend pass after the settle delay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use kiosk_core::config::AgentConfig;

use super::{Connectivity, ConnectivityHandle, ConnectivityState};
use crate::notice::{Notice, Notifier};
use crate::queue::PendingStore;
use crate::resync::ResyncEngine;

const EDGE_CHANNEL_CAPACITY: usize = 16;

/// Delays applied to scheduled resend passes.
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    /// Wait after an offline->online edge before draining.
    pub settle_delay: Duration,
    /// Wait before the drain scheduled at start when already online.
    pub startup_drain_delay: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::from_agent(&AgentConfig::default())
    }
}

impl MonitorConfig {
    pub const fn from_agent(config: &AgentConfig) -> Self {
        Self {
            settle_delay: config.settle_delay(),
            startup_drain_delay: config.startup_drain_delay(),
        }
    }
}

/// Sender side for raw connectivity observations.
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<Connectivity>,
}

impl SignalSender {
    /// Forward an observation. Never blocks; `false` once the monitor is gone.
    pub fn send(&self, observed: Connectivity) -> bool {
        self.tx.send(observed).is_ok()
    }
}

struct Reactions {
    store: Arc<dyn PendingStore>,
    resync: Arc<ResyncEngine>,
    notifier: Notifier,
    config: MonitorConfig,
    edges: broadcast::Sender<Connectivity>,
}

impl Reactions {
    fn on_edge(self: &Arc<Self>, edge: Connectivity, shutdown: &watch::Receiver<bool>) {
        let _ = self.edges.send(edge);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let pending = this.store.count().await;
            let notice = if edge.is_online() {
                info!(pending, "Connectivity restored");
                Notice::BackOnline { pending }
            } else {
                info!(pending, "Connectivity lost");
                Notice::WentOffline { pending }
            };
            this.notifier.notify(notice);
        });

        if edge.is_online() {
            self.schedule_drain(self.config.settle_delay, shutdown.clone());
        }
    }

    fn schedule_drain(self: &Arc<Self>, delay: Duration, mut shutdown: watch::Receiver<bool>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {
                    let sent = this.resync.drain().await;
                    debug!(sent, "Scheduled resend pass finished");
                }
                _ = shutdown.changed() => {}
            }
        });
    }
}

/// Owner of the connectivity state and its edge reactions.
pub struct NetworkMonitor {
    state: Arc<ConnectivityState>,
    reactions: Arc<Reactions>,
    signals: SignalSender,
    signal_rx: Mutex<Option<mpsc::UnboundedReceiver<Connectivity>>>,
    started: AtomicBool,
}

impl NetworkMonitor {
    pub fn new(
        state: ConnectivityState,
        store: Arc<dyn PendingStore>,
        resync: Arc<ResyncEngine>,
        notifier: Notifier,
        config: MonitorConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (edges, _) = broadcast::channel(EDGE_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(state),
            reactions: Arc::new(Reactions {
                store,
                resync,
                notifier,
                config,
                edges,
            }),
            signals: SignalSender { tx },
            signal_rx: Mutex::new(Some(rx)),
            started: AtomicBool::new(false),
        }
    }

    pub fn connectivity(&self) -> ConnectivityHandle {
        self.state.handle()
    }

    /// Synchronous read of the current state.
    pub fn current(&self) -> Connectivity {
        self.state.current()
    }

    pub fn signals(&self) -> SignalSender {
        self.signals.clone()
    }

    /// Edge events: one value per transition.
    pub fn subscribe(&self) -> broadcast::Receiver<Connectivity> {
        self.reactions.edges.subscribe()
    }

    /// Start consuming observations. Only the first call starts anything;
    /// later calls return `None`.
    pub fn start(&self, shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Network monitor already started");
            return None;
        }

        let mut signals = self
            .signal_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;

        if self.state.current().is_online() {
            debug!("Online at startup, scheduling resend pass");
            self.reactions
                .schedule_drain(self.reactions.config.startup_drain_delay, shutdown.clone());
        }

        let state = Arc::clone(&self.state);
        let reactions = Arc::clone(&self.reactions);
        let mut stop = shutdown.clone();
        Some(tokio::spawn(async move {
            info!(initial = ?state.current(), "Network monitor started");
            loop {
                tokio::select! {
                    observed = signals.recv() => {
                        let Some(observed) = observed else {
                            debug!("Connectivity signal channel closed");
                            return;
                        };
                        if let Some(edge) = state.observe(observed) {
                            reactions.on_edge(edge, &shutdown);
                        }
                    }
                    _ = stop.changed() => {
                        info!("Network monitor shutting down");
                        return;
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::queue::{MockPendingStore, PendingEnvelope};
    use crate::remote::{MockRemoteStore, RemoteStore};
    use serde_json::json;
    use tokio::sync::broadcast::error::TryRecvError;

    fn envelope(id: i64) -> PendingEnvelope {
        PendingEnvelope {
            id,
            data: serde_json::from_value(json!({
                "room": "private4",
                "startTime": "10:00",
                "endTime": "12:00",
                "count": 2,
                "purpose": "meeting",
                "ageGroup": "thirties",
                "checkInTime": "2023-05-01T10:00:00",
                "reservationId": null
            }))
            .unwrap(),
            timestamp: "2023-05-01T10:00:05.000Z".into(),
            attempts: 0,
        }
    }

    /// Store with one queued envelope that resends cleanly.
    fn store() -> Arc<dyn PendingStore> {
        let mut store = MockPendingStore::new();
        store.expect_count().returning(|| 1);
        store.expect_list_all().returning(|| vec![envelope(1)]);
        store.expect_update_attempts().returning(|_, _| true);
        store.expect_remove().returning(|_| true);
        Arc::new(store)
    }

    fn remote() -> Arc<dyn RemoteStore> {
        let mut remote = MockRemoteStore::new();
        remote
            .expect_add_record()
            .returning(|_, _| Ok("doc-1".to_string()));
        Arc::new(remote)
    }

    fn monitor(initial: Connectivity, notifier: &Notifier) -> NetworkMonitor {
        let state = ConnectivityState::new(initial);
        let store = store();
        let resync = Arc::new(ResyncEngine::new(
            state.handle(),
            Arc::clone(&store),
            remote(),
            "checkins",
            notifier.clone(),
        ));
        NetworkMonitor::new(state, store, resync, notifier.clone(), MonitorConfig::default())
    }

    #[tokio::test]
    async fn start_is_only_honoured_once() {
        let (_tx, rx) = watch::channel(false);
        let monitor = monitor(Connectivity::Offline, &Notifier::new());

        assert!(monitor.start(rx.clone()).is_some());
        assert!(monitor.start(rx).is_none());
    }

    #[tokio::test]
    async fn duplicate_signals_produce_single_edges() {
        let (_tx, rx) = watch::channel(false);
        let notifier = Notifier::new();
        let mut notices = notifier.subscribe();
        let monitor = monitor(Connectivity::Online, &notifier);
        let mut edges = monitor.subscribe();
        let _task = monitor.start(rx).unwrap();

        let signals = monitor.signals();
        for observed in [
            Connectivity::Online,
            Connectivity::Offline,
            Connectivity::Offline,
            Connectivity::Offline,
        ] {
            assert!(signals.send(observed));
        }

        assert_eq!(edges.recv().await.unwrap(), Connectivity::Offline);
        assert_eq!(notices.recv().await.unwrap(), Notice::WentOffline { pending: 1 });
        tokio::task::yield_now().await;
        assert!(matches!(edges.try_recv(), Err(TryRecvError::Empty)));
        assert!(!monitor.current().is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_drains_after_settle_delay() {
        let (_tx, rx) = watch::channel(false);
        let notifier = Notifier::new();
        let mut notices = notifier.subscribe();
        let monitor = monitor(Connectivity::Offline, &notifier);
        let _task = monitor.start(rx).unwrap();

        monitor.signals().send(Connectivity::Online);
        assert_eq!(notices.recv().await.unwrap(), Notice::BackOnline { pending: 1 });

        tokio::time::sleep(Duration::from_millis(1_900)).await;
        assert!(matches!(notices.try_recv(), Err(TryRecvError::Empty)));

        assert_eq!(notices.recv().await.unwrap(), Notice::ResendStarted { pending: 1 });
        match notices.recv().await.unwrap() {
            Notice::ResendFinished { sent, total, .. } => assert_eq!((sent, total), (1, 1)),
            other => panic!("unexpected notice {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn online_at_startup_schedules_one_drain() {
        let (_tx, rx) = watch::channel(false);
        let notifier = Notifier::new();
        let mut notices = notifier.subscribe();
        let monitor = monitor(Connectivity::Online, &notifier);
        let _task = monitor.start(rx).unwrap();

        tokio::time::sleep(Duration::from_millis(2_900)).await;
        assert!(matches!(notices.try_recv(), Err(TryRecvError::Empty)));

        assert_eq!(notices.recv().await.unwrap(), Notice::ResendStarted { pending: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn offline_at_startup_schedules_nothing() {
        let (_tx, rx) = watch::channel(false);
        let notifier = Notifier::new();
        let mut notices = notifier.subscribe();
        let monitor = monitor(Connectivity::Offline, &notifier);
        let _task = monitor.start(rx).unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(matches!(notices.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn shutdown_stops_the_monitor() {
        let (tx, rx) = watch::channel(false);
        let monitor = monitor(Connectivity::Offline, &Notifier::new());
        let task = monitor.start(rx).unwrap();

        tx.send(true).unwrap();
        task.await.unwrap();
    }
}
