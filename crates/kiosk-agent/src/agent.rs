//! Assembly of the on-device components.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use kiosk_core::Config;

use crate::background_sync::{BackgroundSync, CheckInClient, spawn_sync_worker};
use crate::network::{Connectivity, ConnectivityState, MonitorConfig, NetworkMonitor, spawn_probe_task};
use crate::notice::Notifier;
use crate::queue::{PendingQueue, PendingStore};
use crate::remote::RemoteStore;
use crate::resync::ResyncEngine;
use crate::submit::SubmissionPipeline;

pub const PENDING_DB_FILE: &str = "pending.db";
pub const OUTBOX_DB_FILE: &str = "outbox.db";

/// Every component of the agent, wired to one connectivity state, one
/// pending queue and one notice channel.
pub struct Agent {
    notifier: Notifier,
    queue: Arc<PendingQueue>,
    monitor: NetworkMonitor,
    resync: Arc<ResyncEngine>,
    pipeline: SubmissionPipeline,
    sync: BackgroundSync,
    checkin_client: CheckInClient,
    http: reqwest::Client,
    remote_url: String,
    probe_interval: Duration,
    sync_interval: Duration,
}

impl Agent {
    pub async fn build(
        config: &Config,
        data_dir: &Path,
        remote: Arc<dyn RemoteStore>,
        http: reqwest::Client,
        initial: Connectivity,
    ) -> Self {
        let notifier = Notifier::new();
        let queue = Arc::new(PendingQueue::new(data_dir.join(PENDING_DB_FILE)));
        let store: Arc<dyn PendingStore> = queue.clone();

        let state = ConnectivityState::new(initial);
        let resync = Arc::new(ResyncEngine::new(
            state.handle(),
            Arc::clone(&store),
            Arc::clone(&remote),
            config.agent.collection.clone(),
            notifier.clone(),
        ));
        let pipeline = SubmissionPipeline::new(
            state.handle(),
            Arc::clone(&store),
            remote,
            config.agent.collection.clone(),
            notifier.clone(),
        );
        let monitor = NetworkMonitor::new(
            state,
            store,
            Arc::clone(&resync),
            notifier.clone(),
            MonitorConfig::from_agent(&config.agent),
        );

        let sync =
            BackgroundSync::register(&config.sync, &data_dir.join(OUTBOX_DB_FILE), http.clone())
                .await;
        let checkin_client = CheckInClient::new(http.clone(), &config.agent.remote_url, sync.clone());

        Self {
            notifier,
            queue,
            monitor,
            resync,
            pipeline,
            sync,
            checkin_client,
            http,
            remote_url: config.agent.remote_url.clone(),
            probe_interval: config.agent.probe_interval(),
            sync_interval: config.sync.periodic_interval(),
        }
    }

    /// Start the monitor, the connectivity probe and, when the bridge is
    /// enabled, the sync worker.
    pub fn start(&self, shutdown: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();

        // Subscribe before the monitor runs so no edge is missed
        let edges = self.monitor.subscribe();
        tasks.extend(self.monitor.start(shutdown.clone()));

        tasks.push(spawn_probe_task(
            self.http.clone(),
            self.remote_url.clone(),
            self.probe_interval,
            self.monitor.signals(),
            shutdown.clone(),
        ));

        if self.sync.is_enabled() {
            tasks.push(spawn_sync_worker(
                self.sync.clone(),
                edges,
                self.sync_interval,
                shutdown.clone(),
            ));
        }

        info!(tasks = tasks.len(), "Agent started");
        tasks
    }

    pub const fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    pub const fn monitor(&self) -> &NetworkMonitor {
        &self.monitor
    }

    pub fn resync(&self) -> &ResyncEngine {
        &self.resync
    }

    pub const fn pipeline(&self) -> &SubmissionPipeline {
        &self.pipeline
    }

    pub const fn background_sync(&self) -> &BackgroundSync {
        &self.sync
    }

    pub const fn checkin_client(&self) -> &CheckInClient {
        &self.checkin_client
    }
}
