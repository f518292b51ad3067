//! Sync worker task.

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::BackgroundSync;
use crate::network::Connectivity;

async fn run_replay(sync: &BackgroundSync, trigger: &'static str) {
    match sync.replay().await {
        Ok(summary) => debug!(
            trigger,
            replayed = summary.replayed,
            retained = summary.retained,
            remaining = summary.remaining,
            "Background sync replay finished"
        ),
        Err(e) => warn!(trigger, error = %e, "Background sync replay failed"),
    }
}

/// Spawn the worker that replays the outbox on every online edge and on a
/// periodic wake.
pub fn spawn_sync_worker(
    sync: BackgroundSync,
    mut edges: broadcast::Receiver<Connectivity>,
    periodic: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(periodic);
        timer.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                edge = edges.recv() => match edge {
                    Ok(Connectivity::Online) => run_replay(&sync, "online").await,
                    Ok(Connectivity::Offline) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Sync worker missed connectivity edges");
                        run_replay(&sync, "lagged").await;
                    }
                    Err(RecvError::Closed) => {
                        debug!("Connectivity edges closed, stopping sync worker");
                        return;
                    }
                },
                _ = timer.tick() => run_replay(&sync, "periodic").await,
                _ = shutdown.changed() => {
                    info!("Sync worker shutting down");
                    return;
                }
            }
        }
    })
}
