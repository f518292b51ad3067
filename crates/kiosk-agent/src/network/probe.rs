//! Connectivity probe against the remote store's health endpoint.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{Connectivity, SignalSender};

/// One `GET {base_url}/health`. Any successful status counts as online.
pub async fn probe_once(http: &reqwest::Client, base_url: &str) -> Connectivity {
    let url = format!("{}/health", base_url.trim_end_matches('/'));
    match http.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => Connectivity::Online,
        Ok(resp) => {
            debug!(status = %resp.status(), "Health probe answered with failure status");
            Connectivity::Offline
        }
        Err(e) => {
            debug!(error = %e, "Health probe failed");
            Connectivity::Offline
        }
    }
}

/// Spawn a task that probes the remote store every `interval` and forwards
/// each observation to the network monitor.
pub fn spawn_probe_task(
    http: reqwest::Client,
    base_url: String,
    interval: Duration,
    signals: SignalSender,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let observed = probe_once(&http, &base_url).await;
                    if !signals.send(observed) {
                        debug!("Network monitor gone, stopping probe");
                        return;
                    }
                }
                _ = shutdown.changed() => {
                    info!("Connectivity probe shutting down");
                    return;
                }
            }
        }
    })
}
