//! Resync engine: replays queued check-ins against the remote store.
//!
//! A drain walks the queue strictly in order, one remote call at a time.
//! Each envelope's attempt counter is persisted before its send, and the
//! envelope is removed only after the store has accepted it. Delivery is
//! therefore at least once; a crash between acceptance and removal yields a
//! duplicate on the next drain.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::network::ConnectivityHandle;
use crate::notice::{Notice, Notifier, ResendOutcome};
use crate::queue::{PendingEnvelope, PendingStore};
use crate::remote::{RemoteStore, payload};

/// Attempt count above which every further resend is logged as a warning.
/// Envelopes are never dropped for exceeding it.
pub const ATTEMPTS_WARN_THRESHOLD: u32 = 10;

pub struct ResyncEngine {
    connectivity: ConnectivityHandle,
    store: Arc<dyn PendingStore>,
    remote: Arc<dyn RemoteStore>,
    collection: String,
    notifier: Notifier,
    /// Serializes drains within the process.
    drain_lock: Mutex<()>,
}

impl ResyncEngine {
    pub fn new(
        connectivity: ConnectivityHandle,
        store: Arc<dyn PendingStore>,
        remote: Arc<dyn RemoteStore>,
        collection: impl Into<String>,
        notifier: Notifier,
    ) -> Self {
        Self {
            connectivity,
            store,
            remote,
            collection: collection.into(),
            notifier,
            drain_lock: Mutex::new(()),
        }
    }

    /// One resend pass over the whole queue. Returns how many envelopes the
    /// remote store accepted.
    pub async fn drain(&self) -> usize {
        if !self.connectivity.is_online() {
            debug!("Offline, skipping resend pass");
            return 0;
        }

        let _guard = self.drain_lock.lock().await;

        let envelopes = self.store.list_all().await;
        if envelopes.is_empty() {
            debug!("No pending check-ins to resend");
            return 0;
        }

        let total = envelopes.len();
        info!(total, "Resending pending check-ins");
        self.notifier.notify(Notice::ResendStarted { pending: total });

        let day = Local::now().date_naive();
        let mut sent = 0;
        for envelope in &envelopes {
            if self.resend(envelope, day).await {
                sent += 1;
            }
        }

        let outcome = ResendOutcome::classify(sent, total);
        info!(sent, total, ?outcome, "Resend pass complete");
        self.notifier.notify(Notice::ResendFinished {
            sent,
            total,
            outcome,
        });
        sent
    }

    async fn resend(&self, envelope: &PendingEnvelope, day: NaiveDate) -> bool {
        let attempts = envelope.attempts.saturating_add(1);
        if !self.store.update_attempts(envelope.id, attempts).await {
            warn!(id = envelope.id, "Could not record resend attempt, skipping envelope");
            return false;
        }
        if attempts > ATTEMPTS_WARN_THRESHOLD {
            warn!(
                id = envelope.id,
                attempts,
                queued_at = %envelope.timestamp,
                "Pending check-in keeps failing to resend"
            );
        }

        let payload = match payload::resend(envelope, attempts, day) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(id = envelope.id, error = %e, "Failed to build resend payload");
                return false;
            }
        };

        match self.remote.add_record(&self.collection, payload).await {
            Ok(record_id) => {
                debug!(id = envelope.id, record_id = %record_id, attempts, "Pending check-in resent");
                if !self.store.remove(envelope.id).await {
                    warn!(
                        id = envelope.id,
                        "Resent check-in could not be removed and will be sent again"
                    );
                }
                true
            }
            Err(e) => {
                warn!(id = envelope.id, attempts, error = %e, "Resend failed, keeping envelope");
                false
            }
        }
    }
}
