//! Submission pipeline: send a check-in directly, or defer it to the
//! pending queue.
//!
//! The connectivity flag only selects the fast path. A stale "online" flag
//! is harmless because a failed remote write falls through to the same
//! enqueue as the offline case. No retry happens here; queued check-ins are
//! the resync engine's job.

use std::sync::Arc;

use chrono::Local;
use tracing::{debug, info, warn};

use kiosk_core::CheckInRecord;

use crate::network::ConnectivityHandle;
use crate::notice::{Notice, Notifier};
use crate::queue::PendingStore;
use crate::remote::{RecordId, RemoteStore, payload};

/// Where a successfully handled check-in ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Accepted by the remote store.
    Delivered(RecordId),
    /// Durably queued on the device for a later resend.
    SavedOffline,
}

/// Terminal submission failures. The check-in was not recorded anywhere.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Invalid check-in: {0}")]
    Invalid(String),

    #[error("Check-in could not be sent or stored on the device")]
    NotDurable,
}

pub struct SubmissionPipeline {
    connectivity: ConnectivityHandle,
    store: Arc<dyn PendingStore>,
    remote: Arc<dyn RemoteStore>,
    collection: String,
    notifier: Notifier,
}

impl SubmissionPipeline {
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
        }
    }

    /// Submit one check-in.
    ///
    /// `Ok` means the record is either in the remote store or durably queued;
    /// `Err(NotDurable)` means it exists nowhere and the user must be told.
    pub async fn submit(&self, record: &CheckInRecord) -> Result<Submission, SubmitError> {
        record
            .validate()
            .map_err(|e| SubmitError::Invalid(e.to_string()))?;

        if self.connectivity.is_online() {
            if let Some(id) = self.send_direct(record).await {
                return Ok(Submission::Delivered(id));
            }
        } else {
            debug!(room = %record.room, "Offline, queueing check-in");
        }

        self.defer(record).await
    }

    async fn send_direct(&self, record: &CheckInRecord) -> Option<RecordId> {
        let payload = match payload::direct(record, Local::now().date_naive()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to build check-in payload");
                return None;
            }
        };

        match self.remote.add_record(&self.collection, payload).await {
            Ok(id) => {
                info!(id = %id, room = %record.room, "Check-in delivered");
                Some(id)
            }
            Err(e) => {
                warn!(error = %e, room = %record.room, "Direct submission failed, falling back to device queue");
                None
            }
        }
    }

    async fn defer(&self, record: &CheckInRecord) -> Result<Submission, SubmitError> {
        if self.store.enqueue(record).await {
            self.notifier.notify(Notice::SavedOnDevice);
            Ok(Submission::SavedOffline)
        } else {
            let err = SubmitError::NotDurable;
            self.notifier.notify(Notice::NotRecorded {
                reason: err.to_string(),
            });
            Err(err)
        }
    }
}
