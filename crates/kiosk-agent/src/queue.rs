//! Local durable queue of check-ins awaiting transmission.
//!
//! Each operation opens its own connection to `pending.db` and closes it
//! before returning, so no handle outlives a single call. The fallible
//! `try_*` methods report storage faults; the [`PendingStore`] surface
//! converts them into `bool`/empty results and logs the cause.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{Connection, SqliteConnection};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use kiosk_core::CheckInRecord;
use kiosk_core::db::{DatabaseError, now_rfc3339, open_connection};

use crate::storage::{PendingRow, queries_pending};

/// Store-assigned envelope identifier. Never reused.
pub type EnvelopeId = i64;

/// Queue wrapper around a check-in that could not be sent directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEnvelope {
    pub id: EnvelopeId,
    pub data: CheckInRecord,
    /// RFC 3339 time the envelope was created.
    pub timestamp: String,
    /// Resend attempts started so far.
    pub attempts: u32,
}

impl TryFrom<PendingRow> for PendingEnvelope {
    type Error = QueueError;

    fn try_from(row: PendingRow) -> Result<Self, Self::Error> {
        let data = serde_json::from_str(&row.data).map_err(|e| QueueError::Corrupt {
            id: row.id,
            reason: e.to_string(),
        })?;
        let attempts = u32::try_from(row.attempts).map_err(|e| QueueError::Corrupt {
            id: row.id,
            reason: e.to_string(),
        })?;
        Ok(Self {
            id: row.id,
            data,
            timestamp: row.timestamp,
            attempts,
        })
    }
}

/// Queue operation errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Corrupt envelope {id}: {reason}")]
    Corrupt { id: EnvelopeId, reason: String },

    #[error("Failed to encode check-in: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Contract of the pending check-in queue as seen by submission and resync.
///
/// None of these operations fail outward; storage faults degrade to
/// `false`, an empty list or a zero count.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PendingStore: Send + Sync {
    /// Persist `record` with zero attempts. `false` means it is not durable.
    async fn enqueue(&self, record: &CheckInRecord) -> bool;

    /// Every stored envelope in insertion order.
    async fn list_all(&self) -> Vec<PendingEnvelope>;

    /// Delete an envelope. `true` also when the id was already gone.
    async fn remove(&self, id: EnvelopeId) -> bool;

    /// Overwrite the attempt counter. `false` if the id is unknown or on fault.
    async fn update_attempts(&self, id: EnvelopeId, attempts: u32) -> bool;

    /// Number of queued envelopes, zero on fault.
    async fn count(&self) -> usize;
}

/// Open connection to the queue, released by [`StoreHandle::close`] or on drop.
pub struct StoreHandle {
    conn: SqliteConnection,
}

impl StoreHandle {
    pub const fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    pub async fn close(self) {
        if let Err(e) = self.conn.close().await {
            debug!(error = %e, "Pending queue connection did not close cleanly");
        }
    }
}

/// `SQLite`-backed pending check-in queue.
#[derive(Clone)]
pub struct PendingQueue {
    path: PathBuf,
    schema: Arc<OnceCell<()>>,
}

impl PendingQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            schema: Arc::new(OnceCell::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the store, creating the schema on first use.
    ///
    /// Concurrent callers share a single schema check; the migration
    /// bookkeeping table keeps it to one creation per device.
    pub async fn initialize(&self) -> Result<StoreHandle, QueueError> {
        let mut conn = open_connection(&self.path)
            .await
            .map_err(|e| QueueError::StorageUnavailable(e.to_string()))?;

        let migrate_conn = &mut conn;
        let schema = self
            .schema
            .get_or_try_init(move || queries_pending::run_migrations(migrate_conn))
            .await;
        if let Err(e) = schema {
            if let Err(close) = conn.close().await {
                debug!(error = %close, "Pending queue connection did not close cleanly");
            }
            return Err(QueueError::StorageUnavailable(e.to_string()));
        }

        Ok(StoreHandle { conn })
    }

    pub async fn try_enqueue(&self, record: &CheckInRecord) -> Result<EnvelopeId, QueueError> {
        let data = serde_json::to_string(record)?;
        let timestamp = now_rfc3339();

        let mut handle = self.initialize().await?;
        let result = queries_pending::insert_pending(handle.connection(), &data, &timestamp).await;
        handle.close().await;

        let id = result?;
        debug!(id, room = %record.room, "Check-in queued on device");
        Ok(id)
    }

    /// All envelopes in insertion order. Rows that no longer decode are
    /// skipped and logged rather than failing the whole listing.
    pub async fn try_list_all(&self) -> Result<Vec<PendingEnvelope>, QueueError> {
        let mut handle = self.initialize().await?;
        let result = queries_pending::list_pending(handle.connection()).await;
        handle.close().await;

        let envelopes = result?
            .into_iter()
            .filter_map(|row| match PendingEnvelope::try_from(row) {
                Ok(envelope) => Some(envelope),
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable pending check-in");
                    None
                }
            })
            .collect();
        Ok(envelopes)
    }

    pub async fn get(&self, id: EnvelopeId) -> Result<PendingEnvelope, QueueError> {
        let mut handle = self.initialize().await?;
        let result = queries_pending::get_pending(handle.connection(), id).await;
        handle.close().await;

        PendingEnvelope::try_from(result?)
    }

    /// Returns whether a row was actually deleted.
    pub async fn try_remove(&self, id: EnvelopeId) -> Result<bool, QueueError> {
        let mut handle = self.initialize().await?;
        let result = queries_pending::delete_pending(handle.connection(), id).await;
        handle.close().await;

        Ok(result?)
    }

    pub async fn try_update_attempts(
        &self,
        id: EnvelopeId,
        attempts: u32,
    ) -> Result<(), QueueError> {
        let mut handle = self.initialize().await?;
        let result =
            queries_pending::set_attempts(handle.connection(), id, i64::from(attempts)).await;
        handle.close().await;

        Ok(result?)
    }

    pub async fn try_count(&self) -> Result<usize, QueueError> {
        let mut handle = self.initialize().await?;
        let result = queries_pending::count_pending(handle.connection()).await;
        handle.close().await;

        Ok(usize::try_from(result?).unwrap_or_default())
    }
}

#[async_trait]
impl PendingStore for PendingQueue {
    async fn enqueue(&self, record: &CheckInRecord) -> bool {
        match self.try_enqueue(record).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, room = %record.room, "Failed to queue check-in on device");
                false
            }
        }
    }

    async fn list_all(&self) -> Vec<PendingEnvelope> {
        self.try_list_all().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to list pending check-ins");
            Vec::new()
        })
    }

    async fn remove(&self, id: EnvelopeId) -> bool {
        match self.try_remove(id).await {
            Ok(removed) => {
                if !removed {
                    debug!(id, "Pending check-in already removed");
                }
                true
            }
            Err(e) => {
                warn!(id, error = %e, "Failed to remove pending check-in");
                false
            }
        }
    }

    async fn update_attempts(&self, id: EnvelopeId, attempts: u32) -> bool {
        match self.try_update_attempts(id, attempts).await {
            Ok(()) => true,
            Err(QueueError::Storage(DatabaseError::NotFound(_))) => {
                debug!(id, "Pending check-in not found for attempt update");
                false
            }
            Err(e) => {
                warn!(id, attempts, error = %e, "Failed to record resend attempt");
                false
            }
        }
    }

    async fn count(&self) -> usize {
        self.try_count().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to count pending check-ins");
            0
        })
    }
}
