//! In-process fakes for exercising the pipeline without a network.
//!
//! Available to integration tests through the `test-utils` feature.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use kiosk_core::db::now_rfc3339;
use kiosk_core::{CheckInRecord, StoredDocument};

use crate::queue::{EnvelopeId, PendingEnvelope, PendingQueue, PendingStore};
use crate::remote::{RecordId, RemoteStore, RemoteWriteError};

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, Vec<StoredDocument>>,
    calls: usize,
    next_id: u64,
    unavailable: bool,
    rejected_rooms: HashSet<String>,
}

/// Remote store kept in memory. Stamps `timestamp` on every document like
/// the real store does.
#[derive(Default)]
pub struct MemoryRemoteStore {
    state: Mutex<MemoryState>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every call fail with a network error until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Reject documents whose `room` field equals `room`.
    pub fn reject_room(&self, room: &str) {
        self.lock().rejected_rooms.insert(room.to_string());
    }

    pub fn accept_room(&self, room: &str) {
        self.lock().rejected_rooms.remove(room);
    }

    /// Number of `add_record` calls, failed ones included.
    pub fn calls(&self) -> usize {
        self.lock().calls
    }

    pub fn documents(&self, collection: &str) -> Vec<StoredDocument> {
        self.lock()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn add_record(
        &self,
        collection: &str,
        payload: Value,
    ) -> Result<RecordId, RemoteWriteError> {
        let mut state = self.lock();
        state.calls += 1;

        if state.unavailable {
            return Err(RemoteWriteError::Network("store unreachable".into()));
        }
        let Value::Object(mut fields) = payload else {
            return Err(RemoteWriteError::Rejected {
                status: 400,
                body: "document must be an object".into(),
            });
        };
        if let Some(Value::String(room)) = fields.get("room") {
            if state.rejected_rooms.contains(room) {
                return Err(RemoteWriteError::Rejected {
                    status: 403,
                    body: format!("room {room} rejected"),
                });
            }
        }

        state.next_id += 1;
        let id = format!("doc-{}", state.next_id);
        fields.insert("timestamp".into(), Value::String(now_rfc3339()));
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(StoredDocument {
                id: id.clone(),
                fields,
            });
        Ok(id)
    }

    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<StoredDocument>, RemoteWriteError> {
        let state = self.lock();
        if state.unavailable {
            return Err(RemoteWriteError::Network("store unreachable".into()));
        }
        Ok(state
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| doc.field(field) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Wrapper around a real [`PendingQueue`] that can fail attempt updates for
/// chosen envelopes and counts queue reads.
pub struct FaultyQueue {
    inner: PendingQueue,
    failing_updates: Mutex<HashSet<EnvelopeId>>,
    list_calls: AtomicUsize,
}

impl FaultyQueue {
    pub fn new(inner: PendingQueue) -> Self {
        Self {
            inner,
            failing_updates: Mutex::new(HashSet::new()),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub const fn inner(&self) -> &PendingQueue {
        &self.inner
    }

    /// Make `update_attempts` report a storage fault for `id`.
    pub fn fail_updates_for(&self, id: EnvelopeId) {
        self.failing_updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PendingStore for FaultyQueue {
    async fn enqueue(&self, record: &CheckInRecord) -> bool {
        self.inner.enqueue(record).await
    }

    async fn list_all(&self) -> Vec<PendingEnvelope> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_all().await
    }

    async fn remove(&self, id: EnvelopeId) -> bool {
        self.inner.remove(id).await
    }

    async fn update_attempts(&self, id: EnvelopeId, attempts: u32) -> bool {
        let failing = self
            .failing_updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id);
        if failing {
            return false;
        }
        self.inner.update_attempts(id, attempts).await
    }

    async fn count(&self) -> usize {
        self.inner.count().await
    }
}
