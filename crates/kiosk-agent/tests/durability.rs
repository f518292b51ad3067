//! Durability properties of the submission pipeline and resync engine,
//! exercised against a real on-disk pending queue.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;

use kiosk_agent::background_sync::{BackgroundSync, CheckInClient, PostOutcome};
use kiosk_agent::network::MonitorConfig;
use kiosk_agent::queue::EnvelopeId;
use kiosk_agent::remote::{RecordId, build_http_client};
use kiosk_agent::testing::{FaultyQueue, MemoryRemoteStore};
use kiosk_agent::{
    Connectivity, ConnectivityState, NetworkMonitor, Notice, Notifier, PendingEnvelope,
    PendingQueue, PendingStore, RemoteStore, RemoteWriteError, ResendOutcome, ResyncEngine,
    Submission, SubmissionPipeline,
};
use kiosk_core::config::BackgroundSyncConfig;
use kiosk_core::{CheckInRecord, StoredDocument};

const COLLECTION: &str = "checkins";

fn scenario_record() -> CheckInRecord {
    serde_json::from_value(json!({
        "room": "private4",
        "startTime": "10:00",
        "endTime": "12:00",
        "count": 2,
        "purpose": "meeting",
        "ageGroup": "thirties",
        "checkInTime": "2023-05-01T10:00:00",
        "reservationId": null
    }))
    .unwrap()
}

fn record(room: &str) -> CheckInRecord {
    let mut record = scenario_record();
    record.room = room.to_string();
    record
}

struct Harness {
    dir: TempDir,
    state: ConnectivityState,
    queue: Arc<FaultyQueue>,
    remote: Arc<MemoryRemoteStore>,
    notifier: Notifier,
    pipeline: SubmissionPipeline,
    resync: ResyncEngine,
}

impl Harness {
    fn new(initial: Connectivity) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(FaultyQueue::new(PendingQueue::new(
            dir.path().join("pending.db"),
        )));
        let remote = Arc::new(MemoryRemoteStore::new());
        let notifier = Notifier::new();
        let state = ConnectivityState::new(initial);

        let pipeline = SubmissionPipeline::new(
            state.handle(),
            queue.clone(),
            remote.clone(),
            COLLECTION,
            notifier.clone(),
        );
        let resync = ResyncEngine::new(
            state.handle(),
            queue.clone(),
            remote.clone(),
            COLLECTION,
            notifier.clone(),
        );

        Self {
            dir,
            state,
            queue,
            remote,
            notifier,
            pipeline,
            resync,
        }
    }

    fn pending_queue(&self) -> &PendingQueue {
        self.queue.inner()
    }

    fn documents(&self) -> Vec<StoredDocument> {
        self.remote.documents(COLLECTION)
    }
}

// === No silent loss ===

#[tokio::test]
async fn offline_submission_is_delivered_once_after_reconnect() {
    let h = Harness::new(Connectivity::Offline);

    let outcome = h.pipeline.submit(&record("hall")).await.unwrap();
    assert_eq!(outcome, Submission::SavedOffline);
    assert_eq!(h.remote.calls(), 0);

    h.state.observe(Connectivity::Online);
    assert_eq!(h.resync.drain().await, 1);

    let docs = h.documents();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].field("room"), Some(&json!("hall")));
    assert_eq!(docs[0].field("purpose"), Some(&json!("meeting")));
    assert!(h.pending_queue().list_all().await.is_empty());
}

#[tokio::test]
async fn stale_online_flag_still_ends_in_the_queue() {
    let h = Harness::new(Connectivity::Online);
    h.remote.set_unavailable(true);

    let outcome = h.pipeline.submit(&record("hall")).await.unwrap();
    assert_eq!(outcome, Submission::SavedOffline);
    assert_eq!(h.pending_queue().count().await, 1);

    h.remote.set_unavailable(false);
    assert_eq!(h.resync.drain().await, 1);
    assert_eq!(h.documents().len(), 1);
}

// === Attempts monotonicity ===

/// Remote store that records the queued attempt counter at the moment each
/// write arrives, then fails.
struct AttemptObserver {
    queue: PendingQueue,
    seen: Mutex<Vec<u32>>,
}

#[async_trait]
impl RemoteStore for AttemptObserver {
    async fn add_record(
        &self,
        _collection: &str,
        payload: Value,
    ) -> Result<RecordId, RemoteWriteError> {
        let stored = self.queue.try_list_all().await.unwrap();
        let persisted = stored[0].attempts;
        assert_eq!(payload["resendAttempts"], json!(persisted));
        self.seen.lock().unwrap().push(persisted);
        Err(RemoteWriteError::Timeout)
    }

    async fn query(
        &self,
        _collection: &str,
        _field: &str,
        _value: &Value,
    ) -> Result<Vec<StoredDocument>, RemoteWriteError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn attempts_are_persisted_before_each_send_and_never_decrease() {
    let dir = tempfile::tempdir().unwrap();
    let queue = PendingQueue::new(dir.path().join("pending.db"));
    let id = queue.try_enqueue(&record("hall")).await.unwrap();

    let observer = Arc::new(AttemptObserver {
        queue: queue.clone(),
        seen: Mutex::new(Vec::new()),
    });
    let state = ConnectivityState::new(Connectivity::Online);
    let resync = ResyncEngine::new(
        state.handle(),
        Arc::new(queue.clone()),
        observer.clone(),
        COLLECTION,
        Notifier::new(),
    );

    for _ in 0..3 {
        assert_eq!(resync.drain().await, 0);
    }

    assert_eq!(*observer.seen.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(queue.get(id).await.unwrap().attempts, 3);
}

// === Batch isolation ===

#[tokio::test]
async fn one_rejected_envelope_does_not_block_the_rest() {
    let h = Harness::new(Connectivity::Offline);
    for room in ["a", "b", "c", "d"] {
        h.pipeline.submit(&record(room)).await.unwrap();
    }
    h.remote.reject_room("c");

    h.state.observe(Connectivity::Online);
    assert_eq!(h.resync.drain().await, 3);

    let left = h.pending_queue().list_all().await;
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].data.room, "c");
    assert_eq!(left[0].attempts, 1);

    let rooms: Vec<_> = h
        .documents()
        .iter()
        .map(|d| d.field("room").cloned().unwrap_or(Value::Null))
        .collect();
    assert_eq!(rooms, [json!("a"), json!("b"), json!("d")]);
}

// === At-least-once delivery ===

/// Queue whose removals are lost, as if the process died right after the
/// remote store accepted a resend.
struct CrashBeforeRemoval(PendingQueue);

#[async_trait]
impl PendingStore for CrashBeforeRemoval {
    async fn enqueue(&self, record: &CheckInRecord) -> bool {
        self.0.enqueue(record).await
    }

    async fn list_all(&self) -> Vec<PendingEnvelope> {
        self.0.list_all().await
    }

    async fn remove(&self, _id: EnvelopeId) -> bool {
        true
    }

    async fn update_attempts(&self, id: EnvelopeId, attempts: u32) -> bool {
        self.0.update_attempts(id, attempts).await
    }

    async fn count(&self) -> usize {
        self.0.count().await
    }
}

#[tokio::test]
async fn replaying_an_unremoved_envelope_is_a_harmless_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let queue = PendingQueue::new(dir.path().join("pending.db"));
    queue.try_enqueue(&record("hall")).await.unwrap();

    let remote = Arc::new(MemoryRemoteStore::new());
    let state = ConnectivityState::new(Connectivity::Online);
    let crashing = ResyncEngine::new(
        state.handle(),
        Arc::new(CrashBeforeRemoval(queue.clone())),
        remote.clone(),
        COLLECTION,
        Notifier::new(),
    );
    assert_eq!(crashing.drain().await, 1);

    let recovered = ResyncEngine::new(
        state.handle(),
        Arc::new(queue.clone()),
        remote.clone(),
        COLLECTION,
        Notifier::new(),
    );
    assert_eq!(recovered.drain().await, 1);

    let docs = remote.documents(COLLECTION);
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].field("resendAttempts"), Some(&json!(1)));
    assert_eq!(docs[1].field("resendAttempts"), Some(&json!(2)));
    assert_eq!(queue.count().await, 0);
}

// === Idempotent empty drain ===

#[tokio::test]
async fn empty_drain_makes_no_remote_calls() {
    for initial in [Connectivity::Online, Connectivity::Offline] {
        let h = Harness::new(initial);
        assert_eq!(h.resync.drain().await, 0);
        assert_eq!(h.remote.calls(), 0);
    }
}

// === Offline fast path ===

#[tokio::test]
async fn offline_drain_does_not_read_the_queue() {
    let h = Harness::new(Connectivity::Offline);
    h.pipeline.submit(&record("hall")).await.unwrap();

    assert_eq!(h.resync.drain().await, 0);
    assert_eq!(h.queue.list_calls(), 0);
    assert_eq!(h.remote.calls(), 0);
    assert_eq!(h.pending_queue().count().await, 1);
}

// === Scenarios ===

#[tokio::test]
async fn offline_checkin_is_delivered_after_reconnect() {
    let h = Harness::new(Connectivity::Offline);
    let mut notices = h.notifier.subscribe();

    assert_eq!(
        h.pipeline.submit(&scenario_record()).await.unwrap(),
        Submission::SavedOffline
    );
    assert_eq!(notices.recv().await.unwrap(), Notice::SavedOnDevice);

    let queued = h.pending_queue().list_all().await;
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].attempts, 0);
    assert_eq!(queued[0].data, scenario_record());

    h.state.observe(Connectivity::Online);
    assert_eq!(h.resync.drain().await, 1);
    assert!(h.pending_queue().list_all().await.is_empty());

    assert_eq!(notices.recv().await.unwrap(), Notice::ResendStarted { pending: 1 });
    assert_eq!(
        notices.recv().await.unwrap(),
        Notice::ResendFinished {
            sent: 1,
            total: 1,
            outcome: ResendOutcome::AllSent
        }
    );

    let docs = h.documents();
    assert_eq!(docs.len(), 1);
    let doc = &docs[0];
    assert_eq!(doc.field("purpose"), Some(&json!("meeting")));
    assert_eq!(doc.field("reservationId"), Some(&Value::Null));
    assert_eq!(doc.field("clientTimestamp"), Some(&json!("2023-05-01T10:00:00")));
    // Replays through the queue are always marked as resent
    assert_eq!(doc.field("isResent"), Some(&json!(true)));
    assert_eq!(doc.field("resendAttempts"), Some(&json!(1)));
    assert_eq!(
        doc.field("originalTimestamp"),
        Some(&json!(queued[0].timestamp))
    );
    assert!(doc.field("timestamp").is_some());
}

#[tokio::test]
async fn direct_submission_carries_no_resend_marker() {
    let h = Harness::new(Connectivity::Online);

    let outcome = h.pipeline.submit(&scenario_record()).await.unwrap();
    assert!(matches!(outcome, Submission::Delivered(_)));

    let docs = h.documents();
    assert_eq!(docs.len(), 1);
    assert!(docs[0].field("isResent").is_none());
    assert!(docs[0].field("date").is_some());
    assert_eq!(h.pending_queue().count().await, 0);
}

#[tokio::test]
async fn attempt_update_fault_skips_only_that_envelope() {
    let h = Harness::new(Connectivity::Online);
    let first = h.pending_queue().try_enqueue(&record("a")).await.unwrap();
    let second = h.pending_queue().try_enqueue(&record("b")).await.unwrap();
    h.queue.fail_updates_for(second);

    assert_eq!(h.resync.drain().await, 1);

    let left = h.pending_queue().list_all().await;
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, second);
    assert_eq!(left[0].attempts, 0);
    assert!(h.pending_queue().get(first).await.is_err());
    assert_eq!(h.remote.calls(), 1);
}

// === Storage faults ===

#[tokio::test]
async fn unusable_queue_is_reported_as_not_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pending.db");
    std::fs::create_dir_all(&path).unwrap();

    let state = ConnectivityState::new(Connectivity::Offline);
    let notifier = Notifier::new();
    let mut notices = notifier.subscribe();
    let pipeline = SubmissionPipeline::new(
        state.handle(),
        Arc::new(PendingQueue::new(path)),
        Arc::new(MemoryRemoteStore::new()),
        COLLECTION,
        notifier,
    );

    assert!(pipeline.submit(&record("hall")).await.is_err());
    assert!(matches!(
        notices.recv().await.unwrap(),
        Notice::NotRecorded { .. }
    ));
}

// === Drain serialization ===

/// Remote store that takes a while to answer each write.
struct SlowStore {
    inner: MemoryRemoteStore,
}

#[async_trait]
impl RemoteStore for SlowStore {
    async fn add_record(
        &self,
        collection: &str,
        payload: Value,
    ) -> Result<RecordId, RemoteWriteError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.inner.add_record(collection, payload).await
    }

    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<StoredDocument>, RemoteWriteError> {
        self.inner.query(collection, field, value).await
    }
}

#[tokio::test]
async fn overlapping_drains_send_each_envelope_once() {
    let dir = tempfile::tempdir().unwrap();
    let queue = PendingQueue::new(dir.path().join("pending.db"));
    for room in ["a", "b", "c"] {
        queue.try_enqueue(&record(room)).await.unwrap();
    }

    let remote = Arc::new(SlowStore {
        inner: MemoryRemoteStore::new(),
    });
    let state = ConnectivityState::new(Connectivity::Online);
    let resync = ResyncEngine::new(
        state.handle(),
        Arc::new(queue.clone()),
        remote.clone(),
        COLLECTION,
        Notifier::new(),
    );

    let (a, b) = tokio::join!(resync.drain(), resync.drain());
    assert_eq!(a + b, 3);
    assert_eq!(remote.inner.documents(COLLECTION).len(), 3);
    assert_eq!(queue.count().await, 0);
}

// === Network monitor driving the resync engine ===

#[tokio::test]
async fn reconnect_signal_triggers_a_resend_pass() {
    let dir = tempfile::tempdir().unwrap();
    let queue = Arc::new(PendingQueue::new(dir.path().join("pending.db")));
    let remote = Arc::new(MemoryRemoteStore::new());
    let notifier = Notifier::new();
    let mut notices = notifier.subscribe();

    let state = ConnectivityState::new(Connectivity::Offline);
    let pipeline = SubmissionPipeline::new(
        state.handle(),
        queue.clone(),
        remote.clone(),
        COLLECTION,
        notifier.clone(),
    );
    let resync = Arc::new(ResyncEngine::new(
        state.handle(),
        queue.clone(),
        remote.clone(),
        COLLECTION,
        notifier.clone(),
    ));
    let monitor = NetworkMonitor::new(
        state,
        queue.clone(),
        resync,
        notifier.clone(),
        MonitorConfig {
            settle_delay: Duration::from_millis(50),
            startup_drain_delay: Duration::from_millis(50),
        },
    );
    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let _task = monitor.start(shutdown_rx).unwrap();

    pipeline.submit(&record("hall")).await.unwrap();
    assert!(monitor.signals().send(Connectivity::Online));

    let finished = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Notice::ResendFinished { sent, total, .. } = notices.recv().await.unwrap() {
                return (sent, total);
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(finished, (1, 1));
    assert_eq!(remote.documents(COLLECTION).len(), 1);
    assert_eq!(queue.count().await, 0);
}

// === Independent delivery paths ===

#[tokio::test]
async fn a_checkin_may_be_captured_by_both_paths() {
    let h = Harness::new(Connectivity::Offline);
    let http = build_http_client(Duration::from_secs(2)).unwrap();
    let sync = BackgroundSync::register(
        &BackgroundSyncConfig::default(),
        &h.dir.path().join("outbox.db"),
        http.clone(),
    )
    .await;
    let client = CheckInClient::new(http, "http://127.0.0.1:9", sync.clone());

    let checkin = scenario_record();
    h.pipeline.submit(&checkin).await.unwrap();
    assert_eq!(
        client.post_checkin(&checkin).await.unwrap(),
        PostOutcome::Queued
    );

    assert_eq!(h.pending_queue().count().await, 1);
    assert_eq!(sync.queued().await.unwrap(), 1);
}
