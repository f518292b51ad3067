//! Kiosk Agent Library
//!
//! The on-device side of check-in durability:
//! - Pending check-in queue (`SQLite`, one connection per operation)
//! - Network state monitor and connectivity probe
//! - Submission pipeline with device-queue fallback
//! - Resync engine replaying queued check-ins
//! - Background sync bridge for the HTTP submission path

pub mod agent;
pub mod background_sync;
pub mod network;
pub mod notice;
pub mod queue;
pub mod remote;
pub mod resync;
pub mod storage;
pub mod submit;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use agent::Agent;
pub use network::{Connectivity, ConnectivityHandle, ConnectivityState, NetworkMonitor};
pub use notice::{Notice, Notifier, ResendOutcome};
pub use queue::{PendingEnvelope, PendingQueue, PendingStore};
pub use remote::{HttpRemoteStore, RemoteStore, RemoteWriteError};
pub use resync::ResyncEngine;
pub use submit::{Submission, SubmissionPipeline, SubmitError};
