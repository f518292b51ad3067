//! Background sync bridge.
//!
//! A second durability path for check-ins posted to the HTTP submission
//! endpoint. Requests that fail at the transport level are stored in a
//! separate outbox (`outbox.db`) and replayed by the sync worker when
//! connectivity returns or on the periodic wake. It is not coordinated with
//! the pending queue: a check-in may end up captured by both.
//!
//! Registration failure leaves the bridge disabled. Every operation on a
//! disabled bridge is a silent no-op.

mod client;
mod worker;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use kiosk_core::config::BackgroundSyncConfig;

use crate::storage::{DatabaseError, OutboxDatabase, SyncRequestParams};

pub use client::{CheckInClient, PostOutcome};
pub use worker::spawn_sync_worker;

const MESSAGE_CHANNEL_CAPACITY: usize = 32;

/// Messages broadcast to every foreground client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A replay pass finished.
    SyncComplete { replayed: usize, remaining: usize },
    /// A push notification arrived.
    Push {
        title: String,
        body: String,
        url: Option<String>,
    },
    /// The user clicked a notification.
    Navigate { url: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Outbox error: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Request failed and background sync is unavailable: {0}")]
    Transport(String),

    #[error("Invalid push payload: {0}")]
    InvalidPush(String),
}

/// Result of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Requests answered with a success status and removed.
    pub replayed: usize,
    /// Requests answered with a failure status and kept.
    pub retained: usize,
    /// Requests discarded because their retention window passed.
    pub expired: usize,
    /// Requests still queued after the pass.
    pub remaining: usize,
}

#[derive(Debug, Deserialize)]
struct PushPayload {
    title: String,
    #[serde(default)]
    body: String,
    url: Option<String>,
}

struct Outbox {
    db: OutboxDatabase,
    tag: String,
    retention: Duration,
    http: reqwest::Client,
}

/// Handle to the background sync bridge. Cloning shares the outbox and the
/// message channel.
#[derive(Clone)]
pub struct BackgroundSync {
    outbox: Option<Arc<Outbox>>,
    messages: broadcast::Sender<ClientMessage>,
}

impl BackgroundSync {
    /// Register the sync task under `config.tag`, opening the outbox at
    /// `path`. Never fails; an unusable outbox yields a disabled bridge.
    pub async fn register(
        config: &BackgroundSyncConfig,
        path: &Path,
        http: reqwest::Client,
    ) -> Self {
        if !config.enabled {
            debug!("Background sync disabled by configuration");
            return Self::disabled();
        }

        match OutboxDatabase::open(path).await {
            Ok(db) => {
                info!(tag = %config.tag, path = %path.display(), "Background sync registered");
                Self::with_outbox(Outbox {
                    db,
                    tag: config.tag.clone(),
                    retention: config.retention(),
                    http,
                })
            }
            Err(e) => {
                debug!(error = %e, "Background sync unavailable, continuing without it");
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        let (messages, _) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);
        Self {
            outbox: None,
            messages,
        }
    }

    fn with_outbox(outbox: Outbox) -> Self {
        let (messages, _) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);
        Self {
            outbox: Some(Arc::new(outbox)),
            messages,
        }
    }

    pub const fn is_enabled(&self) -> bool {
        self.outbox.is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientMessage> {
        self.messages.subscribe()
    }

    fn broadcast(&self, message: ClientMessage) {
        // No foreground client listening is normal
        let _ = self.messages.send(message);
    }

    /// Store a failed request for later replay. `None` when disabled.
    pub async fn queue_request(&self, url: &str, body: &str) -> Result<Option<i64>, SyncError> {
        let Some(outbox) = &self.outbox else {
            return Ok(None);
        };

        let ttl_secs = i64::try_from(outbox.retention.as_secs()).unwrap_or(i64::MAX);
        let id = outbox
            .db
            .push_request(&SyncRequestParams {
                tag: &outbox.tag,
                url,
                body,
                ttl_secs,
            })
            .await?;
        info!(id, url, "Request queued for background sync");
        Ok(Some(id))
    }

    /// Number of live requests in the outbox.
    pub async fn queued(&self) -> Result<usize, SyncError> {
        let Some(outbox) = &self.outbox else {
            return Ok(0);
        };
        let count = outbox.db.count_requests(&outbox.tag).await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Replay the outbox oldest-first and broadcast the result.
    ///
    /// A transport failure ends the pass early; the remaining requests wait
    /// for the next sync opportunity.
    pub async fn replay(&self) -> Result<ReplaySummary, SyncError> {
        let Some(outbox) = &self.outbox else {
            return Ok(ReplaySummary::default());
        };

        let mut summary = ReplaySummary {
            expired: usize::try_from(outbox.db.purge_expired_requests(&outbox.tag).await?)
                .unwrap_or_default(),
            ..ReplaySummary::default()
        };
        if summary.expired > 0 {
            info!(expired = summary.expired, "Discarded expired background sync requests");
        }

        for request in outbox.db.pending_requests(&outbox.tag).await? {
            let result = outbox
                .http
                .post(&request.url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(request.body.clone())
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    outbox.db.delete_request(request.id).await?;
                    summary.replayed += 1;
                }
                Ok(resp) => {
                    debug!(id = request.id, status = %resp.status(), "Replayed request answered with failure, keeping it");
                    summary.retained += 1;
                }
                Err(e) => {
                    warn!(id = request.id, error = %e, "Replay interrupted, connectivity lost again");
                    break;
                }
            }
        }

        summary.remaining = self.queued().await?;
        info!(
            replayed = summary.replayed,
            remaining = summary.remaining,
            "Background sync pass complete"
        );
        self.broadcast(ClientMessage::SyncComplete {
            replayed: summary.replayed,
            remaining: summary.remaining,
        });
        Ok(summary)
    }

    /// Surface a push message to foreground clients.
    pub fn handle_push(&self, data: &str) -> Result<(), SyncError> {
        let push: PushPayload =
            serde_json::from_str(data).map_err(|e| SyncError::InvalidPush(e.to_string()))?;
        self.broadcast(ClientMessage::Push {
            title: push.title,
            body: push.body,
            url: push.url,
        });
        Ok(())
    }

    /// Notification click-through; without a target the app root is opened.
    pub fn handle_notification_click(&self, url: Option<&str>) {
        self.broadcast(ClientMessage::Navigate {
            url: url.unwrap_or("/").to_string(),
        });
    }
}
