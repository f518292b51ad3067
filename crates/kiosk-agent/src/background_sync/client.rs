//! HTTP check-in submission with transport-failure capture.

use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use kiosk_core::CheckInRecord;

use super::{BackgroundSync, SyncError};

/// What became of a posted check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    /// The endpoint answered. The status is passed through untouched.
    Response(StatusCode),
    /// The request never got an answer and was queued for background sync.
    Queued,
}

/// Client for `POST /api/checkin` that routes failed requests into the
/// background sync outbox.
#[derive(Clone)]
pub struct CheckInClient {
    http: reqwest::Client,
    endpoint: String,
    sync: BackgroundSync,
}

impl CheckInClient {
    pub fn new(http: reqwest::Client, base_url: &str, sync: BackgroundSync) -> Self {
        Self {
            http,
            endpoint: format!("{}/api/checkin", base_url.trim_end_matches('/')),
            sync,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn post_checkin(&self, record: &CheckInRecord) -> Result<PostOutcome, SyncError> {
        let body = serde_json::to_string(record)?;

        let result = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body.clone())
            .send()
            .await;

        match result {
            Ok(resp) => {
                debug!(status = %resp.status(), "Check-in endpoint answered");
                Ok(PostOutcome::Response(resp.status()))
            }
            Err(e) => {
                warn!(error = %e, "Check-in request failed in transit");
                match self.sync.queue_request(&self.endpoint, &body).await? {
                    Some(_) => Ok(PostOutcome::Queued),
                    None => Err(SyncError::Transport(e.to_string())),
                }
            }
        }
    }
}
