//! Remote document store collaborator.
//!
//! The agent only needs two things from the store: append a document to a
//! collection, and (for diagnostics) look documents up by field equality.

pub mod http;
pub mod payload;

use async_trait::async_trait;
use serde_json::Value;

pub use http::{HttpRemoteStore, build_http_client};
pub use kiosk_core::StoredDocument;

/// Identifier the remote store assigns to a written document.
pub type RecordId = String;

/// Errors from remote store calls.
#[derive(Debug, thiserror::Error)]
pub enum RemoteWriteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote store request timed out")]
    Timeout,

    #[error("Remote store rejected the request (status {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid response from remote store: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for RemoteWriteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Abstract remote document store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Append `payload` to `collection`. The store stamps its own
    /// `timestamp` field on the stored document.
    async fn add_record(
        &self,
        collection: &str,
        payload: Value,
    ) -> Result<RecordId, RemoteWriteError>;

    /// Documents of `collection` whose `field` equals `value`.
    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<StoredDocument>, RemoteWriteError>;
}
