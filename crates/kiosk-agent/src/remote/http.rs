//! HTTP client for the remote document store.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use kiosk_core::{CreatedDocument, StoredDocument};

use super::{RecordId, RemoteStore, RemoteWriteError};

/// Build the shared `reqwest` client with a per-request timeout.
///
/// The workspace builds reqwest without a bundled crypto provider, so the
/// `ring` provider is installed as the process default first (no-op if one
/// is already installed).
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, RemoteWriteError> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RemoteWriteError::Network(format!("Failed to build HTTP client: {e}")))
}

/// Render a filter value the way the store's query string expects it:
/// strings verbatim, everything else as JSON text.
fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Remote store reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRemoteStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteWriteError> {
        Ok(Self::with_client(base_url, build_http_client(timeout)?))
    }

    pub fn with_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        let base_url: String = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/v1/collections/{collection}/documents", self.base_url)
    }
}

async fn rejection(resp: reqwest::Response) -> RemoteWriteError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    RemoteWriteError::Rejected { status, body }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn add_record(
        &self,
        collection: &str,
        payload: Value,
    ) -> Result<RecordId, RemoteWriteError> {
        let resp = self
            .http
            .post(self.collection_url(collection))
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(rejection(resp).await);
        }

        let created: CreatedDocument = resp.json().await?;
        debug!(collection, id = %created.id, "Document written to remote store");
        Ok(created.id)
    }

    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<StoredDocument>, RemoteWriteError> {
        let value = query_value(value);
        let url = reqwest::Url::parse_with_params(
            &self.collection_url(collection),
            &[("field", field), ("value", value.as_str())],
        )
        .map_err(|e| RemoteWriteError::Network(format!("Invalid store URL: {e}")))?;

        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(rejection(resp).await);
        }

        Ok(resp.json().await?)
    }
}
