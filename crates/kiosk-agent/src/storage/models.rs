//! Row models for the agent's on-device stores.

use serde::{Deserialize, Serialize};

/// Raw row of the pending check-in queue. `data` holds the JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingRow {
    pub id: i64,
    pub data: String,
    pub timestamp: String,
    pub attempts: i64,
}

/// HTTP request captured by the background sync bridge.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SyncRequest {
    pub id: i64,
    pub tag: String,
    pub url: String,
    pub body: String,
    pub created_at: i64,
    pub expires_at: i64,
}
