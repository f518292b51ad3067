//! Outbox queries for the background sync bridge.

use super::models::SyncRequest;
use super::outbox_db::OutboxDatabase;
use kiosk_core::db::{DatabaseError, unix_timestamp};

/// Parameters for capturing a failed request.
pub struct SyncRequestParams<'a> {
    pub tag: &'a str,
    pub url: &'a str,
    pub body: &'a str,
    pub ttl_secs: i64,
}

impl OutboxDatabase {
    /// Store a request for later replay.
    pub async fn push_request(&self, params: &SyncRequestParams<'_>) -> Result<i64, DatabaseError> {
        let now = unix_timestamp();
        let expires_at = now + params.ttl_secs;

        let result = sqlx::query(
            "INSERT INTO sync_requests (tag, url, body, created_at, expires_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(params.tag)
        .bind(params.url)
        .bind(params.body)
        .bind(now)
        .bind(expires_at)
        .execute(self.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Fetch unexpired requests for a tag, oldest first.
    ///
    /// Requests are NOT deleted by this call. Use `delete_request` once a
    /// replay has been accepted.
    pub async fn pending_requests(&self, tag: &str) -> Result<Vec<SyncRequest>, DatabaseError> {
        let requests = sqlx::query_as::<_, SyncRequest>(
            "SELECT * FROM sync_requests WHERE tag = ? AND expires_at > ? ORDER BY id ASC",
        )
        .bind(tag)
        .bind(unix_timestamp())
        .fetch_all(self.pool())
        .await?;

        Ok(requests)
    }

    /// Delete a single request after a successful replay.
    pub async fn delete_request(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM sync_requests WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove requests past their retention window.
    pub async fn purge_expired_requests(&self, tag: &str) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM sync_requests WHERE tag = ? AND expires_at <= ?")
            .bind(tag)
            .bind(unix_timestamp())
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }

    /// Count stored requests for a tag.
    pub async fn count_requests(&self, tag: &str) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sync_requests WHERE tag = ?")
            .bind(tag)
            .fetch_one(self.pool())
            .await?;

        Ok(row.0)
    }
}
