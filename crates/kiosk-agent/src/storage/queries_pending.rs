//! Pending check-in queue primitives.
//!
//! Every function runs against a connection owned by the caller, so the
//! queue can open and close its store around each operation.

use sqlx::SqliteConnection;
use sqlx::migrate::Migrator;

use super::models::PendingRow;
use kiosk_core::db::DatabaseError;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations/pending");

/// Create or upgrade the queue schema. Already-applied versions are skipped.
pub async fn run_migrations(conn: &mut SqliteConnection) -> Result<(), DatabaseError> {
    MIGRATOR
        .run_direct(conn)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))
}

/// Insert a new envelope with zero attempts and return its id.
pub async fn insert_pending(
    conn: &mut SqliteConnection,
    data: &str,
    timestamp: &str,
) -> Result<i64, DatabaseError> {
    let result =
        sqlx::query("INSERT INTO pending_checkins (data, timestamp, attempts) VALUES (?, ?, 0)")
            .bind(data)
            .bind(timestamp)
            .execute(&mut *conn)
            .await?;

    Ok(result.last_insert_rowid())
}

/// Fetch all envelopes in insertion order.
pub async fn list_pending(conn: &mut SqliteConnection) -> Result<Vec<PendingRow>, DatabaseError> {
    let rows = sqlx::query_as::<_, PendingRow>(
        "SELECT id, data, timestamp, attempts FROM pending_checkins ORDER BY id ASC",
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

/// Fetch a single envelope.
pub async fn get_pending(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<PendingRow, DatabaseError> {
    sqlx::query_as::<_, PendingRow>(
        "SELECT id, data, timestamp, attempts FROM pending_checkins WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DatabaseError::NotFound(format!("Pending check-in {id}")))
}

/// Delete an envelope. Returns whether a row was removed.
pub async fn delete_pending(conn: &mut SqliteConnection, id: i64) -> Result<bool, DatabaseError> {
    let result = sqlx::query("DELETE FROM pending_checkins WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Overwrite the attempt counter of an existing envelope.
///
/// Fails with `NotFound` without writing anything if the id is unknown.
pub async fn set_attempts(
    conn: &mut SqliteConnection,
    id: i64,
    attempts: i64,
) -> Result<(), DatabaseError> {
    let result = sqlx::query("UPDATE pending_checkins SET attempts = ? WHERE id = ?")
        .bind(attempts)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound(format!("Pending check-in {id}")));
    }
    Ok(())
}

/// Count queued envelopes.
pub async fn count_pending(conn: &mut SqliteConnection) -> Result<i64, DatabaseError> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pending_checkins")
        .fetch_one(&mut *conn)
        .await?;

    Ok(row.0)
}
