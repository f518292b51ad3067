//! `SQLite` database backing the background sync outbox.

use std::path::Path;

use sqlx::migrate::Migrator;
use sqlx::{Pool, Sqlite};
use tracing::info;

use kiosk_core::db::{DatabaseError, open_pool, open_pool_in_memory};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations/outbox");

/// Pooled handle to the outbox store. Kept separate from the pending
/// check-in queue so the two delivery paths never share a file.
#[derive(Clone)]
pub struct OutboxDatabase {
    pool: Pool<Sqlite>,
}

impl OutboxDatabase {
    /// Open or create the outbox at the given path.
    pub async fn open(path: &Path) -> Result<Self, DatabaseError> {
        let pool = open_pool(path).await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Open an in-memory outbox (for testing).
    pub async fn open_in_memory() -> Result<Self, DatabaseError> {
        let pool = open_pool_in_memory().await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        info!("Outbox database migrations complete");
        Ok(())
    }

    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}
