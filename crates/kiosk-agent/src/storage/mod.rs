//! `SQLite` storage for the kiosk agent.
//!
//! Two independent stores live on the device: the pending check-in queue
//! (`pending.db`) and the background sync outbox (`outbox.db`).

mod models;
mod outbox_db;
mod queries_outbox;
pub mod queries_pending;


pub use kiosk_core::db::DatabaseError;
pub use models::*;
pub use outbox_db::OutboxDatabase;
pub use queries_outbox::SyncRequestParams;
