//! Database connection and initialization.

pub use kiosk_core::db::DatabaseError;

kiosk_core::define_database!(DocumentDatabase, "Document database migrations complete");
