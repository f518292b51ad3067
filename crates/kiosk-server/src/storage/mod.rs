//! `SQLite` storage for the kiosk document store.

mod db;
mod queries;


pub use db::{DatabaseError, DocumentDatabase};
pub use queries::{FieldValue, TIMESTAMP_FIELD, is_valid_name};
