//! Kiosk Core Library
//!
//! Shared functionality for the kiosk components:
//! - Check-in domain model and validation
//! - Configuration resolution and hierarchy
//! - Remote document store wire types
//! - `SQLite` helpers shared by the agent and the server
//! - Common error types

pub mod checkin;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod tracing_init;

pub use checkin::{CheckInRecord, CheckInTime, ClockTime};
pub use config::Config;
pub use document::{CreatedDocument, StoredDocument};
pub use error::{Error, Result};
