//! Kiosk Server Library
//!
//! A small document store: JSON documents grouped in collections, with
//! append and field-equality lookup, plus the HTTP check-in endpoint.

pub mod error;
pub mod routes;
pub mod storage;
