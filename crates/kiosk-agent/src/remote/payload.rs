//! Remote payloads built from check-ins.
//!
//! Every document carries the check-in fields plus partition fields for the
//! day it was submitted and the client's confirmation time under
//! `clientTimestamp`. Resent documents additionally carry the resend marker.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use kiosk_core::CheckInRecord;

use crate::queue::PendingEnvelope;

/// Submission-day partition fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    /// `YYYY-MM-DD`
    pub date: String,
    /// `YYYY-MM`
    pub month: String,
}

impl Partition {
    pub fn for_day(day: NaiveDate) -> Self {
        Self {
            date: day.format("%Y-%m-%d").to_string(),
            month: day.format("%Y-%m").to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResendMarker<'a> {
    is_resent: bool,
    original_timestamp: &'a str,
    resend_attempts: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmissionPayload<'a> {
    #[serde(flatten)]
    record: &'a CheckInRecord,
    #[serde(flatten)]
    partition: Partition,
    client_timestamp: &'a str,
    #[serde(flatten)]
    resend: Option<ResendMarker<'a>>,
}

/// Payload for a first, direct submission.
pub fn direct(record: &CheckInRecord, day: NaiveDate) -> Result<Value, serde_json::Error> {
    serde_json::to_value(SubmissionPayload {
        record,
        partition: Partition::for_day(day),
        client_timestamp: record.check_in_time.as_str(),
        resend: None,
    })
}

/// Payload for replaying a queued envelope. `day` is the resend day, not
/// the day the envelope was created.
pub fn resend(
    envelope: &PendingEnvelope,
    attempts: u32,
    day: NaiveDate,
) -> Result<Value, serde_json::Error> {
    serde_json::to_value(SubmissionPayload {
        record: &envelope.data,
        partition: Partition::for_day(day),
        client_timestamp: envelope.data.check_in_time.as_str(),
        resend: Some(ResendMarker {
            is_resent: true,
            original_timestamp: &envelope.timestamp,
            resend_attempts: attempts,
        }),
    })
}
