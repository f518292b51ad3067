//! Check-in domain model.
//!
//! A [`CheckInRecord`] is produced by the kiosk UI when a visitor confirms a
//! check-in. It is the payload that the agent must deliver to the remote
//! store exactly as entered, whether directly or after a stay in the local
//! pending queue.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, NaiveTime, SecondsFormat};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Wall-clock time of day in `HH:MM` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime(NaiveTime);

impl ClockTime {
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub const fn as_naive(&self) -> NaiveTime {
        self.0
    }
}

impl FromStr for ClockTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .map(Self)
            .map_err(|e| Error::Validation(format!("'{s}' is not a HH:MM time: {e}")))
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl TryFrom<String> for ClockTime {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

/// ISO-8601 confirmation time, kept exactly as the client wrote it.
///
/// Accepts RFC 3339 with `Z` or a numeric offset, and local times without
/// an offset. Fractional seconds of any precision are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CheckInTime(String);

impl CheckInTime {
    /// Current local time with its UTC offset, millisecond precision.
    pub fn now() -> Self {
        Self(Local::now().to_rfc3339_opts(SecondsFormat::Millis, false))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The instant, when the client supplied an offset.
    pub fn offset_time(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.0).ok()
    }
}

impl FromStr for CheckInTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let zoned = DateTime::parse_from_rfc3339(s).is_ok();
        if zoned || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok() {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::Validation(format!("'{s}' is not an ISO-8601 timestamp")))
        }
    }
}

impl fmt::Display for CheckInTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CheckInTime {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CheckInTime> for String {
    fn from(value: CheckInTime) -> Self {
        value.0
    }
}

/// A single room check-in as confirmed on the kiosk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRecord {
    pub room: String,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    /// Number of occupants.
    pub count: u32,
    pub purpose: String,
    pub age_group: String,
    /// Client-assigned at confirmation.
    pub check_in_time: CheckInTime,
    /// Upstream reservation, `None` for walk-ins.
    pub reservation_id: Option<String>,
}

impl CheckInRecord {
    /// Create a walk-in check-in stamped with the current local time.
    pub fn new(
        room: impl Into<String>,
        start_time: ClockTime,
        end_time: ClockTime,
        count: u32,
        purpose: impl Into<String>,
        age_group: impl Into<String>,
    ) -> Self {
        Self {
            room: room.into(),
            start_time,
            end_time,
            count,
            purpose: purpose.into(),
            age_group: age_group.into(),
            check_in_time: CheckInTime::now(),
            reservation_id: None,
        }
    }

    #[must_use]
    pub fn with_reservation(mut self, reservation_id: impl Into<String>) -> Self {
        self.reservation_id = Some(reservation_id.into());
        self
    }

    /// Check the fields that must be present at submission time. The time
    /// range is taken as entered; a range past midnight is legitimate.
    pub fn validate(&self) -> Result<()> {
        if self.room.trim().is_empty() {
            return Err(Error::Validation("room is required".into()));
        }
        if self.purpose.trim().is_empty() {
            return Err(Error::Validation("purpose is required".into()));
        }
        if self.age_group.trim().is_empty() {
            return Err(Error::Validation("ageGroup is required".into()));
        }
        if self.count == 0 {
            return Err(Error::Validation("count must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meeting() -> CheckInRecord {
        serde_json::from_value(json!({
            "room": "private4",
            "startTime": "10:00",
            "endTime": "12:00",
            "count": 2,
            "purpose": "meeting",
            "ageGroup": "thirties",
            "checkInTime": "2023-05-01T10:00:00",
            "reservationId": null
        }))
        .unwrap()
    }

    #[test]
    fn parses_camel_case_payload() {
        let record = meeting();
        assert_eq!(record.room, "private4");
        assert_eq!(record.start_time, ClockTime::from_hm(10, 0).unwrap());
        assert_eq!(record.count, 2);
        assert!(record.reservation_id.is_none());
        assert!(record.validate().is_ok());
    }

    #[test]
    fn serializes_times_as_hh_mm() {
        let value = serde_json::to_value(meeting()).unwrap();
        assert_eq!(value["startTime"], "10:00");
        assert_eq!(value["endTime"], "12:00");
        assert_eq!(value["checkInTime"], "2023-05-01T10:00:00");
        assert_eq!(value["ageGroup"], "thirties");
        assert!(value["reservationId"].is_null());
    }

    #[test]
    fn rejects_malformed_clock_time() {
        assert!("25:00".parse::<ClockTime>().is_err());
        assert!("noon".parse::<ClockTime>().is_err());
        assert_eq!("09:30".parse::<ClockTime>().unwrap().to_string(), "09:30");
    }

    #[test]
    fn zero_occupants_is_invalid() {
        let mut record = meeting();
        record.count = 0;
        assert!(matches!(record.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn blank_room_is_invalid() {
        let mut record = meeting();
        record.room = "  ".into();
        let err = record.validate().unwrap_err();
        assert!(err.to_string().contains("room"));
    }

    #[test]
    fn time_range_is_not_ordered_by_validation() {
        let mut record = meeting();
        record.start_time = ClockTime::from_hm(22, 0).unwrap();
        record.end_time = ClockTime::from_hm(1, 0).unwrap();
        assert!(record.validate().is_ok());

        record.end_time = record.start_time;
        assert!(record.validate().is_ok());
    }

    #[test]
    fn check_in_time_accepts_iso_8601_forms_verbatim() {
        for raw in [
            "2023-05-01T10:00:00",
            "2023-05-01T10:00:00.123",
            "2023-05-01T10:00:00.000Z",
            "2023-05-01T10:00:00+09:00",
            "2023-05-01T01:00:00.123456-05:30",
        ] {
            let mut value = serde_json::to_value(meeting()).unwrap();
            value["checkInTime"] = json!(raw);
            let record: CheckInRecord = serde_json::from_value(value).unwrap();
            assert_eq!(record.check_in_time.as_str(), raw);
            assert_eq!(serde_json::to_value(&record).unwrap()["checkInTime"], raw);
        }
    }

    #[test]
    fn check_in_time_keeps_the_client_offset() {
        let time: CheckInTime = "2023-05-01T10:00:00+09:00".parse().unwrap();
        let instant = time.offset_time().unwrap();
        assert_eq!(instant.offset().local_minus_utc(), 9 * 3600);
        let local: CheckInTime = "2023-05-01T10:00:00".parse().unwrap();
        assert!(local.offset_time().is_none());
    }

    #[test]
    fn check_in_time_rejects_non_timestamps() {
        assert!("yesterday".parse::<CheckInTime>().is_err());
        assert!("2023-05-01".parse::<CheckInTime>().is_err());
        assert!("2023-05-01T25:00:00Z".parse::<CheckInTime>().is_err());

        let mut value = serde_json::to_value(meeting()).unwrap();
        value["checkInTime"] = json!("10:00");
        assert!(serde_json::from_value::<CheckInRecord>(value).is_err());
    }

    #[test]
    fn new_record_is_stamped_with_an_offset() {
        let record = CheckInRecord::new(
            "hall",
            ClockTime::from_hm(9, 0).unwrap(),
            ClockTime::from_hm(10, 0).unwrap(),
            1,
            "study",
            "teens",
        );
        assert!(record.check_in_time.offset_time().is_some());
    }

    #[test]
    fn reservation_is_attached() {
        let record = meeting().with_reservation("evt-42");
        assert_eq!(record.reservation_id.as_deref(), Some("evt-42"));
    }
}
