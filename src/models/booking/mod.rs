// Booking module
// Read-only projection of a backend booking record

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Opaque booking identifier. The backend sends either a number or a string,
/// both are normalized to their string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BookingId(String);

impl BookingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BookingId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for BookingId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for BookingId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for BookingId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(id) => Ok(Self(id)),
            Value::Number(id) => Ok(Self(id.to_string())),
            other => Err(D::Error::custom(format!("invalid booking id: {}", other))),
        }
    }
}

/// Booking lifecycle status as reported by the backend.
///
/// Statuses this crate does not know about are kept verbatim in `Other`
/// so the label layer can still show them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    Other(String),
}

impl BookingStatus {
    pub fn as_str(&self) -> &str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Other(raw) => raw,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, BookingStatus::Confirmed)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, BookingStatus::Completed)
    }
}

impl From<String> for BookingStatus {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => BookingStatus::Pending,
            "confirmed" => BookingStatus::Confirmed,
            "completed" => BookingStatus::Completed,
            "cancelled" => BookingStatus::Cancelled,
            _ => BookingStatus::Other(raw),
        }
    }
}

impl From<&str> for BookingStatus {
    fn from(raw: &str) -> Self {
        Self::from(raw.to_string())
    }
}

impl From<BookingStatus> for String {
    fn from(status: BookingStatus) -> Self {
        match status {
            BookingStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Booking snapshot consumed by the status model and the monitors.
///
/// Only `status`, `date`, `start_time`, `end_time` and `completed_by` carry
/// meaning here. Everything else the backend sends lands in `extra` and is
/// passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub status: BookingStatus,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    /// Staff member who closed the booking. `None` means the system did.
    #[serde(default)]
    pub completed_by: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Booking {
    /// Create a booking with the fields the status model reads.
    ///
    /// # Examples
    /// ```
    /// use futsal_booking_monitor::models::booking::{Booking, BookingStatus};
    ///
    /// let booking = Booking::new("42", BookingStatus::Confirmed, "2025-06-10", "10:00", "11:00");
    /// assert!(booking.local_window().is_some());
    /// ```
    pub fn new(
        id: impl Into<BookingId>,
        status: BookingStatus,
        date: impl Into<String>,
        start_time: impl Into<String>,
        end_time: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            status,
            date: date.into(),
            start_time: start_time.into(),
            end_time: end_time.into(),
            completed_by: None,
            field_name: None,
            extra: Map::new(),
        }
    }

    pub fn with_completed_by(mut self, actor: impl Into<Value>) -> Self {
        self.completed_by = Some(actor.into());
        self
    }

    pub fn has_completer(&self) -> bool {
        self.completed_by.as_ref().is_some_and(|actor| !actor.is_null())
    }

    /// Local wall-clock start and end of the session.
    ///
    /// An end time that is not after the start time rolls over to the next
    /// day. Returns `None` when any of the three fields fails to parse.
    pub fn local_window(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let date = NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d").ok()?;
        let start = parse_time_of_day(&self.start_time)?;
        let end = parse_time_of_day(&self.end_time)?;

        let start_at = date.and_time(start);
        let mut end_at = date.and_time(end);
        if end <= start {
            end_at = date.succ_opt()?.and_time(end);
        }

        Some((start_at, end_at))
    }
}

fn parse_time_of_day(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}
