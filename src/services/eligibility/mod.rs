//! Booking status model.
//!
//! Derives everything the render layer shows for a booking (label, badge
//! style, near-completion and past-end flags, auto-completion countdown)
//! from a snapshot and an injected `now`. Nothing here reads the clock or
//! keeps state between calls.
//!
//! The booking's `date`, `start_time` and `end_time` are local wall-clock
//! values; they are interpreted in the time zone carried by `now`.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone};
use serde::Serialize;

use crate::models::booking::{Booking, BookingStatus};

/// Minutes after the scheduled end before the backend may auto-complete.
pub const AUTO_COMPLETION_GRACE_MINUTES: i64 = 15;
/// A confirmed booking ending within this many minutes is "near completion".
pub const NEAR_COMPLETION_THRESHOLD_MINUTES: i64 = 30;

/// Who closed a completed booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionKind {
    /// `completed_by` is null
    Automatic,
    /// A staff member completed it
    Manual,
}

/// Presentation state for a booking at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusBadge {
    pub label: String,
    pub style_class: &'static str,
    pub is_near_completion: bool,
    pub is_past_end: bool,
    pub completion_kind: Option<CompletionKind>,
}

/// Auto-completion countdown for a booking.
///
/// `Due` and `NotApplicable` are deliberately distinct: the first means the
/// grace period is over and the backend has not processed the completion yet,
/// the second means no countdown applies at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoCompletionCountdown {
    NotApplicable,
    Due,
    Remaining(Duration),
}

impl fmt::Display for AutoCompletionCountdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutoCompletionCountdown::NotApplicable => Ok(()),
            AutoCompletionCountdown::Due => f.write_str("auto-completion due"),
            AutoCompletionCountdown::Remaining(remaining) => match format_duration(*remaining) {
                Some(text) => write!(f, "auto-completes in {}", text),
                None => f.write_str("auto-completion due"),
            },
        }
    }
}

pub fn status_label(status: &BookingStatus) -> &str {
    match status {
        BookingStatus::Pending => "awaiting confirmation",
        BookingStatus::Confirmed => "confirmed",
        BookingStatus::Completed => "completed",
        BookingStatus::Cancelled => "cancelled",
        BookingStatus::Other(raw) => raw,
    }
}

pub fn style_class(status: &BookingStatus) -> &'static str {
    match status {
        BookingStatus::Pending => "badge-warning",
        BookingStatus::Confirmed => "badge-info",
        BookingStatus::Completed => "badge-success",
        BookingStatus::Cancelled => "badge-danger",
        BookingStatus::Other(_) => "badge-neutral",
    }
}

/// Scheduled end of the booking as a UTC instant, resolved in `tz`.
///
/// `None` when the timing fields do not parse or the end falls in a
/// daylight-saving gap. Ambiguous local times resolve to the earlier instant.
pub fn end_instant<Tz: TimeZone>(booking: &Booking, tz: &Tz) -> Option<NaiveDateTime> {
    let (_, end) = booking.local_window()?;
    tz.from_local_datetime(&end)
        .earliest()
        .map(|end_at| end_at.naive_utc())
}

/// Time left until the scheduled end, negative once it has passed.
/// `None` for non-confirmed bookings or unknown timing.
fn until_end<Tz: TimeZone>(booking: &Booking, now: &DateTime<Tz>) -> Option<Duration> {
    if !booking.status.is_confirmed() {
        return None;
    }

    let end_at = end_instant(booking, &now.timezone())?;
    Some(end_at - now.naive_utc())
}

pub fn is_near_completion<Tz: TimeZone>(booking: &Booking, now: &DateTime<Tz>) -> bool {
    until_end(booking, now).is_some_and(|remaining| {
        remaining > Duration::zero()
            && remaining < Duration::minutes(NEAR_COMPLETION_THRESHOLD_MINUTES)
    })
}

pub fn is_past_end_time<Tz: TimeZone>(booking: &Booking, now: &DateTime<Tz>) -> bool {
    until_end(booking, now).is_some_and(|remaining| remaining < Duration::zero())
}

/// Time until the booking becomes eligible for auto-completion
/// (scheduled end plus the grace period), floored at zero.
pub fn time_until_auto_completion<Tz: TimeZone>(
    booking: &Booking,
    now: &DateTime<Tz>,
) -> Option<Duration> {
    let remaining =
        until_end(booking, now)? + Duration::minutes(AUTO_COMPLETION_GRACE_MINUTES);
    Some(remaining.max(Duration::zero()))
}

pub fn countdown<Tz: TimeZone>(booking: &Booking, now: &DateTime<Tz>) -> AutoCompletionCountdown {
    match time_until_auto_completion(booking, now) {
        None => AutoCompletionCountdown::NotApplicable,
        Some(remaining) if remaining <= Duration::zero() => AutoCompletionCountdown::Due,
        Some(remaining) => AutoCompletionCountdown::Remaining(remaining),
    }
}

/// Render a countdown as hours and minutes, e.g. `"1h 5m"` or `"12m"`.
///
/// Returns `None` for zero or negative durations; callers show those as
/// "due" rather than as a countdown.
pub fn format_duration(duration: Duration) -> Option<String> {
    if duration <= Duration::zero() {
        return None;
    }

    let total_minutes = duration.num_minutes();
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours > 0 {
        Some(format!("{}h {}m", hours, minutes))
    } else {
        Some(format!("{}m", minutes))
    }
}

pub fn completion_kind(booking: &Booking) -> Option<CompletionKind> {
    if booking.status.is_completed() {
        return Some(if booking.has_completer() {
            CompletionKind::Manual
        } else {
            CompletionKind::Automatic
        });
    }

    None
}

/// `completed_by` is set but the booking is not completed. The completer is
/// ignored by [`completion_kind`]; monitors log it when it first shows up.
pub fn has_stray_completer(booking: &Booking) -> bool {
    !booking.status.is_completed() && booking.has_completer()
}

/// Derive the full presentation state for `booking` at `now`.
///
/// # Examples
/// ```
/// use chrono::{TimeZone, Utc};
/// use futsal_booking_monitor::models::booking::{Booking, BookingStatus};
/// use futsal_booking_monitor::services::eligibility::classify;
///
/// let booking = Booking::new("7", BookingStatus::Confirmed, "2025-06-10", "10:00", "11:00");
/// let now = Utc.with_ymd_and_hms(2025, 6, 10, 10, 45, 0).unwrap();
///
/// let badge = classify(&booking, &now);
/// assert_eq!(badge.label, "confirmed");
/// assert!(badge.is_near_completion);
/// ```
pub fn classify<Tz: TimeZone>(booking: &Booking, now: &DateTime<Tz>) -> StatusBadge {
    StatusBadge {
        label: status_label(&booking.status).to_string(),
        style_class: style_class(&booking.status),
        is_near_completion: is_near_completion(booking, now),
        is_past_end: is_past_end_time(booking, now),
        completion_kind: completion_kind(booking),
    }
}
