//! Per-booking watch state machine.
//!
//! `BookingWatch` holds everything a monitor knows about one booking and
//! applies fetch results to it. It never touches the clock or the network,
//! so the async drivers in `single` and `batch` stay thin and the lifecycle
//! can be tested synchronously.

use chrono::{DateTime, Utc};

use crate::models::booking::{Booking, BookingId, BookingStatus};
use crate::services::api::ApiError;

/// Lifecycle phase of a watched booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchPhase {
    /// Nothing fetched or requested yet
    #[default]
    Idle,
    /// At least one fetch is in flight
    Loading,
    /// Holding a snapshot from the latest applied fetch
    Ready,
    /// Latest applied fetch failed; any earlier snapshot is still held
    Error,
    /// Torn down; no further transitions
    Stopped,
}

/// What a consumer sees for one watched booking.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MonitorState {
    pub booking: Option<Booking>,
    pub last_updated: Option<DateTime<Utc>>,
    pub in_flight: usize,
    pub error: Option<String>,
    pub phase: WatchPhase,
    pub auto_refresh: bool,
}

impl MonitorState {
    pub fn is_loading(&self) -> bool {
        self.in_flight > 0
    }

    pub fn status(&self) -> Option<&BookingStatus> {
        self.booking.as_ref().map(|booking| &booking.status)
    }
}

/// Status change observed between two applied snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub booking_id: BookingId,
    pub from: BookingStatus,
    pub to: BookingStatus,
}

impl StatusChange {
    /// Exactly confirmed → completed.
    pub fn is_auto_completion(&self) -> bool {
        self.from.is_confirmed() && self.to.is_completed()
    }
}

/// Issue order of a fetch. Responses older than the newest applied one are
/// dropped so a slow request cannot roll the snapshot back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchTicket(u64);

/// Result of feeding a fetch response into a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Updated(Option<StatusChange>),
    Failed,
    /// Superseded by a newer response, or the watch was stopped
    Discarded,
}

impl ApplyOutcome {
    pub fn status_change(&self) -> Option<&StatusChange> {
        match self {
            ApplyOutcome::Updated(change) => change.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BookingWatch {
    booking_id: BookingId,
    state: MonitorState,
    next_ticket: u64,
    /// Tickets below this were issued before the watch existed
    first_ticket: FetchTicket,
    newest_applied: Option<FetchTicket>,
}

impl BookingWatch {
    pub fn new(booking_id: BookingId) -> Self {
        Self::starting_at(booking_id, 0)
    }

    /// Watch whose tickets start at `first`. Responses carrying an earlier
    /// ticket belong to a previous watch of the same id and are discarded.
    pub(super) fn starting_at(booking_id: BookingId, first: u64) -> Self {
        Self {
            booking_id,
            state: MonitorState::default(),
            next_ticket: first,
            first_ticket: FetchTicket(first),
            newest_applied: None,
        }
    }

    /// Number the next issued ticket will carry.
    pub(super) fn next_ticket(&self) -> u64 {
        self.next_ticket
    }

    pub fn booking_id(&self) -> &BookingId {
        &self.booking_id
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn is_stopped(&self) -> bool {
        self.state.phase == WatchPhase::Stopped
    }

    pub fn set_auto_refresh(&mut self, enabled: bool) {
        if !self.is_stopped() {
            self.state.auto_refresh = enabled;
        }
    }

    /// Mark a fetch as issued. Returns `None` once the watch is stopped.
    pub fn begin_fetch(&mut self) -> Option<FetchTicket> {
        if self.is_stopped() {
            return None;
        }

        let ticket = FetchTicket(self.next_ticket);
        self.next_ticket += 1;
        self.state.in_flight += 1;
        self.state.phase = WatchPhase::Loading;
        Some(ticket)
    }

    pub fn apply(
        &mut self,
        ticket: FetchTicket,
        result: Result<Booking, ApiError>,
        at: DateTime<Utc>,
    ) -> ApplyOutcome {
        if self.is_stopped() || ticket < self.first_ticket {
            return ApplyOutcome::Discarded;
        }

        self.state.in_flight = self.state.in_flight.saturating_sub(1);

        if self.newest_applied.is_some_and(|newest| ticket < newest) {
            self.settle_phase();
            return ApplyOutcome::Discarded;
        }
        self.newest_applied = Some(ticket);

        let outcome = match result {
            Ok(booking) => {
                let change = self.detect_change(&booking);
                self.state.booking = Some(booking);
                self.state.last_updated = Some(at);
                self.state.error = None;
                ApplyOutcome::Updated(change)
            }
            Err(err) => {
                self.state.error = Some(err.to_string());
                ApplyOutcome::Failed
            }
        };

        self.settle_phase();
        outcome
    }

    /// Forget a fetch whose task died without producing a result.
    pub fn abandon_fetch(&mut self) {
        if self.is_stopped() {
            return;
        }
        self.state.in_flight = self.state.in_flight.saturating_sub(1);
        self.settle_phase();
    }

    /// Tear the watch down. The last snapshot stays readable.
    pub fn stop(&mut self) {
        self.state.phase = WatchPhase::Stopped;
        self.state.in_flight = 0;
        self.state.auto_refresh = false;
    }

    fn detect_change(&self, incoming: &Booking) -> Option<StatusChange> {
        let previous = self.state.status()?;
        if *previous == incoming.status {
            return None;
        }

        Some(StatusChange {
            booking_id: self.booking_id.clone(),
            from: previous.clone(),
            to: incoming.status.clone(),
        })
    }

    fn settle_phase(&mut self) {
        self.state.phase = if self.state.in_flight > 0 {
            WatchPhase::Loading
        } else if self.state.error.is_some() {
            WatchPhase::Error
        } else if self.state.booking.is_some() {
            WatchPhase::Ready
        } else {
            WatchPhase::Idle
        };
    }
}
