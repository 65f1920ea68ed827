use std::future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::watch::{ApplyOutcome, BookingWatch, FetchTicket, StatusChange};
use crate::models::booking::{Booking, BookingId};
use crate::services::api::{ApiError, BookingApi};
use crate::services::eligibility::has_stray_completer;
use crate::services::notification::Notifier;
use crate::services::telemetry::PollTelemetry;

/// Collaborators shared by every monitor: where bookings come from, where
/// notifications go, and where poll counters are kept.
pub struct MonitorContext<A, N> {
    pub api: Arc<A>,
    pub notifier: Arc<N>,
    pub telemetry: Arc<PollTelemetry>,
}

impl<A, N> MonitorContext<A, N> {
    pub fn new(api: Arc<A>, notifier: Arc<N>, telemetry: Arc<PollTelemetry>) -> Self {
        Self {
            api,
            notifier,
            telemetry,
        }
    }
}

impl<A, N> Clone for MonitorContext<A, N> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            notifier: Arc::clone(&self.notifier),
            telemetry: Arc::clone(&self.telemetry),
        }
    }
}

pub(crate) struct FetchOutcome {
    pub booking_id: BookingId,
    pub ticket: FetchTicket,
    pub latency: Duration,
    pub result: Result<Booking, ApiError>,
}

pub(crate) fn spawn_fetch<A>(
    in_flight: &mut JoinSet<FetchOutcome>,
    api: &Arc<A>,
    booking_id: BookingId,
    ticket: FetchTicket,
) where
    A: BookingApi + 'static,
{
    let api = Arc::clone(api);
    in_flight.spawn(async move {
        let started = Instant::now();
        let id = booking_id.clone();
        let fetch = tokio::spawn(async move { api.fetch_booking(&id).await });
        let _guard = AbortOnDrop(fetch.abort_handle());

        // A panicking fetch still settles as a failure for its booking
        let result = match fetch.await {
            Ok(result) => result,
            Err(err) => Err(ApiError::Task(err.to_string())),
        };
        FetchOutcome {
            booking_id,
            ticket,
            latency: started.elapsed(),
            result,
        }
    });
}

/// Cancels the inner fetch when the outer task is aborted.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Apply a finished fetch to its watch, record telemetry, and fire the
/// auto-completion notification when the status edge is crossed.
pub(crate) fn settle_fetch<A, N>(
    watch: &mut BookingWatch,
    outcome: FetchOutcome,
    context: &MonitorContext<A, N>,
) -> Option<StatusChange>
where
    N: Notifier,
{
    context
        .telemetry
        .record_fetch(outcome.latency, outcome.result.is_ok());

    if let Err(err) = &outcome.result {
        log::warn!("Fetch for booking {} failed: {}", outcome.booking_id, err);
    }

    let had_stray = watch.state().booking.as_ref().is_some_and(has_stray_completer);
    let outcome_kind = watch.apply(outcome.ticket, outcome.result, Utc::now());

    if let Some(booking) = watch.state().booking.as_ref() {
        if stray_completer_appeared(had_stray, booking) {
            log::warn!(
                "Booking {} has completed_by set but status is '{}'; ignoring completer",
                booking.id,
                booking.status
            );
        }
    }

    match outcome_kind {
        ApplyOutcome::Updated(Some(change)) => {
            log::info!(
                "Booking {} status changed: {} -> {}",
                change.booking_id,
                change.from,
                change.to
            );
            if change.is_auto_completion() {
                announce_auto_completion(watch, context);
            }
            Some(change)
        }
        ApplyOutcome::Discarded => {
            log::debug!(
                "Discarded superseded response for booking {}",
                outcome.booking_id
            );
            context.telemetry.record_discarded();
            None
        }
        ApplyOutcome::Updated(None) | ApplyOutcome::Failed => None,
    }
}

/// True when `current` carries a stray completer the previous snapshot did not.
fn stray_completer_appeared(had_stray: bool, current: &Booking) -> bool {
    !had_stray && has_stray_completer(current)
}

fn announce_auto_completion<A, N>(watch: &BookingWatch, context: &MonitorContext<A, N>)
where
    N: Notifier,
{
    let Some(booking) = watch.state().booking.as_ref() else {
        return;
    };

    context.telemetry.record_notification();
    if let Err(err) = context.notifier.notify_auto_completed(booking) {
        log::warn!(
            "Failed to show auto-completion notification for booking {}: {}",
            booking.id,
            err
        );
    }
}

pub(crate) fn new_ticker(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Next tick of an optional ticker; never resolves while the ticker is off.
pub(crate) async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booking::BookingStatus;
    use crate::services::notification::MockNotifier;

    fn booking(status: BookingStatus) -> Booking {
        Booking::new("42", status, "2025-06-10", "10:00", "11:00")
    }

    fn context_with(notifier: MockNotifier) -> MonitorContext<(), MockNotifier> {
        MonitorContext::new(
            Arc::new(()),
            Arc::new(notifier),
            Arc::new(PollTelemetry::new()),
        )
    }

    fn settle(
        watch: &mut BookingWatch,
        context: &MonitorContext<(), MockNotifier>,
        result: Result<Booking, ApiError>,
    ) -> Option<StatusChange> {
        let ticket = watch.begin_fetch().unwrap();
        let outcome = FetchOutcome {
            booking_id: watch.booking_id().clone(),
            ticket,
            latency: Duration::from_millis(20),
            result,
        };
        settle_fetch(watch, outcome, context)
    }

    #[test]
    fn test_notifies_once_on_auto_completion() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify_auto_completed()
            .withf(|booking| booking.id.as_str() == "42")
            .times(1)
            .returning(|_| Ok(()));
        let context = context_with(notifier);
        let mut watch = BookingWatch::new(BookingId::from("42"));

        settle(&mut watch, &context, Ok(booking(BookingStatus::Confirmed)));
        let change = settle(&mut watch, &context, Ok(booking(BookingStatus::Completed)));
        settle(&mut watch, &context, Ok(booking(BookingStatus::Completed)));

        assert!(change.is_some_and(|change| change.is_auto_completion()));
        let snapshot = context.telemetry.snapshot();
        assert_eq!(snapshot.fetches, 3);
        assert_eq!(snapshot.notifications, 1);
    }

    #[test]
    fn test_first_snapshot_completed_does_not_notify() {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify_auto_completed().times(0);
        let context = context_with(notifier);
        let mut watch = BookingWatch::new(BookingId::from("42"));

        assert!(settle(&mut watch, &context, Ok(booking(BookingStatus::Completed))).is_none());
    }

    #[test]
    fn test_notifier_failure_keeps_snapshot() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify_auto_completed()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("no notification daemon")));
        let context = context_with(notifier);
        let mut watch = BookingWatch::new(BookingId::from("42"));

        settle(&mut watch, &context, Ok(booking(BookingStatus::Confirmed)));
        settle(&mut watch, &context, Ok(booking(BookingStatus::Completed)));

        assert_eq!(watch.state().status(), Some(&BookingStatus::Completed));
        assert_eq!(watch.state().error, None);
    }

    #[test]
    fn test_stray_completer_reported_only_when_it_appears() {
        let clean = booking(BookingStatus::Cancelled);
        let stray = booking(BookingStatus::Cancelled).with_completed_by("staff-3");

        assert!(stray_completer_appeared(false, &stray));
        assert!(!stray_completer_appeared(true, &stray));
        assert!(!stray_completer_appeared(false, &clean));
    }

    #[test]
    fn test_failed_fetch_counts_failure() {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify_auto_completed().times(0);
        let context = context_with(notifier);
        let mut watch = BookingWatch::new(BookingId::from("42"));

        settle(
            &mut watch,
            &context,
            Err(ApiError::Network("timed out".to_string())),
        );

        let snapshot = context.telemetry.snapshot();
        assert_eq!(snapshot.fetches, 1);
        assert_eq!(snapshot.failures, 1);
        assert!(watch.state().error.is_some());
    }
}
