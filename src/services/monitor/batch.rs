use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

use super::context::{new_ticker, next_tick, settle_fetch, spawn_fetch, FetchOutcome, MonitorContext};
use super::watch::{BookingWatch, FetchTicket, MonitorState};
use super::WatchOptions;
use crate::models::booking::{Booking, BookingId};
use crate::services::api::BookingApi;
use crate::services::notification::Notifier;

/// What a consumer sees for a set of watched bookings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchState {
    pub entries: BTreeMap<BookingId, MonitorState>,
    pub auto_refresh: bool,
    pub stopped: bool,
}

impl BatchState {
    pub fn booking(&self, id: &BookingId) -> Option<&Booking> {
        self.entries.get(id)?.booking.as_ref()
    }

    /// Every booking with a snapshot, keyed by id.
    pub fn bookings(&self) -> impl Iterator<Item = (&BookingId, &Booking)> {
        self.entries
            .iter()
            .filter_map(|(id, entry)| entry.booking.as_ref().map(|booking| (id, booking)))
    }

    pub fn errors(&self) -> impl Iterator<Item = (&BookingId, &str)> {
        self.entries
            .iter()
            .filter_map(|(id, entry)| entry.error.as_deref().map(|error| (id, error)))
    }

    pub fn is_loading(&self) -> bool {
        self.entries.values().any(MonitorState::is_loading)
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.entries
            .values()
            .filter_map(|entry| entry.last_updated)
            .max()
    }
}

/// Watch state for a set of bookings; one `BookingWatch` per id so a
/// failing id never disturbs the others.
#[derive(Debug, Clone, Default)]
pub struct BatchWatch {
    watches: BTreeMap<BookingId, BookingWatch>,
    /// First ticket for re-added ids; above every ticket a removed watch issued
    ticket_floor: u64,
    auto_refresh: bool,
    stopped: bool,
}

impl BatchWatch {
    pub fn new(booking_ids: impl IntoIterator<Item = BookingId>) -> Self {
        let watches = booking_ids
            .into_iter()
            .map(|id| (id.clone(), BookingWatch::new(id)))
            .collect();

        Self {
            watches,
            ticket_floor: 0,
            auto_refresh: false,
            stopped: false,
        }
    }

    pub fn booking_ids(&self) -> impl Iterator<Item = &BookingId> {
        self.watches.keys()
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Replace the watched set. Ids no longer present are dropped with their
    /// state; returns the ids that were not watched before.
    pub fn set_booking_ids(&mut self, booking_ids: impl IntoIterator<Item = BookingId>) -> Vec<BookingId> {
        if self.stopped {
            return Vec::new();
        }

        let mut next = BTreeMap::new();
        let mut added = Vec::new();

        for id in booking_ids {
            if next.contains_key(&id) {
                continue;
            }
            let watch = match self.watches.remove(&id) {
                Some(existing) => existing,
                None => {
                    added.push(id.clone());
                    let mut fresh = BookingWatch::starting_at(id.clone(), self.ticket_floor);
                    fresh.set_auto_refresh(self.auto_refresh);
                    fresh
                }
            };
            next.insert(id, watch);
        }

        for (removed, watch) in &self.watches {
            log::debug!("No longer watching booking {}", removed);
            self.ticket_floor = self.ticket_floor.max(watch.next_ticket());
        }

        self.watches = next;
        added
    }

    pub fn begin_fetch(&mut self, id: &BookingId) -> Option<FetchTicket> {
        if self.stopped {
            return None;
        }
        self.watches.get_mut(id)?.begin_fetch()
    }

    /// Issue one fetch per watched id.
    pub fn begin_tick(&mut self) -> Vec<(BookingId, FetchTicket)> {
        if self.stopped {
            return Vec::new();
        }

        self.watches
            .iter_mut()
            .filter_map(|(id, watch)| watch.begin_fetch().map(|ticket| (id.clone(), ticket)))
            .collect()
    }

    pub fn watch_mut(&mut self, id: &BookingId) -> Option<&mut BookingWatch> {
        self.watches.get_mut(id)
    }

    pub fn set_auto_refresh(&mut self, enabled: bool) {
        if self.stopped {
            return;
        }
        self.auto_refresh = enabled;
        for watch in self.watches.values_mut() {
            watch.set_auto_refresh(enabled);
        }
    }

    pub fn stop(&mut self) {
        self.stopped = true;
        self.auto_refresh = false;
        for watch in self.watches.values_mut() {
            watch.stop();
        }
    }

    pub fn snapshot(&self) -> BatchState {
        BatchState {
            entries: self
                .watches
                .iter()
                .map(|(id, watch)| (id.clone(), watch.state().clone()))
                .collect(),
            auto_refresh: self.auto_refresh,
            stopped: self.stopped,
        }
    }
}

#[derive(Debug)]
enum Command {
    Refresh,
    SetAutoRefresh(bool),
    SetBookingIds(Vec<BookingId>),
    Stop,
}

/// Live view of many bookings, fetched concurrently on every tick.
pub struct BatchMonitor {
    state_rx: watch::Receiver<BatchState>,
    commands: mpsc::UnboundedSender<Command>,
    task: Option<JoinHandle<()>>,
}

impl BatchMonitor {
    /// Start watching `booking_ids`. Use [`WatchOptions::batch`] for the
    /// default batch interval. Must be called from within a tokio runtime.
    pub fn start<A, N>(
        booking_ids: impl IntoIterator<Item = BookingId>,
        context: MonitorContext<A, N>,
        options: WatchOptions,
    ) -> Self
    where
        A: BookingApi + 'static,
        N: Notifier + 'static,
    {
        let mut tracked = BatchWatch::new(booking_ids);
        tracked.set_auto_refresh(options.auto_refresh);
        let (state_tx, state_rx) = watch::channel(tracked.snapshot());
        let (commands, command_rx) = mpsc::unbounded_channel();

        log::info!(
            "Watching {} bookings every {:?} (auto-refresh: {})",
            tracked.len(),
            options.interval,
            options.auto_refresh
        );

        let task = tokio::spawn(run_batch(tracked, context, options, state_tx, command_rx));

        Self {
            state_rx,
            commands,
            task: Some(task),
        }
    }

    pub fn state(&self) -> BatchState {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BatchState> {
        self.state_rx.clone()
    }

    pub fn refresh(&self) {
        self.send(Command::Refresh);
    }

    pub fn set_auto_refresh(&self, enabled: bool) {
        self.send(Command::SetAutoRefresh(enabled));
    }

    /// Replace the watched set; new ids are fetched right away.
    pub fn set_booking_ids(&self, booking_ids: impl IntoIterator<Item = BookingId>) {
        self.send(Command::SetBookingIds(booking_ids.into_iter().collect()));
    }

    pub async fn stop(mut self) -> BatchState {
        self.send(Command::Stop);
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                log::warn!("Batch monitor task ended abnormally: {}", err);
            }
        }
        self.state()
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            log::debug!("Batch monitor is no longer running");
        }
    }
}

impl Drop for BatchMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_batch<A, N>(
    mut tracked: BatchWatch,
    context: MonitorContext<A, N>,
    options: WatchOptions,
    state_tx: watch::Sender<BatchState>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) where
    A: BookingApi + 'static,
    N: Notifier + 'static,
{
    let mut in_flight: JoinSet<FetchOutcome> = JoinSet::new();
    let mut ticker = options.auto_refresh.then(|| new_ticker(options.interval));

    issue_tick(&mut tracked, &context, &mut in_flight);
    state_tx.send_replace(tracked.snapshot());

    loop {
        tokio::select! {
            _ = next_tick(&mut ticker) => {
                issue_tick(&mut tracked, &context, &mut in_flight);
            }
            command = commands.recv() => match command {
                Some(Command::Refresh) => issue_tick(&mut tracked, &context, &mut in_flight),
                Some(Command::SetAutoRefresh(enabled)) => {
                    ticker = enabled.then(|| new_ticker(options.interval));
                    tracked.set_auto_refresh(enabled);
                }
                Some(Command::SetBookingIds(booking_ids)) => {
                    for id in tracked.set_booking_ids(booking_ids) {
                        if let Some(ticket) = tracked.begin_fetch(&id) {
                            spawn_fetch(&mut in_flight, &context.api, id, ticket);
                        }
                    }
                }
                Some(Command::Stop) | None => break,
            },
            Some(joined) = in_flight.join_next() => match joined {
                Ok(outcome) => match tracked.watch_mut(&outcome.booking_id) {
                    Some(entry) => {
                        settle_fetch(entry, outcome, &context);
                    }
                    None => {
                        log::debug!("Dropping response for unwatched booking {}", outcome.booking_id);
                        context.telemetry.record_discarded();
                    }
                },
                Err(err) => log::warn!("Batch fetch task failed: {}", err),
            },
        }

        state_tx.send_replace(tracked.snapshot());
    }

    in_flight.abort_all();
    tracked.stop();
    state_tx.send_replace(tracked.snapshot());
    log::info!("Stopped batch monitor");
}

fn issue_tick<A, N>(
    tracked: &mut BatchWatch,
    context: &MonitorContext<A, N>,
    in_flight: &mut JoinSet<FetchOutcome>,
) where
    A: BookingApi + 'static,
{
    for (id, ticket) in tracked.begin_tick() {
        spawn_fetch(in_flight, &context.api, id, ticket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booking::BookingStatus;
    use crate::services::api::ApiError;
    use crate::services::monitor::ApplyOutcome;
    use chrono::TimeZone;

    fn ids(raw: &[&str]) -> Vec<BookingId> {
        raw.iter().map(|id| BookingId::from(*id)).collect()
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_tick_covers_every_id() {
        let mut batch = BatchWatch::new(ids(&["1", "2", "3"]));
        let issued = batch.begin_tick();
        assert_eq!(issued.len(), 3);
        assert!(batch.snapshot().is_loading());
    }

    #[test]
    fn test_one_failure_does_not_affect_others() {
        let mut batch = BatchWatch::new(ids(&["1", "2"]));
        for (id, ticket) in batch.begin_tick() {
            let booking = Booking::new(id.clone(), BookingStatus::Confirmed, "2025-06-10", "10:00", "11:00");
            batch.watch_mut(&id).unwrap().apply(ticket, Ok(booking), at());
        }

        for (id, ticket) in batch.begin_tick() {
            let result = if id.as_str() == "1" {
                Err(ApiError::Rejected("Booking not found".into()))
            } else {
                Ok(Booking::new(id.clone(), BookingStatus::Completed, "2025-06-10", "10:00", "11:00"))
            };
            batch.watch_mut(&id).unwrap().apply(ticket, result, at());
        }

        let state = batch.snapshot();
        assert_eq!(
            state.booking(&BookingId::from("1")).map(|b| &b.status),
            Some(&BookingStatus::Confirmed)
        );
        assert_eq!(
            state.booking(&BookingId::from("2")).map(|b| &b.status),
            Some(&BookingStatus::Completed)
        );
        let errors: Vec<_> = state.errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, &BookingId::from("1"));
        assert_eq!(state.bookings().count(), 2);
        assert_eq!(state.last_updated(), Some(at()));
    }

    #[test]
    fn test_set_booking_ids_keeps_existing_state() {
        let mut batch = BatchWatch::new(ids(&["1", "2"]));
        let ticket = batch.begin_fetch(&BookingId::from("1")).unwrap();
        let booking = Booking::new("1", BookingStatus::Pending, "2025-06-10", "10:00", "11:00");
        batch.watch_mut(&BookingId::from("1")).unwrap().apply(ticket, Ok(booking), at());

        let added = batch.set_booking_ids(ids(&["1", "3", "3"]));
        assert_eq!(added, ids(&["3"]));
        assert_eq!(batch.booking_ids().cloned().collect::<Vec<_>>(), ids(&["1", "3"]));
        assert!(batch.snapshot().booking(&BookingId::from("1")).is_some());
        assert!(batch.watch_mut(&BookingId::from("2")).is_none());
    }

    #[test]
    fn test_readded_id_discards_response_from_before_removal() {
        let id = BookingId::from("1");
        let mut batch = BatchWatch::new(ids(&["1"]));
        let old_ticket = batch.begin_fetch(&id).unwrap();

        batch.set_booking_ids(Vec::new());
        assert_eq!(batch.set_booking_ids(ids(&["1"])), ids(&["1"]));
        let new_ticket = batch.begin_fetch(&id).unwrap();
        assert!(new_ticket > old_ticket);

        let completed = Booking::new("1", BookingStatus::Completed, "2025-06-10", "10:00", "11:00");
        let confirmed = Booking::new("1", BookingStatus::Confirmed, "2025-06-10", "10:00", "11:00");
        let watch = batch.watch_mut(&id).unwrap();
        assert_eq!(watch.apply(new_ticket, Ok(completed), at()), ApplyOutcome::Updated(None));
        assert_eq!(watch.apply(old_ticket, Ok(confirmed), at()), ApplyOutcome::Discarded);

        let state = batch.snapshot();
        assert_eq!(
            state.booking(&id).map(|b| &b.status),
            Some(&BookingStatus::Completed)
        );
        assert!(!state.is_loading());
    }

    #[test]
    fn test_stop_blocks_new_fetches() {
        let mut batch = BatchWatch::new(ids(&["1"]));
        batch.set_auto_refresh(true);
        batch.stop();

        assert!(batch.begin_tick().is_empty());
        assert!(batch.set_booking_ids(ids(&["2"])).is_empty());
        let state = batch.snapshot();
        assert!(state.stopped);
        assert!(!state.auto_refresh);
    }
}
