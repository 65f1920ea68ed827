use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

use super::context::{new_ticker, next_tick, settle_fetch, spawn_fetch, FetchOutcome, MonitorContext};
use super::watch::{BookingWatch, MonitorState};
use super::WatchOptions;
use crate::models::booking::BookingId;
use crate::services::api::BookingApi;
use crate::services::notification::Notifier;

#[derive(Debug)]
enum Command {
    Refresh,
    SetAutoRefresh(bool),
    Stop,
}

/// Live view of one booking, kept fresh by polling the backend.
///
/// The poll loop runs as its own tokio task and owns the watch state;
/// this handle reads snapshots and sends commands. Dropping the handle
/// tears the watch down.
pub struct BookingMonitor {
    booking_id: BookingId,
    state_rx: watch::Receiver<MonitorState>,
    commands: mpsc::UnboundedSender<Command>,
    task: Option<JoinHandle<()>>,
}

impl BookingMonitor {
    /// Start watching `booking_id`: fetch immediately, then every
    /// `options.interval` while auto-refresh is on.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<A, N>(
        booking_id: BookingId,
        context: MonitorContext<A, N>,
        options: WatchOptions,
    ) -> Self
    where
        A: BookingApi + 'static,
        N: Notifier + 'static,
    {
        let mut tracked = BookingWatch::new(booking_id.clone());
        tracked.set_auto_refresh(options.auto_refresh);
        let (state_tx, state_rx) = watch::channel(tracked.state().clone());
        let (commands, command_rx) = mpsc::unbounded_channel();

        log::info!(
            "Watching booking {} every {:?} (auto-refresh: {})",
            booking_id,
            options.interval,
            options.auto_refresh
        );

        let task = tokio::spawn(run_monitor(tracked, context, options, state_tx, command_rx));

        Self {
            booking_id,
            state_rx,
            commands,
            task: Some(task),
        }
    }

    pub fn booking_id(&self) -> &BookingId {
        &self.booking_id
    }

    /// Latest published state.
    pub fn state(&self) -> MonitorState {
        self.state_rx.borrow().clone()
    }

    /// Receiver that is notified every time the state changes.
    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state_rx.clone()
    }

    /// Fetch now, outside the regular schedule. The timer is left as is.
    pub fn refresh(&self) {
        self.send(Command::Refresh);
    }

    /// Turn the repeating fetch on or off. Turning it off keeps the
    /// last snapshot; turning it on restarts the interval from now.
    pub fn set_auto_refresh(&self, enabled: bool) {
        self.send(Command::SetAutoRefresh(enabled));
    }

    /// Tear the watch down and return the final state. In-flight fetches
    /// are abandoned and their results never applied.
    pub async fn stop(mut self) -> MonitorState {
        self.send(Command::Stop);
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                log::warn!("Monitor task for booking {} ended abnormally: {}", self.booking_id, err);
            }
        }
        self.state()
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            log::debug!("Monitor for booking {} is no longer running", self.booking_id);
        }
    }
}

impl Drop for BookingMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_monitor<A, N>(
    mut tracked: BookingWatch,
    context: MonitorContext<A, N>,
    options: WatchOptions,
    state_tx: watch::Sender<MonitorState>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) where
    A: BookingApi + 'static,
    N: Notifier + 'static,
{
    let mut in_flight: JoinSet<FetchOutcome> = JoinSet::new();
    let mut ticker = options.auto_refresh.then(|| new_ticker(options.interval));

    issue_fetch(&mut tracked, &context, &mut in_flight);
    state_tx.send_replace(tracked.state().clone());

    loop {
        tokio::select! {
            _ = next_tick(&mut ticker) => {
                issue_fetch(&mut tracked, &context, &mut in_flight);
            }
            command = commands.recv() => match command {
                Some(Command::Refresh) => issue_fetch(&mut tracked, &context, &mut in_flight),
                Some(Command::SetAutoRefresh(enabled)) => {
                    ticker = enabled.then(|| new_ticker(options.interval));
                    tracked.set_auto_refresh(enabled);
                }
                Some(Command::Stop) | None => break,
            },
            Some(joined) = in_flight.join_next() => match joined {
                Ok(outcome) => {
                    settle_fetch(&mut tracked, outcome, &context);
                }
                Err(err) => {
                    log::warn!("Fetch task for booking {} failed: {}", tracked.booking_id(), err);
                    tracked.abandon_fetch();
                }
            },
        }

        state_tx.send_replace(tracked.state().clone());
    }

    in_flight.abort_all();
    tracked.stop();
    state_tx.send_replace(tracked.state().clone());
    log::info!("Stopped watching booking {}", tracked.booking_id());
}

fn issue_fetch<A, N>(
    tracked: &mut BookingWatch,
    context: &MonitorContext<A, N>,
    in_flight: &mut JoinSet<FetchOutcome>,
) where
    A: BookingApi + 'static,
{
    if let Some(ticket) = tracked.begin_fetch() {
        spawn_fetch(in_flight, &context.api, tracked.booking_id().clone(), ticket);
    }
}
