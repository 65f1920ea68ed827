//! Booking status monitors.
//!
//! A monitor polls the backend on a fixed interval, keeps the latest
//! snapshot per booking, and raises one notification when a booking moves
//! from confirmed to completed. Failures are recorded on the state and
//! retried on the next tick; there is no backoff.

mod batch;
mod context;
mod single;
mod watch;

use std::time::Duration;

pub use batch::{BatchMonitor, BatchState, BatchWatch};
pub use context::MonitorContext;
pub use single::BookingMonitor;
pub use watch::{ApplyOutcome, BookingWatch, FetchTicket, MonitorState, StatusChange, WatchPhase};

use crate::models::settings::{
    MonitorSettings, DEFAULT_BATCH_POLL_INTERVAL_MS, DEFAULT_POLL_INTERVAL_MS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub interval: Duration,
    pub auto_refresh: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            auto_refresh: true,
        }
    }
}

impl WatchOptions {
    /// Defaults for a batch monitor: twice the single-booking interval.
    pub fn batch() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_BATCH_POLL_INTERVAL_MS),
            auto_refresh: true,
        }
    }

    pub fn from_settings(settings: &MonitorSettings) -> Self {
        Self {
            interval: settings.poll_interval(),
            auto_refresh: settings.auto_refresh,
        }
    }

    pub fn batch_from_settings(settings: &MonitorSettings) -> Self {
        Self {
            interval: settings.batch_poll_interval(),
            auto_refresh: settings.auto_refresh,
        }
    }
}
