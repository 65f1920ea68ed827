//! Poll telemetry.
//!
//! Counters for fetch volume, failures, latency and notifications. One
//! `PollTelemetry` is constructed by whoever owns the monitors and shared
//! through an `Arc`; tests build their own isolated instance.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub fetches: u64,
    pub failures: u64,
    pub notifications: u64,
    /// Responses that arrived after their watch was torn down or replaced
    pub discarded: u64,
    pub last_latency: Option<Duration>,
    pub total_latency: Duration,
}

impl TelemetrySnapshot {
    pub fn mean_latency(&self) -> Option<Duration> {
        if self.fetches == 0 {
            return None;
        }
        let fetches = u32::try_from(self.fetches).unwrap_or(u32::MAX);
        Some(self.total_latency / fetches)
    }

    pub fn failure_rate(&self) -> f64 {
        if self.fetches == 0 {
            return 0.0;
        }
        self.failures as f64 / self.fetches as f64
    }
}

#[derive(Debug, Default)]
pub struct PollTelemetry {
    counters: Mutex<TelemetrySnapshot>,
}

impl PollTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self) -> MutexGuard<'_, TelemetrySnapshot> {
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record_fetch(&self, latency: Duration, succeeded: bool) {
        let mut counters = self.counters();
        counters.fetches += 1;
        if !succeeded {
            counters.failures += 1;
        }
        counters.last_latency = Some(latency);
        counters.total_latency = counters.total_latency.saturating_add(latency);
    }

    pub fn record_notification(&self) {
        self.counters().notifications += 1;
    }

    pub fn record_discarded(&self) {
        self.counters().discarded += 1;
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        *self.counters()
    }

    /// Clears all counters, e.g. when the owning view is torn down.
    pub fn reset(&self) {
        *self.counters() = TelemetrySnapshot::default();
    }

    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        log::info!(
            "Poll telemetry: {} fetches, {} failed ({:.0}%), {} notifications, {} discarded, mean latency {:?}",
            snapshot.fetches,
            snapshot.failures,
            snapshot.failure_rate() * 100.0,
            snapshot.notifications,
            snapshot.discarded,
            snapshot.mean_latency()
        );
    }
}
