// Test fixtures - reusable test data
// Scripted booking API and recording notifier shared by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futsal_booking_monitor::models::booking::{Booking, BookingId, BookingStatus};
use futsal_booking_monitor::services::api::{ApiError, BookingApi};
use futsal_booking_monitor::services::notification::Notifier;

/// Sample bookings for testing
pub mod bookings {
    use super::*;

    /// Evening session on 10 June 2025, 10:00-11:00
    pub fn session(id: &str, status: BookingStatus) -> Booking {
        let mut booking = Booking::new(id, status, "2025-06-10", "10:00", "11:00");
        booking.field_name = Some("Lapangan A".to_string());
        booking
    }

    pub fn confirmed(id: &str) -> Booking {
        session(id, BookingStatus::Confirmed)
    }

    pub fn completed(id: &str) -> Booking {
        session(id, BookingStatus::Completed)
    }
}

/// Booking API that replays a per-id script of responses. The last
/// response of a script repeats once the script runs out.
#[derive(Default)]
pub struct ScriptedApi {
    scripts: Mutex<HashMap<BookingId, VecDeque<Result<Booking, ApiError>>>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
    panic_once: Mutex<HashSet<BookingId>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn script(self, id: &str, responses: Vec<Result<Booking, ApiError>>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(BookingId::from(id), responses.into());
        self
    }

    /// Make the next fetch of `id` panic instead of answering.
    pub fn panic_once(self, id: &str) -> Self {
        self.panic_once.lock().unwrap().insert(BookingId::from(id));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_response(&self, id: &BookingId) -> Result<Booking, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut scripts = self.scripts.lock().unwrap();
        let Some(script) = scripts.get_mut(id) else {
            return Err(ApiError::Rejected(format!("Booking {} not found", id)));
        };

        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script
                .front()
                .cloned()
                .unwrap_or_else(|| Err(ApiError::Rejected("empty script".to_string())))
        }
    }
}

impl BookingApi for ScriptedApi {
    async fn fetch_booking(&self, id: &BookingId) -> Result<Booking, ApiError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let should_panic = self.panic_once.lock().unwrap().remove(id);
        if should_panic {
            panic!("scripted fetch of booking {} blew up", id);
        }
        self.next_response(id)
    }
}

/// Notifier that records which bookings it was asked to announce.
#[derive(Default)]
pub struct RecordingNotifier {
    announced: Mutex<Vec<BookingId>>,
}

impl RecordingNotifier {
    pub fn announced(&self) -> Vec<BookingId> {
        self.announced.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify_auto_completed(&self, booking: &Booking) -> anyhow::Result<()> {
        self.announced.lock().unwrap().push(booking.id.clone());
        Ok(())
    }
}
