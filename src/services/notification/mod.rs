use anyhow::Result;
use notify_rust::{Notification, Timeout};

use crate::models::booking::Booking;

/// Capability the monitors use to announce an auto-completion.
///
/// Implementations may fail; callers log the error and carry on, so a host
/// without a notification daemon simply gets no popups.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn notify_auto_completed(&self, booking: &Booking) -> Result<()>;
}

/// Service for displaying desktop notifications
pub struct NotificationService {
    enabled: bool,
    timeout_ms: u32,
}

impl NotificationService {
    pub fn new() -> Self {
        Self {
            enabled: true,
            timeout_ms: 8000,
        }
    }

    /// Check if notifications are enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable notifications
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Summary and body text for an auto-completed booking
    pub fn auto_completed_message(booking: &Booking) -> (String, String) {
        let summary = "Booking completed".to_string();

        let venue = booking
            .field_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .map(|name| format!(" on {}", name))
            .unwrap_or_default();

        let body = format!(
            "Booking #{}{} ({} {}-{}) was completed automatically.",
            booking.id,
            venue,
            booking.date,
            booking.start_time,
            booking.end_time
        );

        (summary, body)
    }

    /// Show a simple notification with a title and body
    pub fn show_simple(&self, title: &str, body: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        Notification::new()
            .summary(title)
            .body(body)
            .timeout(Timeout::Milliseconds(self.timeout_ms))
            .show()
            .map_err(|e| anyhow::anyhow!("Failed to show notification: {}", e))?;

        Ok(())
    }
}

impl Default for NotificationService {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for NotificationService {
    fn notify_auto_completed(&self, booking: &Booking) -> Result<()> {
        let (summary, body) = Self::auto_completed_message(booking);
        self.show_simple(&summary, &body)
    }
}

/// Notifier that drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn notify_auto_completed(&self, booking: &Booking) -> Result<()> {
        log::debug!("Notification suppressed for booking {}", booking.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booking::BookingStatus;

    #[test]
    fn test_message_includes_field_and_time() {
        let mut booking =
            Booking::new("88", BookingStatus::Completed, "2025-06-10", "10:00", "11:00");
        booking.field_name = Some("Court 2".to_string());

        let (summary, body) = NotificationService::auto_completed_message(&booking);
        assert_eq!(summary, "Booking completed");
        assert_eq!(
            body,
            "Booking #88 on Court 2 (2025-06-10 10:00-11:00) was completed automatically."
        );
    }

    #[test]
    fn test_message_without_field_name() {
        let booking = Booking::new("5", BookingStatus::Completed, "2025-06-10", "20:00", "21:00");
        let (_, body) = NotificationService::auto_completed_message(&booking);
        assert!(body.starts_with("Booking #5 (2025-06-10"));
    }

    #[test]
    fn test_disabled_service_is_noop() {
        let mut service = NotificationService::new();
        service.set_enabled(false);
        assert!(!service.is_enabled());

        let booking = Booking::new("5", BookingStatus::Completed, "2025-06-10", "20:00", "21:00");
        assert!(service.notify_auto_completed(&booking).is_ok());
    }
}
