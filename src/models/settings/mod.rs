// Settings module
// Monitor configuration persisted as TOML

use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_BATCH_POLL_INTERVAL_MS: u64 = 2 * DEFAULT_POLL_INTERVAL_MS;
pub const LOCAL_TIMEZONE: &str = "local";

/// Time zone the backend's date and time-of-day strings are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VenueTimezone {
    /// Whatever the host machine is set to
    Local,
    Named(Tz),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub api_base_url: String,
    /// Opaque bearer credential passed through to every API call
    pub api_token: Option<String>,
    pub request_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub batch_poll_interval_ms: u64,
    pub auto_refresh: bool,
    pub notifications_enabled: bool,
    /// IANA zone name, or "local"
    pub timezone: String,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api".to_string(),
            api_token: None,
            request_timeout_secs: 15,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            batch_poll_interval_ms: DEFAULT_BATCH_POLL_INTERVAL_MS,
            auto_refresh: true,
            notifications_enabled: true,
            timezone: LOCAL_TIMEZONE.to_string(),
        }
    }
}

impl MonitorSettings {
    pub fn validate(&self) -> Result<(), String> {
        let base_url = self.api_base_url.trim();
        if base_url.is_empty() {
            return Err("API base URL cannot be empty".to_string());
        }

        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err("API base URL must start with http:// or https://".to_string());
        }

        if self.request_timeout_secs == 0 {
            return Err("Request timeout must be greater than 0 seconds".to_string());
        }

        if self.poll_interval_ms == 0 || self.batch_poll_interval_ms == 0 {
            return Err("Poll intervals must be greater than 0 ms".to_string());
        }

        self.venue_timezone()?;

        Ok(())
    }

    pub fn venue_timezone(&self) -> Result<VenueTimezone, String> {
        let name = self.timezone.trim();
        if name.is_empty() || name.eq_ignore_ascii_case(LOCAL_TIMEZONE) {
            return Ok(VenueTimezone::Local);
        }

        name.parse::<Tz>()
            .map(VenueTimezone::Named)
            .map_err(|_| format!("Unknown time zone '{}'", name))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn batch_poll_interval(&self) -> Duration {
        Duration::from_millis(self.batch_poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
