use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::models::booking::{Booking, BookingId};
use crate::models::settings::MonitorSettings;

/// Why a single booking fetch failed. Monitors keep the message on their
/// state and retry on the next tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("backend returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("backend rejected request: {0}")]
    Rejected(String),
    #[error("invalid response body: {0}")]
    Decode(String),
    /// The fetch task panicked or was cancelled before producing a response
    #[error("fetch task failed: {0}")]
    Task(String),
}

/// Envelope every backend endpoint wraps its payload in.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    fn failure_message(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "request was not successful".to_string())
    }

    pub fn into_result(self) -> Result<T, ApiError> {
        if !self.success {
            return Err(ApiError::Rejected(self.failure_message()));
        }

        self.data
            .ok_or_else(|| ApiError::Decode("successful response without data".to_string()))
    }
}

/// Source of booking snapshots for the monitors.
pub trait BookingApi: Send + Sync {
    fn fetch_booking(
        &self,
        id: &BookingId,
    ) -> impl Future<Output = Result<Booking, ApiError>> + Send;
}

/// Turn a raw HTTP status and body into a booking or a fetch failure.
pub fn decode_booking_response(status: u16, body: &str) -> Result<Booking, ApiError> {
    let envelope = serde_json::from_str::<ApiResponse<Booking>>(body);

    if !(200..300).contains(&status) {
        let message = match envelope {
            Ok(envelope) => envelope.failure_message(),
            Err(_) => "no error details".to_string(),
        };
        return Err(ApiError::Status { status, message });
    }

    envelope
        .map_err(|err| ApiError::Decode(err.to_string()))?
        .into_result()
}

/// Booking API over HTTP.
pub struct HttpBookingApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBookingApi {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build booking API HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            token: token.filter(|token| !token.trim().is_empty()),
        })
    }

    pub fn from_settings(settings: &MonitorSettings) -> Result<Self> {
        Self::new(
            &settings.api_base_url,
            settings.api_token.clone(),
            settings.request_timeout(),
        )
    }

    pub fn booking_url(&self, id: &BookingId) -> String {
        format!(
            "{}/bookings/{}",
            self.base_url,
            urlencoding::encode(id.as_str())
        )
    }
}

impl BookingApi for HttpBookingApi {
    async fn fetch_booking(&self, id: &BookingId) -> Result<Booking, ApiError> {
        let url = self.booking_url(id);
        log::debug!("Fetching booking {} from {}", id, url);

        let mut request = self.client.get(&url).header(ACCEPT, "application/json");
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|err| ApiError::Network(err.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| ApiError::Network(err.to_string()))?;

        decode_booking_response(status, &body)
    }
}
