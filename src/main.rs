// Futsal Booking Monitor
// Command-line watcher entry point

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local, TimeZone, Utc};

use futsal_booking_monitor::models::booking::{Booking, BookingId};
use futsal_booking_monitor::models::settings::{MonitorSettings, VenueTimezone};
use futsal_booking_monitor::services::api::HttpBookingApi;
use futsal_booking_monitor::services::eligibility::{classify, countdown, AutoCompletionCountdown};
use futsal_booking_monitor::services::monitor::{
    BatchMonitor, BatchState, BookingMonitor, MonitorContext, MonitorState, WatchOptions,
};
use futsal_booking_monitor::services::notification::{NotificationService, Notifier, SilentNotifier};
use futsal_booking_monitor::services::settings::SettingsService;
use futsal_booking_monitor::services::telemetry::PollTelemetry;

const USAGE: &str = "Usage: booking-monitor [--config <path>] [--interval-ms <n>] <booking-id>...";

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    config: Option<PathBuf>,
    interval_ms: Option<u64>,
    booking_ids: Vec<BookingId>,
    help: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs> {
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => parsed.help = true,
            "-c" | "--config" => {
                let path = args.next().context("--config needs a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "-i" | "--interval-ms" => {
                let raw = args.next().context("--interval-ms needs a value")?;
                let interval = raw
                    .parse::<u64>()
                    .with_context(|| format!("Invalid interval '{}'", raw))?;
                if interval == 0 {
                    bail!("--interval-ms must be greater than 0");
                }
                parsed.interval_ms = Some(interval);
            }
            flag if flag.starts_with('-') => bail!("Unknown option '{}'\n{}", flag, USAGE),
            id => parsed.booking_ids.push(BookingId::from(id)),
        }
    }

    Ok(parsed)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = parse_args(env::args().skip(1))?;
    if args.help {
        println!("{}", USAGE);
        return Ok(());
    }
    if args.booking_ids.is_empty() {
        bail!("No booking ids given\n{}", USAGE);
    }

    let settings_service = match &args.config {
        Some(path) => SettingsService::new(path),
        None => SettingsService::with_default_path()?,
    };
    let settings = settings_service.load()?;
    log::info!(
        "Starting futsal booking monitor against {} (settings: {})",
        settings.api_base_url,
        settings_service.path().display()
    );

    let api = Arc::new(HttpBookingApi::from_settings(&settings)?);
    let telemetry = Arc::new(PollTelemetry::new());

    if settings.notifications_enabled {
        let context = MonitorContext::new(api, Arc::new(NotificationService::new()), telemetry);
        run(&args, &settings, context).await?;
    } else {
        let context = MonitorContext::new(api, Arc::new(SilentNotifier), telemetry);
        run(&args, &settings, context).await?;
    }

    Ok(())
}

async fn run<N>(
    args: &CliArgs,
    settings: &MonitorSettings,
    context: MonitorContext<HttpBookingApi, N>,
) -> Result<()>
where
    N: Notifier + 'static,
{
    let venue = settings.venue_timezone().map_err(|e| anyhow!(e))?;
    let telemetry = Arc::clone(&context.telemetry);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    if let [booking_id] = args.booking_ids.as_slice() {
        let mut options = WatchOptions::from_settings(settings);
        if let Some(interval_ms) = args.interval_ms {
            options.interval = Duration::from_millis(interval_ms);
        }

        let monitor = BookingMonitor::start(booking_id.clone(), context, options);
        let mut updates = monitor.subscribe();

        loop {
            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = updates.borrow_and_update().clone();
                    report_state(booking_id, &state, venue);
                }
                _ = &mut shutdown => break,
            }
        }

        monitor.stop().await;
    } else {
        let mut options = WatchOptions::batch_from_settings(settings);
        if let Some(interval_ms) = args.interval_ms {
            options.interval = Duration::from_millis(interval_ms);
        }

        let monitor = BatchMonitor::start(args.booking_ids.iter().cloned(), context, options);
        let mut updates = monitor.subscribe();

        loop {
            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = updates.borrow_and_update().clone();
                    for (booking_id, entry) in settled_entries(&state) {
                        report_state(booking_id, entry, venue);
                    }
                }
                _ = &mut shutdown => break,
            }
        }

        monitor.stop().await;
    }

    telemetry.log_summary();
    Ok(())
}

/// Entries whose fetches have settled. A loading id never hides the others.
fn settled_entries(state: &BatchState) -> impl Iterator<Item = (&BookingId, &MonitorState)> {
    state.entries.iter().filter(|(_, entry)| !entry.is_loading())
}

fn report_state(booking_id: &BookingId, state: &MonitorState, venue: VenueTimezone) {
    if state.is_loading() {
        return;
    }

    if let Some(error) = &state.error {
        log::warn!("booking {}: last fetch failed: {}", booking_id, error);
    }

    if let Some(booking) = &state.booking {
        log::info!("{}", describe(booking, venue));
    }
}

fn describe(booking: &Booking, venue: VenueTimezone) -> String {
    match venue {
        VenueTimezone::Local => describe_at(booking, &Local::now()),
        VenueTimezone::Named(tz) => describe_at(booking, &Utc::now().with_timezone(&tz)),
    }
}

fn describe_at<Tz: TimeZone>(booking: &Booking, now: &DateTime<Tz>) -> String {
    let badge = classify(booking, now);
    let mut parts = vec![format!("booking {} [{}]", booking.id, badge.label)];

    if badge.is_near_completion {
        parts.push("near completion".to_string());
    }
    if badge.is_past_end {
        parts.push("past end time".to_string());
    }

    let remaining = countdown(booking, now);
    if remaining != AutoCompletionCountdown::NotApplicable {
        parts.push(remaining.to_string());
    }

    if let Some(kind) = badge.completion_kind {
        parts.push(format!("completion: {:?}", kind).to_lowercase());
    }

    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use futsal_booking_monitor::models::booking::BookingStatus;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn test_parse_args_ids_and_flags() {
        let parsed = parse_args(args(&["--config", "/tmp/c.toml", "-i", "5000", "12", "13"])).unwrap();
        assert_eq!(parsed.config, Some(PathBuf::from("/tmp/c.toml")));
        assert_eq!(parsed.interval_ms, Some(5000));
        assert_eq!(parsed.booking_ids, vec![BookingId::from("12"), BookingId::from("13")]);
    }

    #[test]
    fn test_parse_args_rejects_bad_input() {
        assert!(parse_args(args(&["--interval-ms", "fast"])).is_err());
        assert!(parse_args(args(&["--interval-ms", "0"])).is_err());
        assert!(parse_args(args(&["--config"])).is_err());
        assert!(parse_args(args(&["--verbose"])).is_err());
    }

    #[test]
    fn test_settled_entries_skip_only_loading_ids() {
        let mut state = BatchState::default();
        state.entries.insert(
            BookingId::from("1"),
            MonitorState {
                in_flight: 1,
                ..MonitorState::default()
            },
        );
        state.entries.insert(
            BookingId::from("2"),
            MonitorState {
                booking: Some(Booking::new("2", BookingStatus::Confirmed, "2025-06-10", "10:00", "11:00")),
                ..MonitorState::default()
            },
        );

        let settled: Vec<_> = settled_entries(&state).map(|(id, _)| id.clone()).collect();
        assert_eq!(settled, vec![BookingId::from("2")]);
    }

    #[test]
    fn test_describe_confirmed_past_end() {
        let booking = Booking::new("9", BookingStatus::Confirmed, "2025-06-10", "10:00", "11:00");
        let now = Utc.with_ymd_and_hms(2025, 6, 10, 11, 10, 0).unwrap();
        assert_eq!(
            describe_at(&booking, &now),
            "booking 9 [confirmed], past end time, auto-completes in 5m"
        );
    }

    #[test]
    fn test_describe_completed_manually() {
        let booking = Booking::new("9", BookingStatus::Completed, "2025-06-10", "10:00", "11:00")
            .with_completed_by("staff-1");
        let now = Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap();
        assert_eq!(describe_at(&booking, &now), "booking 9 [completed], completion: manual");
    }
}
