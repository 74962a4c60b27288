use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, NaiveDateTime, Utc};
use serde::Serialize;
use tokio::time::MissedTickBehavior;

use crate::config::AppConfig;
use crate::db::queries;
use crate::models::{Booking, TimeInterval};
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchFailure {
    pub booking_id: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReminderReport {
    pub sent: Vec<i64>,
    pub skipped: Vec<i64>,
    pub failures: Vec<DispatchFailure>,
}

// [now + lead - tolerance, now + lead + tolerance)
pub fn reminder_window(config: &AppConfig, now: NaiveDateTime) -> anyhow::Result<TimeInterval> {
    let hours = |h: i64| {
        Duration::try_hours(h).with_context(|| format!("reminder offset of {h}h is out of range"))
    };
    let lead = hours(config.reminder_lead_hours)?;
    let tolerance = hours(config.reminder_tolerance_hours)?;

    let shift = |offset: Duration| {
        now.checked_add_signed(lead)
            .and_then(|t| t.checked_add_signed(offset))
            .context("reminder window is out of range")
    };
    let start = shift(-tolerance)?;
    let end = shift(tolerance)?;
    TimeInterval::new(start, end).with_context(|| {
        format!(
            "empty reminder window (tolerance {}h)",
            config.reminder_tolerance_hours
        )
    })
}

fn reminder_message(booking: &Booking, resource_name: &str) -> (String, String) {
    let subject = "Reminder: your appointment is tomorrow".to_string();
    let body = format!(
        "Hi {},\n\nThis is a reminder that your booking #{} for {} starts at {}.\n\nWe look forward to seeing you!",
        booking.customer_name,
        booking.id,
        resource_name,
        booking.start_time.format("%b %d, %Y %I:%M %p"),
    );
    (subject, body)
}

// A failed send leaves the booking unmarked so a later tick retries it.
pub async fn run_reminder_tick(
    state: &AppState,
    now: NaiveDateTime,
) -> anyhow::Result<ReminderReport> {
    let window = reminder_window(&state.config, now)?;

    let due: Vec<(Booking, String)> = {
        let conn = state.conn()?;
        let candidates = queries::find_reminder_candidates(&conn, &window)?;
        let mut due = Vec::with_capacity(candidates.len());
        for booking in candidates {
            let resource_name = match queries::get_resource(&conn, booking.resource_id)? {
                Some(resource) => match queries::get_user(&conn, resource.provider_id)? {
                    Some(provider) => format!("{} with {}", resource.name, provider.display_name()),
                    None => resource.name,
                },
                None => "your service".to_string(),
            };
            due.push((booking, resource_name));
        }
        due
    };

    let mut report = ReminderReport::default();
    if due.is_empty() {
        tracing::debug!(window = %window, "no bookings due for reminders");
        return Ok(report);
    }
    tracing::info!(window = %window, count = due.len(), "dispatching booking reminders");

    for (booking, resource_name) in due {
        let email = booking.customer_email.trim();
        if email.is_empty() {
            tracing::warn!(booking_id = booking.id, "no customer email, skipping reminder");
            report.skipped.push(booking.id);
            continue;
        }

        let (subject, body) = reminder_message(&booking, &resource_name);
        if let Err(e) = state.notifier.send(email, &subject, &body).await {
            tracing::warn!(booking_id = booking.id, error = %e, "failed to send reminder");
            report.failures.push(DispatchFailure {
                booking_id: booking.id,
                reason: format!("{e:#}"),
            });
            continue;
        }

        if let Err(e) = record_reminded(state, booking.id, &now) {
            tracing::error!(booking_id = booking.id, error = %e, "reminder sent but marker not stored");
        }
        report.sent.push(booking.id);
    }

    tracing::info!(
        sent = report.sent.len(),
        skipped = report.skipped.len(),
        failed = report.failures.len(),
        "reminder tick finished"
    );
    Ok(report)
}

fn record_reminded(state: &AppState, booking_id: i64, at: &NaiveDateTime) -> anyhow::Result<()> {
    let conn = state.conn()?;
    if queries::mark_reminded(&conn, booking_id, at)? {
        queries::record_booking_event(&conn, booking_id, "reminded", None)?;
    }
    Ok(())
}

pub async fn run_reminder_scheduler(state: Arc<AppState>) {
    let tick = state.config.reminder_tick.max(std::time::Duration::from_secs(1));
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let now = Utc::now().naive_utc();
        if let Err(e) = run_reminder_tick(&state, now).await {
            tracing::error!(error = %e, "reminder tick failed");
        }
    }
}
