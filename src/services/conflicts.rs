use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{ConflictingBooking, TimeInterval};

pub fn find_conflicts(
    conn: &Connection,
    resource_id: i64,
    interval: &TimeInterval,
    exclude_id: Option<i64>,
) -> anyhow::Result<Vec<ConflictingBooking>> {
    let overlapping = queries::find_overlapping_bookings(conn, resource_id, interval, exclude_id)?;

    Ok(overlapping
        .into_iter()
        .map(|b| ConflictingBooking {
            booking_id: b.id,
            customer_name: b.customer_name.clone(),
            interval: b.interval(),
        })
        .collect())
}

pub fn has_overlap(
    conn: &Connection,
    resource_id: i64,
    interval: &TimeInterval,
    exclude_id: Option<i64>,
) -> anyhow::Result<bool> {
    Ok(!find_conflicts(conn, resource_id, interval, exclude_id)?.is_empty())
}

// Must run inside the same transaction as the write that follows it.
pub fn ensure_available(
    conn: &Connection,
    resource_id: i64,
    interval: &TimeInterval,
    exclude_id: Option<i64>,
) -> Result<(), AppError> {
    let conflicts = find_conflicts(conn, resource_id, interval, exclude_id)?;
    if conflicts.is_empty() {
        return Ok(());
    }

    tracing::info!(
        resource_id,
        requested = %interval,
        conflicts = conflicts.len(),
        "booking request rejected by conflict check"
    );
    Err(AppError::SchedulingConflict(conflicts))
}
