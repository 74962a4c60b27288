use chrono::{NaiveDateTime, Timelike, Utc};
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    Booking, BookingPatch, BookingRequest, BookingStatus, MultiSlotRequest, NewBooking,
    PaymentStatus, Resource, TimeInterval,
};
use crate::services::calendar::sync::{
    remove_event, upsert_event, Outcome, Party, SyncFailure, SyncTarget,
};
use crate::services::conflicts;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct SlotFailure {
    pub slot_id: i64,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MultiSlotReport {
    pub created: Vec<Booking>,
    pub failed: Vec<SlotFailure>,
    pub suppressed: Vec<SyncFailure>,
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{field} is required")))
}

fn validate(request: BookingRequest) -> Result<NewBooking, AppError> {
    let resource_id = request
        .resource_id
        .ok_or_else(|| AppError::Validation("resource_id is required".to_string()))?;

    let (Some(start), Some(end)) = (request.start_time, request.end_time) else {
        return Err(AppError::Validation(
            "start_time and end_time are required".to_string(),
        ));
    };
    // Stored at whole-second precision.
    if start.nanosecond() != 0 || end.nanosecond() != 0 {
        return Err(AppError::Validation(
            "start_time and end_time must be whole seconds".to_string(),
        ));
    }
    let interval = TimeInterval::new(start, end).ok_or_else(|| {
        AppError::Validation("start_time must be before end_time".to_string())
    })?;

    let customer_name = required(request.customer_name, "customer_name")?;
    let customer_email = required(request.customer_email, "customer_email")?;
    if !customer_email.contains('@') {
        return Err(AppError::Validation(format!(
            "customer_email is not an email address: {customer_email}"
        )));
    }

    let status = request.status.unwrap_or(BookingStatus::Pending);
    if status.is_terminal() {
        return Err(AppError::Validation(
            "status cannot be set to cancelled here, cancel the booking instead".to_string(),
        ));
    }

    if request.final_amount.is_some_and(|a| !a.is_finite() || a < 0.0) {
        return Err(AppError::Validation(
            "final_amount must be a non-negative number".to_string(),
        ));
    }

    Ok(NewBooking {
        resource_id,
        slot_id: request.slot_id,
        customer_id: request.customer_id,
        customer_name,
        customer_email,
        customer_phone: request.customer_phone.filter(|p| !p.trim().is_empty()),
        customer_zip: request.customer_zip.filter(|z| !z.trim().is_empty()),
        interval,
        status,
        payment_status: request.payment_status.unwrap_or(PaymentStatus::Pending),
        final_amount: request.final_amount,
    })
}

fn load_resource(conn: &Connection, resource_id: i64) -> Result<Resource, AppError> {
    queries::get_resource(conn, resource_id)?
        .ok_or_else(|| AppError::NotFound(format!("resource {resource_id}")))
}

fn load_booking(conn: &Connection, id: i64) -> Result<Booking, AppError> {
    queries::get_booking_by_id(conn, id)?.ok_or_else(|| AppError::NotFound(format!("booking {id}")))
}

fn resolve_customer_by_email(conn: &Connection, email: &str) -> anyhow::Result<Option<i64>> {
    Ok(queries::get_user_by_email(conn, email)?.map(|u| u.id))
}

fn actor_detail(actor: Option<i64>) -> Option<String> {
    actor.map(|id| format!("by user {id}"))
}

fn event_title(resource: &Resource, booking: &Booking) -> String {
    format!("{}: {}", resource.name, booking.customer_name)
}

// ── Create ──

fn commit_create(
    state: &AppState,
    mut new: NewBooking,
    actor: Option<i64>,
) -> Result<(Booking, Resource), AppError> {
    let mut conn = state.conn()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let resource = load_resource(&tx, new.resource_id)?;

    if new.customer_id.is_none() {
        new.customer_id = match actor {
            Some(id) => Some(id),
            None => resolve_customer_by_email(&tx, &new.customer_email)?,
        };
    }

    conflicts::ensure_available(&tx, new.resource_id, &new.interval, None)?;

    let id = queries::insert_booking(&tx, &new, &now())?;
    queries::record_booking_event(&tx, id, "created", actor_detail(actor).as_deref())?;
    let booking = load_booking(&tx, id)?;
    tx.commit()?;

    tracing::info!(
        booking_id = id,
        resource_id = new.resource_id,
        interval = %new.interval,
        "booking created"
    );
    Ok((booking, resource))
}

pub async fn create_booking(
    state: &AppState,
    request: BookingRequest,
    actor: Option<i64>,
) -> Result<Outcome<Booking>, AppError> {
    let new = validate(request)?;
    let (booking, resource) = commit_create(state, new, actor)?;
    Ok(sync_after_write(state, booking, &resource, None).await)
}

// ── Update ──

fn commit_update(
    state: &AppState,
    id: i64,
    mut new: NewBooking,
    actor: Option<i64>,
) -> Result<(Booking, Booking, Resource), AppError> {
    let mut conn = state.conn()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let previous = load_booking(&tx, id)?;
    if previous.status.is_terminal() {
        return Err(AppError::InvalidTransition(format!(
            "booking {id} is cancelled and can no longer change"
        )));
    }

    let resource = load_resource(&tx, new.resource_id)?;

    if new.customer_id.is_none() {
        new.customer_id = match previous.customer_id {
            Some(cid) => Some(cid),
            None => resolve_customer_by_email(&tx, &new.customer_email)?,
        };
    }

    conflicts::ensure_available(&tx, new.resource_id, &new.interval, Some(id))?;

    queries::update_booking(&tx, id, &new, &now())?;
    queries::record_booking_event(&tx, id, "updated", actor_detail(actor).as_deref())?;
    let booking = load_booking(&tx, id)?;
    tx.commit()?;

    tracing::info!(booking_id = id, interval = %new.interval, "booking updated");
    Ok((previous, booking, resource))
}

pub async fn update_booking(
    state: &AppState,
    id: i64,
    request: BookingRequest,
    actor: Option<i64>,
) -> Result<Outcome<Booking>, AppError> {
    let new = validate(request)?;
    let (previous, booking, resource) = commit_update(state, id, new, actor)?;

    let previous_provider = if previous.resource_id == booking.resource_id {
        Some(resource.provider_id)
    } else {
        let conn = state.conn()?;
        queries::get_resource(&conn, previous.resource_id)?.map(|r| r.provider_id)
    };

    Ok(sync_after_write(
        state,
        booking,
        &resource,
        Some(PreviousOwners {
            provider_id: previous_provider,
            customer_id: previous.customer_id,
        }),
    )
    .await)
}

pub fn patch_booking(
    state: &AppState,
    id: i64,
    patch: BookingPatch,
    actor: Option<i64>,
) -> Result<Booking, AppError> {
    if patch.status.is_some_and(|s| s.is_terminal()) {
        return Err(AppError::Validation(
            "status cannot be set to cancelled here, cancel the booking instead".to_string(),
        ));
    }
    if patch.final_amount.flatten().is_some_and(|a| !a.is_finite() || a < 0.0) {
        return Err(AppError::Validation(
            "final_amount must be a non-negative number".to_string(),
        ));
    }

    let mut conn = state.conn()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let existing = load_booking(&tx, id)?;
    if existing.status.is_terminal() {
        return Err(AppError::InvalidTransition(format!(
            "booking {id} is cancelled and can no longer change"
        )));
    }

    queries::patch_booking(&tx, id, &patch, &now())?;
    queries::record_booking_event(&tx, id, "patched", actor_detail(actor).as_deref())?;
    let booking = load_booking(&tx, id)?;
    tx.commit()?;

    tracing::info!(booking_id = id, status = booking.status.as_str(), "booking patched");
    Ok(booking)
}

// ── Cancel / Delete ──

// Runs inside the caller's transaction.
fn purge_payments(conn: &Connection, booking_id: i64) -> anyhow::Result<usize> {
    let payments = queries::find_payments_by_booking(conn, booking_id)?;
    for payment in &payments {
        queries::delete_payment(conn, payment.id)?;
    }
    Ok(payments.len())
}

fn commit_removal(
    state: &AppState,
    id: i64,
    hard_delete: bool,
    actor: Option<i64>,
) -> Result<(Booking, Option<Resource>), AppError> {
    let mut conn = state.conn()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let booking = load_booking(&tx, id)?;
    if !hard_delete && booking.status.is_terminal() {
        return Err(AppError::InvalidTransition(format!(
            "booking {id} is already cancelled"
        )));
    }

    let removed = purge_payments(&tx, id)?;
    let detail = match actor {
        Some(user) => format!("removed {removed} payment(s), by user {user}"),
        None => format!("removed {removed} payment(s)"),
    };

    let booking = if hard_delete {
        queries::delete_booking(&tx, id)?;
        queries::record_booking_event(&tx, id, "deleted", Some(&detail))?;
        booking
    } else {
        queries::update_booking_status(&tx, id, BookingStatus::Cancelled, &now())?;
        queries::record_booking_event(&tx, id, "cancelled", Some(&detail))?;
        load_booking(&tx, id)?
    };
    let resource = queries::get_resource(&tx, booking.resource_id)?;
    tx.commit()?;

    tracing::info!(
        booking_id = id,
        payments_removed = removed,
        hard_delete,
        "booking removed from schedule"
    );
    Ok((booking, resource))
}

async fn remove_calendar_events(
    state: &AppState,
    mut booking: Booking,
    resource: Option<&Resource>,
    hard_delete: bool,
) -> Outcome<Booking> {
    let mut suppressed = Vec::new();

    let targets = [
        SyncTarget {
            party: Party::Provider,
            owner_id: resource.map(|r| r.provider_id),
            event_id: booking.provider_event_id.clone(),
        },
        SyncTarget {
            party: Party::Customer,
            owner_id: booking.customer_id,
            event_id: booking.customer_event_id.clone(),
        },
    ];

    for target in &targets {
        match remove_event(state, booking.id, target).await {
            Ok(true) if !hard_delete => {
                store_event_id(state, booking.id, target.party, None);
                match target.party {
                    Party::Provider => booking.provider_event_id = None,
                    Party::Customer => booking.customer_event_id = None,
                }
            }
            Ok(_) => {}
            Err(failure) => suppressed.push(failure),
        }
    }

    Outcome {
        value: booking,
        suppressed,
    }
}

// Soft cancel: the row stays with status = cancelled and no longer blocks.
pub async fn cancel_booking(
    state: &AppState,
    id: i64,
    actor: Option<i64>,
) -> Result<Outcome<Booking>, AppError> {
    let (booking, resource) = commit_removal(state, id, false, actor)?;
    Ok(remove_calendar_events(state, booking, resource.as_ref(), false).await)
}

pub async fn delete_booking(
    state: &AppState,
    id: i64,
    actor: Option<i64>,
) -> Result<Outcome<Booking>, AppError> {
    let (booking, resource) = commit_removal(state, id, true, actor)?;
    Ok(remove_calendar_events(state, booking, resource.as_ref(), true).await)
}

// ── Multi-slot ──

// Each slot is its own transaction; a failing slot never undoes the others.
pub async fn multi_slot_create(
    state: &AppState,
    request: MultiSlotRequest,
    actor: Option<i64>,
) -> Result<MultiSlotReport, AppError> {
    let resource_id = request
        .resource_id
        .ok_or_else(|| AppError::Validation("resource_id is required".to_string()))?;
    if request.slot_ids.is_empty() {
        return Err(AppError::Validation("slot_ids must not be empty".to_string()));
    }

    let mut report = MultiSlotReport::default();

    for &slot_id in &request.slot_ids {
        let slot = {
            let conn = state.conn()?;
            queries::get_slot(&conn, slot_id)?
        };

        let result = match slot {
            Some(slot) if slot.resource_id == resource_id => {
                let single = BookingRequest {
                    resource_id: Some(resource_id),
                    slot_id: Some(slot_id),
                    customer_id: request.customer_id,
                    customer_name: request.customer_name.clone(),
                    customer_email: request.customer_email.clone(),
                    customer_phone: request.customer_phone.clone(),
                    customer_zip: request.customer_zip.clone(),
                    start_time: Some(slot.start_time()),
                    end_time: Some(slot.end_time()),
                    status: request.status,
                    payment_status: request.payment_status,
                    final_amount: request.final_amount,
                };
                create_booking(state, single, actor).await
            }
            _ => Err(AppError::NotFound(format!(
                "slot {slot_id} for resource {resource_id}"
            ))),
        };

        match result {
            Ok(outcome) => {
                report.created.push(outcome.value);
                report.suppressed.extend(outcome.suppressed);
            }
            Err(e) => {
                tracing::warn!(slot_id, resource_id, error = %e, "slot booking failed");
                report.failed.push(SlotFailure {
                    slot_id,
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}

// ── Queries ──

pub fn get_booking(state: &AppState, id: i64) -> Result<Booking, AppError> {
    let conn = state.conn()?;
    load_booking(&conn, id)
}

pub fn bookings_by_resource(state: &AppState, resource_id: i64) -> Result<Vec<Booking>, AppError> {
    let conn = state.conn()?;
    load_resource(&conn, resource_id)?;
    Ok(queries::get_bookings_by_resource(&conn, resource_id)?)
}

pub fn bookings_by_customer(state: &AppState, customer_id: i64) -> Result<Vec<Booking>, AppError> {
    let conn = state.conn()?;
    Ok(queries::get_bookings_by_customer(&conn, customer_id)?)
}

pub fn bookings_by_provider(state: &AppState, provider_id: i64) -> Result<Vec<Booking>, AppError> {
    let conn = state.conn()?;
    Ok(queries::get_bookings_by_provider(&conn, provider_id)?)
}

// ── Calendar sync ──

struct PreviousOwners {
    provider_id: Option<i64>,
    customer_id: Option<i64>,
}

fn store_event_id(state: &AppState, booking_id: i64, party: Party, event_id: Option<&str>) {
    let result = state.conn().and_then(|conn| match party {
        Party::Provider => queries::set_provider_event_id(&conn, booking_id, event_id),
        Party::Customer => queries::set_customer_event_id(&conn, booking_id, event_id),
    });
    if let Err(e) = result {
        tracing::error!(booking_id, party = party.as_str(), error = %e, "failed to record calendar event id");
    }
}

async fn sync_after_write(
    state: &AppState,
    mut booking: Booking,
    resource: &Resource,
    previous: Option<PreviousOwners>,
) -> Outcome<Booking> {
    let mut suppressed = Vec::new();
    let title = event_title(resource, &booking);
    let interval = booking.interval();

    let parties = [
        (
            Party::Provider,
            Some(resource.provider_id),
            previous.as_ref().and_then(|p| p.provider_id),
            booking.provider_event_id.clone(),
        ),
        (
            Party::Customer,
            booking.customer_id,
            previous.as_ref().and_then(|p| p.customer_id),
            booking.customer_event_id.clone(),
        ),
    ];

    for (party, owner_id, previous_owner, mut event_id) in parties {
        if event_id.is_some() && previous_owner != owner_id {
            let stale = SyncTarget {
                party,
                owner_id: previous_owner,
                event_id: event_id.take(),
            };
            if let Err(failure) = remove_event(state, booking.id, &stale).await {
                suppressed.push(failure);
            }
        }

        let target = SyncTarget {
            party,
            owner_id,
            event_id,
        };
        let stored = match upsert_event(state, booking.id, &target, &title, &interval).await {
            Ok(stored) => stored,
            Err(failure) => {
                suppressed.push(failure);
                target.event_id.clone()
            }
        };

        let current = match party {
            Party::Provider => &mut booking.provider_event_id,
            Party::Customer => &mut booking.customer_event_id,
        };
        if *current != stored {
            store_event_id(state, booking.id, party, stored.as_deref());
            *current = stored;
        }
    }

    Outcome {
        value: booking,
        suppressed,
    }
}
