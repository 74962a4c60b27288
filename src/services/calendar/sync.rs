use std::future::Future;

use serde::Serialize;

use crate::models::TimeInterval;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    Provider,
    Customer,
}

impl Party {
    pub fn as_str(&self) -> &'static str {
        match self {
            Party::Provider => "provider",
            Party::Customer => "customer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Connect,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncFailure {
    pub booking_id: i64,
    pub party: Party,
    pub action: SyncAction,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    pub value: T,
    pub suppressed: Vec<SyncFailure>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncTarget {
    pub party: Party,
    pub owner_id: Option<i64>,
    pub event_id: Option<String>,
}

async fn bounded<T>(
    state: &AppState,
    call: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    let limit = state.config.calendar_timeout;
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| anyhow::anyhow!("calendar call timed out after {limit:?}"))?
}

fn failure(booking_id: i64, party: Party, action: SyncAction, err: anyhow::Error) -> SyncFailure {
    tracing::warn!(
        booking_id,
        party = party.as_str(),
        action = ?action,
        error = %err,
        "calendar sync failed"
    );
    SyncFailure {
        booking_id,
        party,
        action,
        reason: format!("{err:#}"),
    }
}

async fn connected(
    state: &AppState,
    booking_id: i64,
    party: Party,
    owner_id: i64,
) -> Result<bool, SyncFailure> {
    bounded(state, state.calendar.is_connected(owner_id))
        .await
        .map_err(|e| failure(booking_id, party, SyncAction::Connect, e))
}

pub async fn upsert_event(
    state: &AppState,
    booking_id: i64,
    target: &SyncTarget,
    title: &str,
    interval: &TimeInterval,
) -> Result<Option<String>, SyncFailure> {
    let Some(owner_id) = target.owner_id else {
        return Ok(target.event_id.clone());
    };

    if !connected(state, booking_id, target.party, owner_id).await? {
        tracing::debug!(booking_id, party = target.party.as_str(), "calendar not connected, skipping");
        return Ok(target.event_id.clone());
    }

    match &target.event_id {
        Some(event_id) => {
            bounded(
                state,
                state
                    .calendar
                    .update_event(owner_id, event_id, title, interval.start(), interval.end()),
            )
            .await
            .map_err(|e| failure(booking_id, target.party, SyncAction::Update, e))?;
            Ok(Some(event_id.clone()))
        }
        None => {
            let event_id = bounded(
                state,
                state
                    .calendar
                    .create_event(owner_id, title, interval.start(), interval.end()),
            )
            .await
            .map_err(|e| failure(booking_id, target.party, SyncAction::Create, e))?;
            tracing::info!(booking_id, party = target.party.as_str(), %event_id, "calendar event created");
            Ok(Some(event_id))
        }
    }
}

// Ok(true) only when the remote event was actually deleted. A disconnected
// owner leaves the event in place.
pub async fn remove_event(
    state: &AppState,
    booking_id: i64,
    target: &SyncTarget,
) -> Result<bool, SyncFailure> {
    let (Some(owner_id), Some(event_id)) = (target.owner_id, target.event_id.as_deref()) else {
        return Ok(false);
    };

    if !connected(state, booking_id, target.party, owner_id).await? {
        tracing::debug!(booking_id, party = target.party.as_str(), event_id, "calendar not connected, event left in place");
        return Ok(false);
    }

    bounded(state, state.calendar.delete_event(owner_id, event_id))
        .await
        .map_err(|e| failure(booking_id, target.party, SyncAction::Delete, e))?;
    tracing::info!(booking_id, party = target.party.as_str(), event_id, "calendar event deleted");
    Ok(true)
}
