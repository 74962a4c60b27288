use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use crate::errors::AppError;
use crate::models::{Booking, BookingPatch, BookingRequest, MultiSlotRequest};
use crate::services::bookings::{self as lifecycle, MultiSlotReport};
use crate::services::calendar::sync::Outcome;
use crate::state::AppState;

fn actor(headers: &HeaderMap) -> Result<Option<i64>, AppError> {
    let Some(raw) = headers.get("x-user-id") else {
        return Ok(None);
    };
    raw.to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .map(Some)
        .ok_or_else(|| AppError::Validation("X-User-Id must be a numeric user id".to_string()))
}

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<BookingRequest>,
) -> Result<(StatusCode, Json<Outcome<Booking>>), AppError> {
    let outcome = lifecycle::create_booking(&state, request, actor(&headers)?).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

// POST /api/bookings/multi
pub async fn multi_slot_create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<MultiSlotRequest>,
) -> Result<Json<MultiSlotReport>, AppError> {
    let report = lifecycle::multi_slot_create(&state, request, actor(&headers)?).await?;
    Ok(Json(report))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(lifecycle::get_booking(&state, id)?))
}

// PUT /api/bookings/:id
pub async fn update_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(request): Json<BookingRequest>,
) -> Result<Json<Outcome<Booking>>, AppError> {
    let outcome = lifecycle::update_booking(&state, id, request, actor(&headers)?).await?;
    Ok(Json(outcome))
}

// PATCH /api/bookings/:id
pub async fn patch_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(patch): Json<BookingPatch>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(lifecycle::patch_booking(&state, id, patch, actor(&headers)?)?))
}

// POST /api/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Outcome<Booking>>, AppError> {
    let outcome = lifecycle::cancel_booking(&state, id, actor(&headers)?).await?;
    Ok(Json(outcome))
}

// DELETE /api/bookings/:id
pub async fn delete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Outcome<Booking>>, AppError> {
    let outcome = lifecycle::delete_booking(&state, id, actor(&headers)?).await?;
    Ok(Json(outcome))
}

// GET /api/resources/:id/bookings
pub async fn bookings_by_resource(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(lifecycle::bookings_by_resource(&state, id)?))
}

// GET /api/customers/:id/bookings
pub async fn bookings_by_customer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(lifecycle::bookings_by_customer(&state, id)?))
}

// GET /api/providers/:id/bookings
pub async fn bookings_by_provider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(lifecycle::bookings_by_provider(&state, id)?))
}
