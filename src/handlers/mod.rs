pub mod bookings;
pub mod health;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/bookings", post(bookings::create_booking))
        .route("/api/bookings/multi", post(bookings::multi_slot_create))
        .route(
            "/api/bookings/:id",
            get(bookings::get_booking)
                .put(bookings::update_booking)
                .patch(bookings::patch_booking)
                .delete(bookings::delete_booking),
        )
        .route("/api/bookings/:id/cancel", post(bookings::cancel_booking))
        .route(
            "/api/resources/:id/bookings",
            get(bookings::bookings_by_resource),
        )
        .route(
            "/api/customers/:id/bookings",
            get(bookings::bookings_by_customer),
        )
        .route(
            "/api/providers/:id/bookings",
            get(bookings::bookings_by_provider),
        )
        .with_state(state)
}
