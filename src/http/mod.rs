pub mod admin;
mod auth;
mod error;
pub mod public;
mod rate_limit;

pub use error::ApiError;
pub use rate_limit::RateLimiter;

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, patch, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::engine::Engine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub admin_token: Arc<str>,
    pub rate: Arc<RateLimiter>,
    /// Skips the per-IP limiter (local development and tests).
    pub rate_limit_disabled: bool,
}

/// The full HTTP surface: public availability/booking endpoints for the
/// website, operator endpoints behind the bearer token.
pub fn router(state: AppState) -> Router {
    let bookings = Router::new()
        .route("/bookings", post(public::create_booking))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit_bookings,
        ));
    let public = Router::new()
        .route("/availability", get(public::availability))
        .merge(bookings);

    let admin = Router::new()
        .route("/vehicles", post(admin::create_vehicle).get(admin::list_vehicles))
        .route(
            "/vehicles/{id}",
            patch(admin::update_vehicle).delete(admin::remove_vehicle),
        )
        .route("/drivers", post(admin::create_driver).get(admin::list_drivers))
        .route(
            "/drivers/{id}",
            patch(admin::update_driver).delete(admin::remove_driver),
        )
        .route(
            "/bookings",
            post(admin::create_manual_booking).get(admin::list_bookings),
        )
        .route("/bookings/{id}", get(admin::get_booking))
        .route("/bookings/{id}/assign", post(admin::assign_vehicle))
        .route("/bookings/{id}/schedule", post(admin::schedule_booking))
        .route("/bookings/{id}/confirm", post(admin::confirm_booking))
        .route("/bookings/{id}/cancel", post(admin::cancel_booking))
        .route("/events", get(admin::event_feed))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    Router::new()
        .nest("/api/public", public)
        .nest("/api/admin", admin)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
