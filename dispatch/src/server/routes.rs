//! Router configuration for the dispatch server.

use super::health::{health_check, metrics, readiness_check};
use super::state::AppState;
use crate::api::{driver, matching, rides};
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// Everything under `/api` requires the identity headers; `/health`,
/// `/ready` and `/metrics` do not.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Driver presence and offers
        .route("/driver/heartbeat", post(driver::heartbeat))
        .route("/driver/offers", get(driver::offers))
        .route("/drivers/nearby", get(driver::nearby))
        // Matching
        .route("/match/request", post(matching::request_ride))
        // Ride reads
        .route("/rides/active", get(rides::active))
        .route("/rides/mine", get(rides::rider_history))
        .route("/rides/driver", get(rides::driver_history))
        .route("/rides/:id", get(rides::get_ride))
        // Lifecycle
        .route("/rides/:id/accept", post(rides::accept))
        .route("/rides/:id/consent", post(rides::consent))
        .route("/rides/:id/start", post(rides::start))
        .route("/rides/:id/complete", post(rides::complete));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
