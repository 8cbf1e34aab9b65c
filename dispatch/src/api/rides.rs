//! Ride reads and lifecycle transitions.

use crate::engine::DispatchEngine;
use crate::server::{AppError, Identity};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
};
use ride_dispatch_core::identity::RideId;
use ride_dispatch_core::ride::{Fare, Ride};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// History page size when the caller gives none.
const DEFAULT_HISTORY_LIMIT: usize = 20;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query for history endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Maximum rides to return, capped server-side
    pub limit: Option<usize>,
}

/// Optional settled fare sent with `complete`.
#[derive(Debug, Deserialize)]
pub struct FareBody {
    /// Amount in minor units
    pub amount_cents: i64,
    /// ISO-4217 code
    pub currency: String,
}

/// Body of `POST /api/rides/:id/complete`.
#[derive(Debug, Default, Deserialize)]
pub struct CompleteRequest {
    /// Settled fare, if the client knows it
    #[serde(default)]
    pub fare: Option<FareBody>,
}

impl CompleteRequest {
    /// Parse a completion body. An empty body means no fare; anything else
    /// must be valid JSON.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::bad_request`] for a body that does not parse.
    pub fn from_body(body: &[u8]) -> Result<Self, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| AppError::bad_request(format!("Invalid completion body: {e}")))
    }
}

/// The rider's current ride, if any.
#[derive(Debug, Serialize)]
pub struct ActiveRideResponse {
    /// Open ride, settled at read time
    pub ride: Option<Ride>,
}

// ============================================================================
// Reads
// ============================================================================

/// `GET /api/rides/:id`
///
/// # Errors
///
/// 404 if unknown, 403 if the caller is neither rider nor driver.
pub async fn get_ride(
    State(engine): State<Arc<DispatchEngine>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    let ride = engine
        .get_ride(identity.actor(), RideId::from_uuid(id))
        .await?;
    Ok(Json(ride))
}

/// `GET /api/rides/active`
///
/// # Errors
///
/// 503 if ride storage is down.
pub async fn active(
    State(engine): State<Arc<DispatchEngine>>,
    identity: Identity,
) -> Result<Json<ActiveRideResponse>, AppError> {
    let ride = engine.rider_active_ride(identity.user_id()).await?;
    Ok(Json(ActiveRideResponse { ride }))
}

/// `GET /api/rides/mine`
///
/// # Errors
///
/// 503 if ride storage is down.
pub async fn rider_history(
    State(engine): State<Arc<DispatchEngine>>,
    identity: Identity,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Ride>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let rides = engine.rider_history(identity.user_id(), limit).await?;
    Ok(Json(rides))
}

/// `GET /api/rides/driver`
///
/// # Errors
///
/// 503 if ride storage is down.
pub async fn driver_history(
    State(engine): State<Arc<DispatchEngine>>,
    identity: Identity,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Ride>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let rides = engine.driver_history(identity.user_id(), limit).await?;
    Ok(Json(rides))
}

// ============================================================================
// Transitions
// ============================================================================

/// `POST /api/rides/:id/accept`
///
/// # Errors
///
/// 403 for anyone but the bound driver, 410 once the offer lapsed,
/// 400 `PAYMENT_SETUP_REQUIRED` if onboarding is incomplete.
pub async fn accept(
    State(engine): State<Arc<DispatchEngine>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    let ride = engine
        .accept(identity.actor(), RideId::from_uuid(id))
        .await?;
    Ok(Json(ride))
}

/// `POST /api/rides/:id/consent`
///
/// # Errors
///
/// 403 for anyone but the rider, 409 if the driver has not accepted.
pub async fn consent(
    State(engine): State<Arc<DispatchEngine>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    let ride = engine
        .consent(identity.actor(), RideId::from_uuid(id))
        .await?;
    Ok(Json(ride))
}

/// `POST /api/rides/:id/start`
///
/// # Errors
///
/// 403 for anyone but the bound driver, 409 before rider consent.
pub async fn start(
    State(engine): State<Arc<DispatchEngine>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    let ride = engine
        .start(identity.actor(), RideId::from_uuid(id))
        .await?;
    Ok(Json(ride))
}

/// `POST /api/rides/:id/complete`
///
/// The body is optional; without it the ride completes with no fare.
///
/// # Errors
///
/// 400 for a malformed fare, 403 for anyone but the bound driver,
/// 409 unless the trip is under way.
pub async fn complete(
    State(engine): State<Arc<DispatchEngine>>,
    identity: Identity,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<Ride>, AppError> {
    let fare = CompleteRequest::from_body(&body)?
        .fare
        .map(|fare| Fare::new(fare.amount_cents, fare.currency))
        .transpose()?;

    let ride = engine
        .complete(identity.actor(), RideId::from_uuid(id), fare)
        .await?;
    Ok(Json(ride))
}
