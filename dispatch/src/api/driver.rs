//! Driver-facing endpoints: heartbeats, offers and the nearby diagnostic.

use crate::api::Coordinates;
use crate::diagnostics::NearbySummary;
use crate::engine::DispatchEngine;
use crate::presence::HeartbeatAck;
use crate::server::{AppError, Identity};
use axum::{
    Json,
    extract::{Query, State},
};
use ride_dispatch_core::geo::GeoPoint;
use ride_dispatch_core::presence::Telemetry;
use ride_dispatch_core::ride::Ride;
use serde::Deserialize;
use std::sync::Arc;

// ============================================================================
// Request Types
// ============================================================================

/// Heartbeat body: a position plus optional telemetry.
#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    /// Current position
    #[serde(flatten)]
    pub position: Coordinates,
    /// Device telemetry, every field optional
    #[serde(flatten)]
    pub telemetry: Telemetry,
}

/// Query for the nearby diagnostic.
#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    /// Center latitude
    pub lat: f64,
    /// Center longitude
    pub lng: f64,
    /// Rectangle half-width in degrees, clamped to `[0.01, 1.0]`
    pub half_width: Option<f64>,
    /// Rectangle half-height in degrees, clamped to `[0.01, 1.0]`
    pub half_height: Option<f64>,
}

// ============================================================================
// Handlers
// ============================================================================

/// `POST /api/driver/heartbeat`
///
/// # Errors
///
/// 400 for out-of-range coordinates, 403 if the caller is not a driver,
/// 503 if presence storage is down.
pub async fn heartbeat(
    State(engine): State<Arc<DispatchEngine>>,
    identity: Identity,
    Json(request): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatAck>, AppError> {
    let location = GeoPoint::try_from(request.position)?;
    let ack = engine
        .report_presence(identity.actor(), location, Some(request.telemetry))
        .await?;
    Ok(Json(ack))
}

/// `GET /api/driver/offers`
///
/// Open, unexpired rides bound to the calling driver.
///
/// # Errors
///
/// 503 if ride storage is down.
pub async fn offers(
    State(engine): State<Arc<DispatchEngine>>,
    identity: Identity,
) -> Result<Json<Vec<Ride>>, AppError> {
    let rides = engine.driver_offers(identity.user_id()).await?;
    Ok(Json(rides))
}

/// `GET /api/drivers/nearby`
///
/// # Errors
///
/// 400 for an out-of-range center, 503 if presence storage is down.
pub async fn nearby(
    State(engine): State<Arc<DispatchEngine>>,
    _identity: Identity,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<NearbySummary>, AppError> {
    let center = GeoPoint::new(query.lat, query.lng)?;
    let summary = engine
        .nearby(center, query.half_width, query.half_height)
        .await?;
    Ok(Json(summary))
}
