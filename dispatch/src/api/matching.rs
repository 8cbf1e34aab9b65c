//! Ride request endpoint.

use crate::api::Coordinates;
use crate::assignment::AssignOutcome;
use crate::diagnostics::NearbySummary;
use crate::engine::DispatchEngine;
use crate::server::{AppError, Identity};
use axum::{Json, extract::State};
use ride_dispatch_core::geo::GeoPoint;
use ride_dispatch_core::ride::Ride;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of `POST /api/match/request`.
#[derive(Debug, Deserialize)]
pub struct MatchRequest {
    /// Where the rider is waiting
    pub pickup: Coordinates,
    /// Optional destination
    #[serde(default)]
    pub dropoff: Option<Coordinates>,
    /// Optional free-text destination
    #[serde(default)]
    pub dropoff_address: Option<String>,
}

/// Result of a ride request.
///
/// "No driver" outcomes are a 200 with `ok: false`; only faults are errors.
#[derive(Debug, Serialize)]
pub struct MatchResponse {
    /// Whether a driver was bound
    pub ok: bool,
    /// `assigned`, `no_drivers` or `all_busy`
    pub outcome: &'static str,
    /// Human-readable explanation when nothing was bound
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    /// The new offer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ride: Option<Ride>,
    /// Live drivers around the pickup, when nothing was bound
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<NearbySummary>,
}

impl From<AssignOutcome> for MatchResponse {
    fn from(outcome: AssignOutcome) -> Self {
        let label = outcome.as_str();
        match outcome {
            AssignOutcome::Assigned(ride) => Self {
                ok: true,
                outcome: label,
                message: None,
                ride: Some(*ride),
                debug: None,
            },
            AssignOutcome::NoDriversAvailable => Self {
                ok: false,
                outcome: label,
                message: Some("No drivers nearby"),
                ride: None,
                debug: None,
            },
            AssignOutcome::AllCandidatesBusy => Self {
                ok: false,
                outcome: label,
                message: Some("All nearby drivers became busy"),
                ride: None,
                debug: None,
            },
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// `POST /api/match/request`
///
/// # Errors
///
/// 400 for out-of-range coordinates, 503 if storage failed during the
/// search or bind. An unmatched request carries a `debug` summary of live
/// drivers around the pickup.
pub async fn request_ride(
    State(engine): State<Arc<DispatchEngine>>,
    identity: Identity,
    Json(request): Json<MatchRequest>,
) -> Result<Json<MatchResponse>, AppError> {
    let pickup = GeoPoint::try_from(request.pickup)?;
    let dropoff = request.dropoff.map(GeoPoint::try_from).transpose()?;

    let outcome = engine
        .request_ride(identity.actor(), pickup, dropoff, request.dropoff_address)
        .await?;

    let mut response = MatchResponse::from(outcome);
    if !response.ok {
        // The outcome stands even if the summary cannot be built.
        match engine.nearby(pickup, None, None).await {
            Ok(summary) => response.debug = Some(summary),
            Err(e) => warn!(error = %e, "Nearby summary unavailable for unmatched request"),
        }
    }
    Ok(Json(response))
}
