//! Assignment: binding exactly one driver to a ride request.
//!
//! Candidates are tried in order. Each bind is a constraint-checked insert;
//! losing the race for a driver shows up as [`StoreError::OpenRideConflict`]
//! and moves on to the next candidate. Nothing is locked in the application.

use crate::candidates::CandidateSelector;
use crate::metrics;
use chrono::Duration;
use ride_dispatch_core::environment::Clock;
use ride_dispatch_core::error::{DispatchError, Result, StoreError};
use ride_dispatch_core::geo::GeoPoint;
use ride_dispatch_core::identity::{RideId, UserId};
use ride_dispatch_core::ride::Ride;
use ride_dispatch_core::store::RideStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// A rider asking for a ride.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RideRequest {
    /// Requesting rider
    pub rider_id: UserId,
    /// Pickup location
    pub pickup: GeoPoint,
    /// Optional drop-off location
    #[serde(default)]
    pub dropoff: Option<GeoPoint>,
    /// Optional free-text drop-off address
    #[serde(default)]
    pub dropoff_address: Option<String>,
}

impl RideRequest {
    /// Request with a pickup only.
    #[must_use]
    pub const fn new(rider_id: UserId, pickup: GeoPoint) -> Self {
        Self {
            rider_id,
            pickup,
            dropoff: None,
            dropoff_address: None,
        }
    }

    /// Add a drop-off point and address.
    #[must_use]
    pub fn with_dropoff(mut self, dropoff: GeoPoint, address: Option<String>) -> Self {
        self.dropoff = Some(dropoff);
        self.dropoff_address = address;
        self
    }
}

/// Business outcome of [`AssignmentCoordinator::assign`].
///
/// Storage faults are never folded into these; they come back as
/// [`DispatchError::Unavailable`].
#[derive(Clone, Debug, PartialEq)]
pub enum AssignOutcome {
    /// An offer was bound to a driver.
    Assigned(Box<Ride>),
    /// No live, free driver was found even after widening.
    NoDriversAvailable,
    /// Every candidate was taken by a concurrent assignment.
    AllCandidatesBusy,
}

impl AssignOutcome {
    /// The bound ride, if any.
    #[must_use]
    pub fn ride(&self) -> Option<&Ride> {
        match self {
            Self::Assigned(ride) => Some(ride.as_ref()),
            Self::NoDriversAvailable | Self::AllCandidatesBusy => None,
        }
    }

    /// Id of the bound ride, if any.
    #[must_use]
    pub fn ride_id(&self) -> Option<RideId> {
        self.ride().map(|r| r.id)
    }

    /// Label used in metrics and API responses.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Assigned(_) => "assigned",
            Self::NoDriversAvailable => "no_drivers",
            Self::AllCandidatesBusy => "all_busy",
        }
    }
}

/// Binds ride requests to candidates.
#[derive(Clone)]
pub struct AssignmentCoordinator {
    selector: CandidateSelector,
    rides: Arc<dyn RideStore>,
    clock: Arc<dyn Clock>,
    offer_ttl: Duration,
    max_storage_failures: u32,
}

impl AssignmentCoordinator {
    /// Create a coordinator.
    #[must_use]
    pub fn new(
        selector: CandidateSelector,
        rides: Arc<dyn RideStore>,
        clock: Arc<dyn Clock>,
        offer_ttl: Duration,
        max_storage_failures: u32,
    ) -> Self {
        Self {
            selector,
            rides,
            clock,
            offer_ttl,
            max_storage_failures,
        }
    }

    /// The candidate selector this coordinator draws from.
    #[must_use]
    pub const fn selector(&self) -> &CandidateSelector {
        &self.selector
    }

    /// Find candidates and bind the first one that is still free.
    ///
    /// The requester is always excluded from its own candidate list. A storage
    /// fault on one candidate does not abort the attempt until
    /// `max_storage_failures` faults have been seen.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidInput`]: pickup or drop-off out of range
    /// - [`DispatchError::Unavailable`]: candidate selection failed, the fault
    ///   budget was spent, or candidates ran out with at least one fault
    pub async fn assign(&self, request: RideRequest) -> Result<AssignOutcome> {
        let started = Instant::now();
        let result = self.try_assign(request).await;

        let label = match &result {
            Ok(outcome) => outcome.as_str(),
            Err(_) => "unavailable",
        };
        metrics::record_assignment(label, started.elapsed().as_secs_f64());
        result
    }

    async fn try_assign(&self, request: RideRequest) -> Result<AssignOutcome> {
        request.pickup.validate()?;
        if let Some(dropoff) = &request.dropoff {
            dropoff.validate()?;
        }

        let candidates = self
            .selector
            .select_candidates(request.pickup, &[request.rider_id])
            .await?;

        if candidates.is_empty() {
            tracing::info!(rider_id = %request.rider_id, "No drivers nearby");
            return Ok(AssignOutcome::NoDriversAvailable);
        }

        let mut faults: u32 = 0;
        let mut last_fault: Option<StoreError> = None;

        for driver_id in &candidates {
            let offer = Ride::offer(
                request.rider_id,
                *driver_id,
                request.pickup,
                request.dropoff,
                request.dropoff_address.clone(),
                self.clock.now(),
                self.offer_ttl,
            );

            match self.rides.insert_offer(offer).await {
                Ok(ride) => {
                    tracing::info!(
                        ride_id = %ride.id,
                        rider_id = %ride.rider_id,
                        driver_id = %ride.driver_id,
                        expires_at = %ride.expires_at,
                        "Offer bound to driver"
                    );
                    return Ok(AssignOutcome::Assigned(Box::new(ride)));
                }
                Err(err) if err.is_conflict() => {
                    tracing::debug!(%driver_id, "Driver taken by concurrent assignment, trying next");
                    metrics::record_bind_conflict();
                }
                Err(err) => {
                    faults += 1;
                    tracing::warn!(
                        %driver_id,
                        error = %err,
                        faults,
                        budget = self.max_storage_failures,
                        "Storage fault while binding offer"
                    );
                    metrics::record_storage_fault("rides.insert_offer");
                    if faults >= self.max_storage_failures {
                        return Err(DispatchError::from(err));
                    }
                    last_fault = Some(err);
                }
            }
        }

        if let Some(err) = last_fault {
            // At least one candidate was never really tried.
            return Err(DispatchError::from(err));
        }

        tracing::info!(
            rider_id = %request.rider_id,
            candidates = candidates.len(),
            "All candidates became busy"
        );
        Ok(AssignOutcome::AllCandidatesBusy)
    }
}
