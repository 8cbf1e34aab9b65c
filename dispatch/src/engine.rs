//! The dispatch engine facade.
//!
//! [`DispatchEngine`] wires presence, candidate selection, assignment, the
//! lifecycle reducer and expiry together over injected stores. Every method
//! is one short-lived unit of work; the engine holds no per-ride state.

use crate::assignment::{AssignOutcome, AssignmentCoordinator, RideRequest};
use crate::candidates::{CandidateSelector, SearchPolicy, SearchTier};
use crate::config::DispatchConfig;
use crate::diagnostics::{self, NearbySummary};
use crate::expiry;
use crate::lifecycle::{ProductionLifecycleEnvironment, RideAction, RideLifecycleReducer};
use crate::metrics;
use crate::presence::{HeartbeatAck, PresenceService};
use ride_dispatch_core::environment::Clock;
use ride_dispatch_core::error::{DispatchError, Result};
use ride_dispatch_core::geo::GeoPoint;
use ride_dispatch_core::identity::{Actor, RideId, Role, UserId};
use ride_dispatch_core::presence::Telemetry;
use ride_dispatch_core::reducer::Reducer;
use ride_dispatch_core::ride::{Fare, Ride};
use ride_dispatch_core::store::{DriverEligibility, PresenceStore, RideStore};
use std::sync::Arc;

/// Conditional updates attempted before a contended transition gives up.
const MAX_UPDATE_ATTEMPTS: usize = 3;

/// History queries never return more than this many rides.
pub const MAX_HISTORY: usize = 100;

/// The storage and collaborator handles the engine runs on.
#[derive(Clone)]
pub struct Stores {
    /// Driver presence
    pub presence: Arc<dyn PresenceStore>,
    /// Rides
    pub rides: Arc<dyn RideStore>,
    /// Onboarding/payment collaborator
    pub eligibility: Arc<dyn DriverEligibility>,
}

/// Ride matching and lifecycle engine.
#[derive(Clone)]
pub struct DispatchEngine {
    presence: PresenceService,
    coordinator: AssignmentCoordinator,
    presence_store: Arc<dyn PresenceStore>,
    rides: Arc<dyn RideStore>,
    eligibility: Arc<dyn DriverEligibility>,
    clock: Arc<dyn Clock>,
    reducer: Arc<RideLifecycleReducer>,
    env: ProductionLifecycleEnvironment,
    config: DispatchConfig,
}

impl DispatchEngine {
    /// Build an engine over `stores`.
    ///
    /// `config` is expected to have passed [`DispatchConfig::validate`].
    #[must_use]
    pub fn new(stores: Stores, clock: Arc<dyn Clock>, config: DispatchConfig) -> Self {
        let Stores {
            presence,
            rides,
            eligibility,
        } = stores;

        let presence_service = PresenceService::new(
            Arc::clone(&presence),
            Arc::clone(&clock),
            config.liveness_window(),
            config.keepalive_secs,
        );
        let selector = CandidateSelector::new(
            Arc::clone(&presence),
            Arc::clone(&rides),
            Arc::clone(&clock),
            config.liveness_window(),
            SearchPolicy {
                tiers: config.search_tiers.clone(),
                max_candidates: config.max_candidates,
            },
        );
        let coordinator = AssignmentCoordinator::new(
            selector,
            Arc::clone(&rides),
            Arc::clone(&clock),
            config.offer_ttl(),
            config.max_storage_failures,
        );
        let env = ProductionLifecycleEnvironment::new(Arc::clone(&clock), config.consent_grace());

        Self {
            presence: presence_service,
            coordinator,
            presence_store: presence,
            rides,
            eligibility,
            clock,
            reducer: Arc::new(RideLifecycleReducer::new()),
            env,
            config,
        }
    }

    /// The configuration the engine was built with.
    #[must_use]
    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// The ride store, for background tasks such as the expiry sweeper.
    #[must_use]
    pub fn ride_store(&self) -> Arc<dyn RideStore> {
        Arc::clone(&self.rides)
    }

    /// The engine clock.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    // ------------------------------------------------------------------
    // Presence
    // ------------------------------------------------------------------

    /// Record a heartbeat for the acting driver.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Forbidden`]: the actor does not hold the driver role
    /// - [`DispatchError::InvalidInput`]: coordinates out of range
    /// - [`DispatchError::Unavailable`]: the presence store failed
    pub async fn report_presence(
        &self,
        actor: &Actor,
        location: GeoPoint,
        telemetry: Option<Telemetry>,
    ) -> Result<HeartbeatAck> {
        if !actor.has_role(Role::Driver) {
            return Err(DispatchError::Forbidden(
                "only drivers can report presence".to_string(),
            ));
        }
        self.presence
            .report_presence(actor.user_id, location, telemetry)
            .await
    }

    /// Whether the driver is live right now.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Unavailable`] if the presence store failed.
    pub async fn is_live(&self, driver_id: UserId) -> Result<bool> {
        self.presence.is_live(driver_id, self.clock.now()).await
    }

    // ------------------------------------------------------------------
    // Matching
    // ------------------------------------------------------------------

    /// Live, free drivers around `pickup`, most recently seen first.
    ///
    /// # Errors
    ///
    /// See [`CandidateSelector::select_candidates`].
    pub async fn select_candidates(
        &self,
        pickup: GeoPoint,
        exclude: &[UserId],
    ) -> Result<Vec<UserId>> {
        self.coordinator
            .selector()
            .select_candidates(pickup, exclude)
            .await
    }

    /// Bind one driver to `request`.
    ///
    /// # Errors
    ///
    /// See [`AssignmentCoordinator::assign`].
    pub async fn assign(&self, request: RideRequest) -> Result<AssignOutcome> {
        self.coordinator.assign(request).await
    }

    /// [`DispatchEngine::assign`] on behalf of the acting rider.
    ///
    /// # Errors
    ///
    /// See [`AssignmentCoordinator::assign`].
    pub async fn request_ride(
        &self,
        actor: &Actor,
        pickup: GeoPoint,
        dropoff: Option<GeoPoint>,
        dropoff_address: Option<String>,
    ) -> Result<AssignOutcome> {
        self.assign(RideRequest {
            rider_id: actor.user_id,
            pickup,
            dropoff,
            dropoff_address,
        })
        .await
    }

    /// Live-driver counts around a point.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidInput`]: center out of range
    /// - [`DispatchError::Unavailable`]: the presence store failed
    pub async fn nearby(
        &self,
        center: GeoPoint,
        half_width: Option<f64>,
        half_height: Option<f64>,
    ) -> Result<NearbySummary> {
        diagnostics::nearby(
            self.presence_store.as_ref(),
            center,
            half_width,
            half_height,
            self.widest_tier(),
            self.clock.now(),
            self.config.liveness_window(),
        )
        .await
        .map_err(|e| store_fault("presence.nearby", e))
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// `offered → consented`, by the bound driver.
    ///
    /// The onboarding/payment collaborator is only consulted when the ride is
    /// actually waiting for this driver's acceptance.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Forbidden`, `Expired`, `NotEligible`, `InvalidTransition`
    /// or `Unavailable`, in that order of precedence.
    pub async fn accept(&self, actor: &Actor, ride_id: RideId) -> Result<Ride> {
        let ride = self.load(ride_id).await?;

        let awaiting_acceptance = ride.driver_id == actor.user_id
            && ride.driver_accepted_at.is_none()
            && !expiry::is_expired(&ride, self.clock.now());
        let payment_ready = if awaiting_acceptance {
            self.eligibility
                .is_eligible_to_accept_rides(actor.user_id)
                .await
                .map_err(|e| {
                    metrics::record_storage_fault("drivers.eligibility");
                    DispatchError::from(e)
                })?
        } else {
            true
        };

        self.apply(
            ride,
            RideAction::Accept {
                actor: actor.clone(),
                payment_ready,
            },
        )
        .await
    }

    /// `consented → enroute`, by the bound rider.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Forbidden`, `Expired`, `InvalidTransition` or `Unavailable`.
    pub async fn consent(&self, actor: &Actor, ride_id: RideId) -> Result<Ride> {
        let ride = self.load(ride_id).await?;
        self.apply(
            ride,
            RideAction::Consent {
                actor: actor.clone(),
            },
        )
        .await
    }

    /// `enroute → ontrip`, by the bound driver.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Forbidden`, `Expired`, `InvalidTransition` or `Unavailable`.
    pub async fn start(&self, actor: &Actor, ride_id: RideId) -> Result<Ride> {
        let ride = self.load(ride_id).await?;
        self.apply(
            ride,
            RideAction::Start {
                actor: actor.clone(),
            },
        )
        .await
    }

    /// `ontrip → completed`, by the bound driver, optionally settling a fare.
    ///
    /// Completing an already completed ride succeeds without a write.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Forbidden`, `Expired`, `InvalidTransition` or `Unavailable`.
    pub async fn complete(
        &self,
        actor: &Actor,
        ride_id: RideId,
        fare: Option<Fare>,
    ) -> Result<Ride> {
        let ride = self.load(ride_id).await?;
        self.apply(
            ride,
            RideAction::Complete {
                actor: actor.clone(),
                fare,
            },
        )
        .await
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// A ride as observed now, for one of its participants or an admin.
    ///
    /// A lapsed offer reads as expired and is persisted as such; a due
    /// automatic consent is applied before returning.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Forbidden` or `Unavailable`.
    pub async fn get_ride(&self, actor: &Actor, ride_id: RideId) -> Result<Ride> {
        let ride = self.load(ride_id).await?;
        if !ride.is_participant(actor.user_id) && !actor.has_role(Role::Admin) {
            return Err(DispatchError::Forbidden(
                "only the ride's rider or driver can view it".to_string(),
            ));
        }
        self.settle(ride).await
    }

    /// The driver's current offers and active rides, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Unavailable`] if the ride store failed.
    pub async fn driver_offers(&self, driver_id: UserId) -> Result<Vec<Ride>> {
        let open = self
            .rides
            .open_rides_for_driver(driver_id, self.clock.now())
            .await
            .map_err(|e| store_fault("rides.open_rides_for_driver", e.into()))?;

        let mut settled = Vec::with_capacity(open.len());
        for ride in open {
            settled.push(self.settle(ride).await?);
        }
        Ok(settled)
    }

    /// The rider's current open ride, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Unavailable`] if the ride store failed.
    pub async fn rider_active_ride(&self, rider_id: UserId) -> Result<Option<Ride>> {
        let open = self
            .rides
            .open_ride_for_rider(rider_id, self.clock.now())
            .await
            .map_err(|e| store_fault("rides.open_ride_for_rider", e.into()))?;

        match open {
            Some(ride) => Ok(Some(self.settle(ride).await?)),
            None => Ok(None),
        }
    }

    /// The rider's rides, newest first, at most `limit` (capped at
    /// [`MAX_HISTORY`]).
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Unavailable`] if the ride store failed.
    pub async fn rider_history(&self, rider_id: UserId, limit: usize) -> Result<Vec<Ride>> {
        let rides = self
            .rides
            .rides_for_rider(rider_id, limit.min(MAX_HISTORY))
            .await
            .map_err(|e| store_fault("rides.rides_for_rider", e.into()))?;
        Ok(self.observe_all(rides))
    }

    /// The driver's rides, newest first, at most `limit` (capped at
    /// [`MAX_HISTORY`]).
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Unavailable`] if the ride store failed.
    pub async fn driver_history(&self, driver_id: UserId, limit: usize) -> Result<Vec<Ride>> {
        let rides = self
            .rides
            .rides_for_driver(driver_id, limit.min(MAX_HISTORY))
            .await
            .map_err(|e| store_fault("rides.rides_for_driver", e.into()))?;
        Ok(self.observe_all(rides))
    }

    /// Persist expiry for every lapsed offer now.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Unavailable`] if the ride store failed.
    pub async fn expire_lapsed_offers(&self) -> Result<u64> {
        expiry::sweep_once(self.rides.as_ref(), self.clock.as_ref()).await
    }

    // ------------------------------------------------------------------
    // Shell
    // ------------------------------------------------------------------

    async fn load(&self, ride_id: RideId) -> Result<Ride> {
        self.rides
            .get(ride_id)
            .await
            .map_err(|e| store_fault("rides.get", e.into()))?
            .ok_or_else(|| DispatchError::ride_not_found(ride_id))
    }

    /// Run the reducer and persist its result with a conditional update,
    /// reloading and re-running it if a concurrent writer got there first.
    async fn apply(&self, ride: Ride, action: RideAction) -> Result<Ride> {
        let ride_id = ride.id;
        let mut current = ride;

        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let prior = current.status;
            let mut next = current.clone();
            let events = self.reducer.reduce(&mut next, action.clone(), &self.env)?;

            if events.is_empty() {
                tracing::debug!(%ride_id, action = action.name(), "Already applied, nothing to write");
                return Ok(next.observed(self.clock.now()));
            }

            let written = self
                .rides
                .update(next.clone(), prior)
                .await
                .map_err(|e| store_fault("rides.update", e.into()))?;

            if written {
                for event in &events {
                    tracing::info!(
                        %ride_id,
                        transition = event.transition(),
                        from = %prior,
                        to = %next.status,
                        "Ride transition persisted"
                    );
                    metrics::record_transition(event.transition());
                }
                return Ok(next.observed(self.clock.now()));
            }

            tracing::debug!(%ride_id, attempt, "Ride changed concurrently, reloading");
            current = self.load(ride_id).await?;
        }

        tracing::warn!(%ride_id, action = action.name(), "Gave up on contended ride transition");
        Err(DispatchError::Unavailable(format!(
            "ride {ride_id} kept changing concurrently"
        )))
    }

    /// Persist whatever a read at the current time implies (expiry, automatic
    /// consent) and return the observed ride.
    ///
    /// A fault while persisting is logged and the read-time view is returned.
    async fn settle(&self, ride: Ride) -> Result<Ride> {
        let now = self.clock.now();
        let Some(action) = RideLifecycleReducer::pending_action(&ride, now, &self.env) else {
            return Ok(ride.observed(now));
        };

        let ride_id = ride.id;
        let fallback = ride.observed(now);
        match self.apply(ride, action).await {
            Ok(settled) => Ok(settled),
            // Another writer moved the ride first; report what is stored now.
            Err(DispatchError::InvalidTransition { .. }) => {
                Ok(self.load(ride_id).await?.observed(self.clock.now()))
            }
            Err(err) if err.is_retryable() => {
                tracing::warn!(%ride_id, error = %err, "Could not persist read-time transition");
                Ok(fallback)
            }
            Err(err) => Err(err),
        }
    }

    fn widest_tier(&self) -> SearchTier {
        self.config
            .search_tiers
            .last()
            .copied()
            .unwrap_or_else(|| SearchTier::new(1.0, 1.0))
    }

    fn observe_all(&self, rides: Vec<Ride>) -> Vec<Ride> {
        let now = self.clock.now();
        rides.iter().map(|r| r.observed(now)).collect()
    }
}

fn store_fault(operation: &'static str, err: DispatchError) -> DispatchError {
    if err.is_retryable() {
        tracing::warn!(operation, error = %err, "Ride store fault");
        metrics::record_storage_fault(operation);
    }
    err
}
