//! Reducer for the ride lifecycle.

use crate::lifecycle::{LifecycleEnvironment, ProductionLifecycleEnvironment, RideAction, RideEvent};
use chrono::{DateTime, Utc};
use ride_dispatch_core::error::DispatchError;
use ride_dispatch_core::identity::{Actor, UserId};
use ride_dispatch_core::reducer::Reducer;
use ride_dispatch_core::ride::{Ride, RideStatus};
use ride_dispatch_core::{SmallVec, smallvec};

type Events = SmallVec<[RideEvent; 2]>;

/// Reducer enforcing who may move a ride and from where.
///
/// Checks run in a fixed order and the ride is only touched once all of them
/// pass:
///
/// 1. the actor is the bound driver (or rider, for consent)
/// 2. the action was already applied: success with no events
/// 3. the offer deadline has passed: `Expired`
/// 4. the driver has not finished payment setup: `NotEligible` (accept only)
/// 5. the status does not permit the action: `InvalidTransition`
pub struct RideLifecycleReducer;

impl RideLifecycleReducer {
    /// Create a new ride lifecycle reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// When automatic consent takes effect for `ride`, if it applies at all.
    #[must_use]
    pub fn auto_consent_at(ride: &Ride, env: &impl LifecycleEnvironment) -> Option<DateTime<Utc>> {
        match (ride.status, ride.driver_accepted_at, env.consent_grace()) {
            (RideStatus::Consented, Some(accepted_at), Some(grace)) => Some(accepted_at + grace),
            _ => None,
        }
    }

    /// Whether automatic consent is due for `ride` at `now`.
    #[must_use]
    pub fn auto_consent_due(
        ride: &Ride,
        now: DateTime<Utc>,
        env: &impl LifecycleEnvironment,
    ) -> bool {
        Self::auto_consent_at(ride, env).is_some_and(|at| now >= at)
    }

    /// Whether reading `ride` at `now` should persist something first.
    #[must_use]
    pub fn pending_action(
        ride: &Ride,
        now: DateTime<Utc>,
        env: &impl LifecycleEnvironment,
    ) -> Option<RideAction> {
        if ride.is_offer_expired(now) {
            Some(RideAction::Expire)
        } else if Self::auto_consent_due(ride, now, env) {
            Some(RideAction::AutoConsent)
        } else {
            None
        }
    }
}

impl Default for RideLifecycleReducer {
    fn default() -> Self {
        Self::new()
    }
}

fn require_actor(actor: &Actor, bound: UserId, role: &str, action: &str) -> Result<(), DispatchError> {
    if actor.user_id == bound {
        Ok(())
    } else {
        Err(DispatchError::Forbidden(format!(
            "only the assigned {role} can {action} this ride"
        )))
    }
}

fn require_unexpired(ride: &Ride, now: DateTime<Utc>) -> Result<(), DispatchError> {
    if ride.status == RideStatus::Expired || ride.is_offer_expired(now) {
        Err(DispatchError::Expired { ride_id: ride.id })
    } else {
        Ok(())
    }
}

fn require_status(
    ride: &Ride,
    expected: RideStatus,
    action: &'static str,
) -> Result<(), DispatchError> {
    if ride.status == expected {
        Ok(())
    } else {
        Err(DispatchError::InvalidTransition {
            from: ride.status,
            action,
        })
    }
}

fn grant_consent(ride: &mut Ride, at: DateTime<Utc>, automatic: bool) -> RideEvent {
    ride.status = RideStatus::Enroute;
    ride.rider_consented_at = Some(at);
    RideEvent::RiderConsented {
        ride_id: ride.id,
        at,
        automatic,
    }
}

impl Reducer for RideLifecycleReducer {
    type State = Ride;
    type Action = RideAction;
    type Environment = ProductionLifecycleEnvironment;
    type Event = RideEvent;
    type Error = DispatchError;

    fn reduce(
        &self,
        ride: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Result<Events, DispatchError> {
        let now = env.clock().now();
        let name = action.name();

        match action {
            RideAction::Accept {
                actor,
                payment_ready,
            } => {
                require_actor(&actor, ride.driver_id, "driver", name)?;
                if ride.driver_accepted_at.is_some() {
                    return Ok(SmallVec::new());
                }
                require_unexpired(ride, now)?;
                if !payment_ready {
                    return Err(DispatchError::NotEligible {
                        driver_id: ride.driver_id,
                    });
                }
                require_status(ride, RideStatus::Offered, name)?;

                ride.status = RideStatus::Consented;
                ride.driver_accepted_at = Some(now);
                Ok(smallvec![RideEvent::DriverAccepted {
                    ride_id: ride.id,
                    driver_id: ride.driver_id,
                    at: now,
                }])
            }

            RideAction::Consent { actor } => {
                require_actor(&actor, ride.rider_id, "rider", name)?;
                if ride.rider_consented_at.is_some() {
                    return Ok(SmallVec::new());
                }
                require_unexpired(ride, now)?;
                require_status(ride, RideStatus::Consented, name)?;

                Ok(smallvec![grant_consent(ride, now, false)])
            }

            RideAction::Start { actor } => {
                require_actor(&actor, ride.driver_id, "driver", name)?;
                if ride.started_at.is_some() {
                    return Ok(SmallVec::new());
                }
                require_unexpired(ride, now)?;

                let mut events = Events::new();
                match Self::auto_consent_at(ride, env) {
                    Some(at) if now >= at => events.push(grant_consent(ride, at, true)),
                    _ => require_status(ride, RideStatus::Enroute, name)?,
                }

                ride.status = RideStatus::OnTrip;
                ride.started_at = Some(now);
                events.push(RideEvent::TripStarted {
                    ride_id: ride.id,
                    at: now,
                });
                Ok(events)
            }

            RideAction::Complete { actor, fare } => {
                require_actor(&actor, ride.driver_id, "driver", name)?;
                if ride.status == RideStatus::Completed {
                    return Ok(SmallVec::new());
                }
                require_unexpired(ride, now)?;
                require_status(ride, RideStatus::OnTrip, name)?;

                ride.status = RideStatus::Completed;
                ride.ended_at = Some(now);
                ride.fare.clone_from(&fare);
                Ok(smallvec![RideEvent::TripCompleted {
                    ride_id: ride.id,
                    at: now,
                    fare,
                }])
            }

            RideAction::Expire => {
                if ride.status == RideStatus::Expired {
                    return Ok(SmallVec::new());
                }
                if !ride.is_offer_expired(now) {
                    return Err(DispatchError::InvalidTransition {
                        from: ride.status,
                        action: name,
                    });
                }

                ride.status = RideStatus::Expired;
                ride.ended_at = Some(ride.expires_at);
                Ok(smallvec![RideEvent::OfferExpired {
                    ride_id: ride.id,
                    expires_at: ride.expires_at,
                }])
            }

            RideAction::AutoConsent => match Self::auto_consent_at(ride, env) {
                Some(at) if now >= at => Ok(smallvec![grant_consent(ride, at, true)]),
                _ => Ok(SmallVec::new()),
            },
        }
    }
}
