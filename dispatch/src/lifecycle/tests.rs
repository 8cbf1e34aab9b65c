//! Unit tests for `RideLifecycleReducer`.
//!
//! Covers every legal transition, the authorization and deadline checks that
//! guard them, idempotent retries and automatic consent.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code

use super::*;
use chrono::{DateTime, Duration, Utc};
use ride_dispatch_core::error::DispatchError;
use ride_dispatch_core::geo::GeoPoint;
use ride_dispatch_core::identity::{Actor, Role, UserId};
use ride_dispatch_core::reducer::Reducer;
use ride_dispatch_core::ride::{Fare, Ride, RideStatus};
use ride_dispatch_testing::{FixedClock, ReducerTest, assertions, test_clock};
use ride_dispatch_core::environment::Clock;
use std::sync::Arc;

fn start_time() -> DateTime<Utc> {
    test_clock().now()
}

/// Environment frozen `offset` after the offer was created.
fn env_at(offset: Duration) -> ProductionLifecycleEnvironment {
    ProductionLifecycleEnvironment::new(
        Arc::new(FixedClock::new(start_time() + offset)),
        Some(Duration::seconds(60)),
    )
}

fn env_without_grace(offset: Duration) -> ProductionLifecycleEnvironment {
    ProductionLifecycleEnvironment::new(Arc::new(FixedClock::new(start_time() + offset)), None)
}

fn offer() -> Ride {
    Ride::offer(
        UserId::new(),
        UserId::new(),
        GeoPoint { lat: 32.08, lng: 34.78 },
        None,
        None,
        start_time(),
        Duration::minutes(2),
    )
}

fn driver(ride: &Ride) -> Actor {
    Actor::driver(ride.driver_id)
}

fn rider(ride: &Ride) -> Actor {
    Actor::rider(ride.rider_id)
}

fn accept(ride: &Ride) -> RideAction {
    RideAction::Accept {
        actor: driver(ride),
        payment_ready: true,
    }
}

/// Drive a fresh offer to `status` through the reducer.
fn ride_in(status: RideStatus) -> Ride {
    let reducer = RideLifecycleReducer::new();
    let env = env_at(Duration::seconds(10));
    let mut ride = offer();
    if status == RideStatus::Offered {
        return ride;
    }
    if status == RideStatus::Expired {
        reducer
            .reduce(&mut ride, RideAction::Expire, &env_at(Duration::minutes(3)))
            .unwrap();
        return ride;
    }
    let action = accept(&ride);
    reducer.reduce(&mut ride, action, &env).unwrap();
    if status == RideStatus::Consented {
        return ride;
    }
    let consent = RideAction::Consent { actor: rider(&ride) };
    reducer.reduce(&mut ride, consent, &env).unwrap();
    if status == RideStatus::Enroute {
        return ride;
    }
    let start = RideAction::Start { actor: driver(&ride) };
    reducer.reduce(&mut ride, start, &env).unwrap();
    if status == RideStatus::OnTrip {
        return ride;
    }
    let complete = RideAction::Complete {
        actor: driver(&ride),
        fare: None,
    };
    reducer.reduce(&mut ride, complete, &env).unwrap();
    ride
}

// ============================================================================
// Happy Path
// ============================================================================

#[test]
fn accept_moves_offer_to_consented() {
    let ride = offer();
    let action = accept(&ride);

    ReducerTest::new(RideLifecycleReducer::new())
        .with_env(env_at(Duration::seconds(30)))
        .given_state(ride)
        .when_action(action)
        .then_state(|ride| {
            assert_eq!(ride.status, RideStatus::Consented);
            assert_eq!(ride.driver_accepted_at, Some(start_time() + Duration::seconds(30)));
        })
        .then_events(|events| {
            assertions::assert_events_count(events, 1);
            assert_eq!(events[0].transition(), "accept");
        })
        .run();
}

#[test]
fn full_trip_records_every_timestamp() {
    let ride = ride_in(RideStatus::Completed);

    assert_eq!(ride.status, RideStatus::Completed);
    assert!(ride.driver_accepted_at.is_some());
    assert!(ride.rider_consented_at.is_some());
    assert!(ride.started_at.is_some());
    assert!(ride.ended_at.is_some());
    assert!(!ride.is_open());
}

#[test]
fn complete_records_fare() {
    let reducer = RideLifecycleReducer::new();
    let mut ride = ride_in(RideStatus::OnTrip);
    let fare = Fare::new(4_500, "ILS").unwrap();
    let action = RideAction::Complete {
        actor: driver(&ride),
        fare: Some(fare.clone()),
    };

    let events = reducer
        .reduce(&mut ride, action, &env_at(Duration::minutes(30)))
        .unwrap();

    assert_eq!(ride.fare, Some(fare.clone()));
    assert_eq!(
        events.into_iter().next(),
        Some(RideEvent::TripCompleted {
            ride_id: ride.id,
            at: start_time() + Duration::minutes(30),
            fare: Some(fare),
        })
    );
}

// ============================================================================
// Authorization
// ============================================================================

#[test]
fn only_bound_driver_may_accept() {
    ReducerTest::new(RideLifecycleReducer::new())
        .with_env(env_at(Duration::seconds(5)))
        .given_state(offer())
        .when_action(RideAction::Accept {
            actor: Actor::driver(UserId::new()),
            payment_ready: true,
        })
        .then_error(|err| assert!(matches!(err, DispatchError::Forbidden(_))))
        .run();
}

#[test]
fn rider_may_not_perform_driver_transitions() {
    let reducer = RideLifecycleReducer::new();
    let mut ride = ride_in(RideStatus::Enroute);
    let action = RideAction::Start { actor: rider(&ride) };

    let err = reducer
        .reduce(&mut ride, action, &env_at(Duration::seconds(20)))
        .unwrap_err();
    assert!(matches!(err, DispatchError::Forbidden(_)));
}

#[test]
fn driver_may_not_consent_for_rider() {
    let reducer = RideLifecycleReducer::new();
    let mut ride = ride_in(RideStatus::Consented);
    let action = RideAction::Consent { actor: driver(&ride) };

    let err = reducer
        .reduce(&mut ride, action, &env_at(Duration::seconds(20)))
        .unwrap_err();
    assert!(matches!(err, DispatchError::Forbidden(_)));
}

#[test]
fn authorization_is_identity_not_role() {
    let reducer = RideLifecycleReducer::new();
    let mut ride = offer();
    let admin = Actor::new(UserId::new(), [Role::Admin, Role::Driver]);

    let err = reducer
        .reduce(
            &mut ride,
            RideAction::Accept {
                actor: admin,
                payment_ready: true,
            },
            &env_at(Duration::seconds(5)),
        )
        .unwrap_err();
    assert!(matches!(err, DispatchError::Forbidden(_)));
}

// ============================================================================
// Expiry
// ============================================================================

#[test]
fn accept_after_deadline_is_expired() {
    let reducer = RideLifecycleReducer::new();
    let mut ride = offer();
    let action = accept(&ride);

    let err = reducer
        .reduce(&mut ride, action, &env_at(Duration::minutes(3)))
        .unwrap_err();

    assert_eq!(err, DispatchError::Expired { ride_id: ride.id });
    assert_eq!(ride.status, RideStatus::Offered);
}

#[test]
fn accept_exactly_at_deadline_succeeds() {
    let reducer = RideLifecycleReducer::new();
    let mut ride = offer();
    let action = accept(&ride);

    reducer
        .reduce(&mut ride, action, &env_at(Duration::minutes(2)))
        .unwrap();
    assert_eq!(ride.status, RideStatus::Consented);
}

#[test]
fn expire_sets_end_marker_to_deadline() {
    let ride = ride_in(RideStatus::Expired);

    assert_eq!(ride.status, RideStatus::Expired);
    assert_eq!(ride.ended_at, Some(ride.expires_at));
}

#[test]
fn expire_before_deadline_is_refused() {
    let reducer = RideLifecycleReducer::new();
    let mut ride = offer();

    let err = reducer
        .reduce(&mut ride, RideAction::Expire, &env_at(Duration::seconds(30)))
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidTransition { .. }));
}

#[test]
fn expire_twice_is_idempotent() {
    let reducer = RideLifecycleReducer::new();
    let mut ride = ride_in(RideStatus::Expired);

    let events = reducer
        .reduce(&mut ride, RideAction::Expire, &env_at(Duration::minutes(10)))
        .unwrap();
    assert!(events.is_empty());
}

#[test]
fn accepted_ride_never_expires() {
    let reducer = RideLifecycleReducer::new();
    let mut ride = ride_in(RideStatus::Consented);

    let err = reducer
        .reduce(&mut ride, RideAction::Expire, &env_at(Duration::hours(1)))
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidTransition { .. }));
}

#[test]
fn start_on_lapsed_offer_is_expired() {
    let reducer = RideLifecycleReducer::new();
    let mut ride = offer();
    let action = RideAction::Start { actor: driver(&ride) };

    let err = reducer
        .reduce(&mut ride, action, &env_at(Duration::minutes(5)))
        .unwrap_err();
    assert!(matches!(err, DispatchError::Expired { .. }));
}

// ============================================================================
// Eligibility and Illegal Jumps
// ============================================================================

#[test]
fn accept_without_payment_setup_is_not_eligible() {
    let reducer = RideLifecycleReducer::new();
    let mut ride = offer();
    let action = RideAction::Accept {
        actor: driver(&ride),
        payment_ready: false,
    };

    let err = reducer
        .reduce(&mut ride, action, &env_at(Duration::seconds(5)))
        .unwrap_err();

    assert_eq!(
        err,
        DispatchError::NotEligible {
            driver_id: ride.driver_id
        }
    );
    assert_eq!(ride.status, RideStatus::Offered);
}

#[test]
fn start_before_consent_is_invalid_without_grace() {
    let reducer = RideLifecycleReducer::new();
    let mut ride = ride_in(RideStatus::Consented);
    let action = RideAction::Start { actor: driver(&ride) };

    let err = reducer
        .reduce(&mut ride, action, &env_without_grace(Duration::minutes(10)))
        .unwrap_err();

    assert_eq!(
        err,
        DispatchError::InvalidTransition {
            from: RideStatus::Consented,
            action: "start",
        }
    );
}

#[test]
fn complete_from_offered_is_invalid() {
    let reducer = RideLifecycleReducer::new();
    let mut ride = offer();
    let action = RideAction::Complete {
        actor: driver(&ride),
        fare: None,
    };

    let err = reducer
        .reduce(&mut ride, action, &env_at(Duration::seconds(5)))
        .unwrap_err();
    assert_eq!(
        err,
        DispatchError::InvalidTransition {
            from: RideStatus::Offered,
            action: "complete",
        }
    );
}

// ============================================================================
// Check Order
// ============================================================================

#[test]
fn stranger_is_refused_even_on_finished_ride() {
    let reducer = RideLifecycleReducer::new();
    let mut ride = ride_in(RideStatus::Completed);
    let action = RideAction::Complete {
        actor: Actor::driver(UserId::new()),
        fare: None,
    };

    let err = reducer
        .reduce(&mut ride, action, &env_at(Duration::hours(1)))
        .unwrap_err();
    assert!(matches!(err, DispatchError::Forbidden(_)));
}

#[test]
fn retry_wins_over_lapsed_deadline() {
    let reducer = RideLifecycleReducer::new();
    let mut ride = ride_in(RideStatus::Consented);
    let action = accept(&ride);

    let events = reducer
        .reduce(&mut ride, action, &env_at(Duration::minutes(10)))
        .unwrap();
    assert!(events.is_empty());
    assert_eq!(ride.status, RideStatus::Consented);
}

#[test]
fn lapsed_offer_reports_expired_before_payment_refusal() {
    let reducer = RideLifecycleReducer::new();
    let mut ride = offer();
    let action = RideAction::Accept {
        actor: driver(&ride),
        payment_ready: false,
    };

    let err = reducer
        .reduce(&mut ride, action, &env_at(Duration::minutes(3)))
        .unwrap_err();
    assert_eq!(err, DispatchError::Expired { ride_id: ride.id });
}

#[test]
fn expired_ride_reports_expired_before_invalid_transition() {
    let reducer = RideLifecycleReducer::new();
    let mut ride = ride_in(RideStatus::Expired);
    let action = RideAction::Complete {
        actor: driver(&ride),
        fare: None,
    };

    let err = reducer
        .reduce(&mut ride, action, &env_at(Duration::minutes(4)))
        .unwrap_err();
    assert_eq!(err, DispatchError::Expired { ride_id: ride.id });
}

// ============================================================================
// Idempotent Retries
// ============================================================================

#[test]
fn complete_twice_mutates_once() {
    let reducer = RideLifecycleReducer::new();
    let mut ride = ride_in(RideStatus::Completed);
    let before = ride.clone();
    let action = RideAction::Complete {
        actor: driver(&ride),
        fare: Some(Fare::new(100, "USD").unwrap()),
    };

    let events = reducer
        .reduce(&mut ride, action, &env_at(Duration::hours(2)))
        .unwrap();

    assert!(events.is_empty());
    assert_eq!(ride, before);
}

#[test]
fn repeated_accept_and_consent_are_no_ops() {
    let reducer = RideLifecycleReducer::new();
    let mut ride = ride_in(RideStatus::Enroute);
    let before = ride.clone();
    let env = env_at(Duration::minutes(1));

    let action = accept(&ride);
    assert!(reducer.reduce(&mut ride, action, &env).unwrap().is_empty());
    let consent = RideAction::Consent { actor: rider(&ride) };
    assert!(reducer.reduce(&mut ride, consent, &env).unwrap().is_empty());
    assert_eq!(ride, before);
}

// ============================================================================
// Automatic Consent
// ============================================================================

#[test]
fn auto_consent_waits_for_grace_period() {
    let reducer = RideLifecycleReducer::new();
    let mut ride = ride_in(RideStatus::Consented);
    let accepted_at = ride.driver_accepted_at.unwrap();

    let early = reducer
        .reduce(&mut ride, RideAction::AutoConsent, &env_at(Duration::seconds(30)))
        .unwrap();
    assert!(early.is_empty());
    assert_eq!(ride.status, RideStatus::Consented);

    let due = reducer
        .reduce(&mut ride, RideAction::AutoConsent, &env_at(Duration::seconds(90)))
        .unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].transition(), "auto_consent");
    assert_eq!(ride.status, RideStatus::Enroute);
    assert_eq!(ride.rider_consented_at, Some(accepted_at + Duration::seconds(60)));
}

#[test]
fn start_grants_due_consent_first() {
    let reducer = RideLifecycleReducer::new();
    let mut ride = ride_in(RideStatus::Consented);
    let action = RideAction::Start { actor: driver(&ride) };

    let events = reducer
        .reduce(&mut ride, action, &env_at(Duration::minutes(5)))
        .unwrap();

    let transitions: Vec<_> = events.iter().map(RideEvent::transition).collect();
    assert_eq!(transitions, vec!["auto_consent", "start"]);
    assert_eq!(ride.status, RideStatus::OnTrip);
}

#[test]
fn pending_action_reports_what_a_read_should_persist() {
    let ride = offer();
    let env = env_at(Duration::minutes(3));
    assert_eq!(
        RideLifecycleReducer::pending_action(&ride, env.clock().now(), &env),
        Some(RideAction::Expire)
    );

    let accepted = ride_in(RideStatus::Consented);
    let env = env_at(Duration::minutes(2));
    assert_eq!(
        RideLifecycleReducer::pending_action(&accepted, env.clock().now(), &env),
        Some(RideAction::AutoConsent)
    );

    let fresh = offer();
    let env = env_at(Duration::seconds(1));
    assert_eq!(
        RideLifecycleReducer::pending_action(&fresh, env.clock().now(), &env),
        None
    );
}
