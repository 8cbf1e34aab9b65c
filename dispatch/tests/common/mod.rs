//! Shared fixtures for dispatch integration tests.

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use ride_dispatch::{DispatchConfig, DispatchEngine, Stores};
use ride_dispatch_core::environment::Clock;
use ride_dispatch_core::geo::GeoPoint;
use ride_dispatch_core::identity::{Actor, UserId};
use ride_dispatch_core::ride::Ride;
use ride_dispatch_core::store::{DriverEligibility, PresenceStore, RideStore};
use ride_dispatch_testing::{
    InMemoryPresenceStore, InMemoryRideStore, ManualClock, StaticEligibility,
};
use std::sync::Arc;

/// An engine over in-memory stores and a manual clock.
pub struct World {
    pub engine: Arc<DispatchEngine>,
    pub clock: Arc<ManualClock>,
    pub rides: Arc<InMemoryRideStore>,
    pub presence: Arc<InMemoryPresenceStore>,
    pub eligibility: Arc<StaticEligibility>,
}

impl World {
    pub fn new() -> Self {
        let rides = Arc::new(InMemoryRideStore::new());
        Self::with_ride_store(Arc::clone(&rides) as Arc<dyn RideStore>, rides)
    }

    /// Run the engine on `store`, which must ultimately write to `rides`.
    pub fn with_ride_store(store: Arc<dyn RideStore>, rides: Arc<InMemoryRideStore>) -> Self {
        let clock = Arc::new(ManualClock::default());
        let presence = Arc::new(InMemoryPresenceStore::new());
        let eligibility = Arc::new(StaticEligibility::allow_all());
        let engine = DispatchEngine::new(
            Stores {
                presence: Arc::clone(&presence) as Arc<dyn PresenceStore>,
                rides: store,
                eligibility: Arc::clone(&eligibility) as Arc<dyn DriverEligibility>,
            },
            Arc::clone(&clock) as Arc<dyn Clock>,
            DispatchConfig::default(),
        );
        Self {
            engine: Arc::new(engine),
            clock,
            rides,
            presence,
            eligibility,
        }
    }

    /// A driver that has just sent a heartbeat from `at`.
    pub async fn live_driver(&self, at: GeoPoint) -> Actor {
        let driver = Actor::driver(UserId::new());
        self.engine
            .report_presence(&driver, at, None)
            .await
            .expect("heartbeat should be recorded");
        driver
    }

    /// Request a ride for a fresh rider and expect an offer.
    pub async fn offer(&self, pickup: GeoPoint) -> (Actor, Ride) {
        let rider = Actor::rider(UserId::new());
        let outcome = self
            .engine
            .request_ride(&rider, pickup, None, None)
            .await
            .expect("assign should not fail");
        let ride = outcome.ride().expect("a driver should be bound").clone();
        (rider, ride)
    }
}

pub fn tel_aviv() -> GeoPoint {
    GeoPoint::new(32.08, 34.78).unwrap()
}
