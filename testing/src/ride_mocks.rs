//! In-memory ride store and collaborator doubles.
//!
//! - [`InMemoryRideStore`]: enforces one open ride per driver under a single
//!   mutex, the same guarantee the partial unique index gives in `PostgreSQL`
//! - [`FaultyRideStore`]: injects transport faults
//! - [`GatedRideStore`]: holds binds at a barrier to force races
//! - [`StaticEligibility`]: onboarding answers configured by the test

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use chrono::{DateTime, Utc};
use ride_dispatch_core::error::StoreError;
use ride_dispatch_core::identity::{RideId, UserId};
use ride_dispatch_core::ride::{Ride, RideStatus};
use ride_dispatch_core::store::{DriverEligibility, RideStore, StoreFuture};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::Barrier;

// ============================================================================
// InMemoryRideStore
// ============================================================================

/// `HashMap`-backed [`RideStore`].
#[derive(Clone, Debug, Default)]
pub struct InMemoryRideStore {
    rides: Arc<Mutex<HashMap<RideId, Ride>>>,
}

impl InMemoryRideStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored ride, in no particular order.
    #[must_use]
    pub fn all(&self) -> Vec<Ride> {
        self.rides.lock().unwrap().values().cloned().collect()
    }

    /// Number of rides with no `ended_at` bound to `driver_id`.
    #[must_use]
    pub fn open_ride_count(&self, driver_id: UserId) -> usize {
        self.rides
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.driver_id == driver_id && r.is_open())
            .count()
    }

    /// Insert a ride without any constraint check.
    pub fn seed(&self, ride: Ride) {
        self.rides.lock().unwrap().insert(ride.id, ride);
    }

    fn newest_first(mut rides: Vec<Ride>, limit: usize) -> Vec<Ride> {
        rides.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rides.truncate(limit);
        rides
    }
}

impl RideStore for InMemoryRideStore {
    fn insert_offer(&self, ride: Ride) -> StoreFuture<'_, Ride> {
        Box::pin(async move {
            let mut rides = self.rides.lock().unwrap();

            for existing in rides
                .values_mut()
                .filter(|r| r.driver_id == ride.driver_id && r.is_open())
            {
                if existing.is_offer_expired(ride.created_at) {
                    existing.status = RideStatus::Expired;
                    existing.ended_at = Some(existing.expires_at);
                }
            }

            if rides
                .values()
                .any(|r| r.driver_id == ride.driver_id && r.is_open())
            {
                return Err(StoreError::OpenRideConflict {
                    driver_id: ride.driver_id,
                });
            }

            rides.insert(ride.id, ride.clone());
            Ok(ride)
        })
    }

    fn get(&self, ride_id: RideId) -> StoreFuture<'_, Option<Ride>> {
        Box::pin(async move { Ok(self.rides.lock().unwrap().get(&ride_id).cloned()) })
    }

    fn update(&self, ride: Ride, expected: RideStatus) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let mut rides = self.rides.lock().unwrap();
            match rides.get_mut(&ride.id) {
                Some(stored) if stored.status == expected => {
                    *stored = ride;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    fn busy_drivers(
        &self,
        driver_ids: Vec<UserId>,
        as_of: DateTime<Utc>,
    ) -> StoreFuture<'_, HashSet<UserId>> {
        Box::pin(async move {
            let wanted: HashSet<UserId> = driver_ids.into_iter().collect();
            Ok(self
                .rides
                .lock()
                .unwrap()
                .values()
                .filter(|r| wanted.contains(&r.driver_id) && r.blocks_driver(as_of))
                .map(|r| r.driver_id)
                .collect())
        })
    }

    fn open_rides_for_driver(
        &self,
        driver_id: UserId,
        as_of: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<Ride>> {
        Box::pin(async move {
            let open = self
                .rides
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.driver_id == driver_id && r.blocks_driver(as_of))
                .cloned()
                .collect();
            Ok(Self::newest_first(open, usize::MAX))
        })
    }

    fn open_ride_for_rider(
        &self,
        rider_id: UserId,
        as_of: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Ride>> {
        Box::pin(async move {
            let open = self
                .rides
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.rider_id == rider_id && r.blocks_driver(as_of))
                .cloned()
                .collect();
            Ok(Self::newest_first(open, 1).pop())
        })
    }

    fn rides_for_rider(&self, rider_id: UserId, limit: usize) -> StoreFuture<'_, Vec<Ride>> {
        Box::pin(async move {
            let mine = self
                .rides
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.rider_id == rider_id)
                .cloned()
                .collect();
            Ok(Self::newest_first(mine, limit))
        })
    }

    fn rides_for_driver(&self, driver_id: UserId, limit: usize) -> StoreFuture<'_, Vec<Ride>> {
        Box::pin(async move {
            let mine = self
                .rides
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.driver_id == driver_id)
                .cloned()
                .collect();
            Ok(Self::newest_first(mine, limit))
        })
    }

    fn expire_offers(&self, as_of: DateTime<Utc>) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let mut expired = 0;
            for ride in self
                .rides
                .lock()
                .unwrap()
                .values_mut()
                .filter(|r| r.is_open() && r.is_offer_expired(as_of))
            {
                ride.status = RideStatus::Expired;
                ride.ended_at = Some(ride.expires_at);
                expired += 1;
            }
            Ok(expired)
        })
    }
}

// ============================================================================
// FaultyRideStore
// ============================================================================

/// Wraps a [`RideStore`] and fails operations with [`StoreError::Unavailable`].
///
/// Two knobs: a number of upcoming `insert_offer` calls to fail, and a full
/// outage switch that fails every call.
#[derive(Clone)]
pub struct FaultyRideStore {
    inner: Arc<dyn RideStore>,
    failing_inserts: Arc<AtomicUsize>,
    outage: Arc<AtomicBool>,
    insert_attempts: Arc<AtomicUsize>,
}

impl FaultyRideStore {
    /// Wrap `inner` with no faults armed.
    #[must_use]
    pub fn new(inner: Arc<dyn RideStore>) -> Self {
        Self {
            inner,
            failing_inserts: Arc::new(AtomicUsize::new(0)),
            outage: Arc::new(AtomicBool::new(false)),
            insert_attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail the next `count` calls to `insert_offer`.
    pub fn fail_next_inserts(&self, count: usize) {
        self.failing_inserts.store(count, Ordering::SeqCst);
    }

    /// Fail every operation until switched off.
    pub fn set_outage(&self, down: bool) {
        self.outage.store(down, Ordering::SeqCst);
    }

    /// How many times `insert_offer` was called, failed or not.
    #[must_use]
    pub fn insert_attempts(&self) -> usize {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.outage.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn take_insert_fault(&self) -> bool {
        self.failing_inserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl RideStore for FaultyRideStore {
    fn insert_offer(&self, ride: Ride) -> StoreFuture<'_, Ride> {
        Box::pin(async move {
            self.insert_attempts.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            if self.take_insert_fault() {
                return Err(StoreError::Unavailable("pool timed out".to_string()));
            }
            self.inner.insert_offer(ride).await
        })
    }

    fn get(&self, ride_id: RideId) -> StoreFuture<'_, Option<Ride>> {
        Box::pin(async move {
            self.check()?;
            self.inner.get(ride_id).await
        })
    }

    fn update(&self, ride: Ride, expected: RideStatus) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            self.check()?;
            self.inner.update(ride, expected).await
        })
    }

    fn busy_drivers(
        &self,
        driver_ids: Vec<UserId>,
        as_of: DateTime<Utc>,
    ) -> StoreFuture<'_, HashSet<UserId>> {
        Box::pin(async move {
            self.check()?;
            self.inner.busy_drivers(driver_ids, as_of).await
        })
    }

    fn open_rides_for_driver(
        &self,
        driver_id: UserId,
        as_of: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<Ride>> {
        Box::pin(async move {
            self.check()?;
            self.inner.open_rides_for_driver(driver_id, as_of).await
        })
    }

    fn open_ride_for_rider(
        &self,
        rider_id: UserId,
        as_of: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Ride>> {
        Box::pin(async move {
            self.check()?;
            self.inner.open_ride_for_rider(rider_id, as_of).await
        })
    }

    fn rides_for_rider(&self, rider_id: UserId, limit: usize) -> StoreFuture<'_, Vec<Ride>> {
        Box::pin(async move {
            self.check()?;
            self.inner.rides_for_rider(rider_id, limit).await
        })
    }

    fn rides_for_driver(&self, driver_id: UserId, limit: usize) -> StoreFuture<'_, Vec<Ride>> {
        Box::pin(async move {
            self.check()?;
            self.inner.rides_for_driver(driver_id, limit).await
        })
    }

    fn expire_offers(&self, as_of: DateTime<Utc>) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            self.check()?;
            self.inner.expire_offers(as_of).await
        })
    }
}

// ============================================================================
// GatedRideStore
// ============================================================================

/// Wraps a [`RideStore`] so that `insert_offer` waits at a shared barrier.
///
/// With a barrier sized to the number of concurrent `assign` calls, every
/// caller finishes candidate selection before any of them binds, which makes
/// the check-then-act race deterministic.
#[derive(Clone)]
pub struct GatedRideStore {
    inner: Arc<dyn RideStore>,
    gate: Arc<Barrier>,
}

impl GatedRideStore {
    /// Hold `parties` concurrent binds until all of them arrive.
    #[must_use]
    pub fn new(inner: Arc<dyn RideStore>, parties: usize) -> Self {
        Self {
            inner,
            gate: Arc::new(Barrier::new(parties)),
        }
    }
}

impl RideStore for GatedRideStore {
    fn insert_offer(&self, ride: Ride) -> StoreFuture<'_, Ride> {
        Box::pin(async move {
            self.gate.wait().await;
            self.inner.insert_offer(ride).await
        })
    }

    fn get(&self, ride_id: RideId) -> StoreFuture<'_, Option<Ride>> {
        self.inner.get(ride_id)
    }

    fn update(&self, ride: Ride, expected: RideStatus) -> StoreFuture<'_, bool> {
        self.inner.update(ride, expected)
    }

    fn busy_drivers(
        &self,
        driver_ids: Vec<UserId>,
        as_of: DateTime<Utc>,
    ) -> StoreFuture<'_, HashSet<UserId>> {
        self.inner.busy_drivers(driver_ids, as_of)
    }

    fn open_rides_for_driver(
        &self,
        driver_id: UserId,
        as_of: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<Ride>> {
        self.inner.open_rides_for_driver(driver_id, as_of)
    }

    fn open_ride_for_rider(
        &self,
        rider_id: UserId,
        as_of: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Ride>> {
        self.inner.open_ride_for_rider(rider_id, as_of)
    }

    fn rides_for_rider(&self, rider_id: UserId, limit: usize) -> StoreFuture<'_, Vec<Ride>> {
        self.inner.rides_for_rider(rider_id, limit)
    }

    fn rides_for_driver(&self, driver_id: UserId, limit: usize) -> StoreFuture<'_, Vec<Ride>> {
        self.inner.rides_for_driver(driver_id, limit)
    }

    fn expire_offers(&self, as_of: DateTime<Utc>) -> StoreFuture<'_, u64> {
        self.inner.expire_offers(as_of)
    }
}

// ============================================================================
// StaticEligibility
// ============================================================================

/// [`DriverEligibility`] with answers set by the test.
#[derive(Clone, Debug)]
pub struct StaticEligibility {
    default: bool,
    overrides: Arc<RwLock<HashMap<UserId, bool>>>,
}

impl StaticEligibility {
    /// Every driver may accept rides.
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            default: true,
            overrides: Arc::default(),
        }
    }

    /// No driver may accept rides unless explicitly allowed.
    #[must_use]
    pub fn deny_all() -> Self {
        Self {
            default: false,
            overrides: Arc::default(),
        }
    }

    /// Override the answer for one driver.
    pub fn set(&self, driver_id: UserId, eligible: bool) {
        self.overrides.write().unwrap().insert(driver_id, eligible);
    }
}

impl DriverEligibility for StaticEligibility {
    fn is_eligible_to_accept_rides(&self, driver_id: UserId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            Ok(self
                .overrides
                .read()
                .unwrap()
                .get(&driver_id)
                .copied()
                .unwrap_or(self.default))
        })
    }
}
