//! Storage and collaborator abstractions.
//!
//! The engine never talks to a database directly. It is handed these traits
//! as `Arc<dyn ...>` and every suspension point of a request sits behind one
//! of them.
//!
//! # Implementations
//!
//! - `PostgresPresenceStore`, `PostgresRideStore`, `PostgresDriverEligibility`
//!   (in `ride-dispatch-postgres`): production
//! - `InMemoryPresenceStore`, `InMemoryRideStore`, `StaticEligibility`
//!   (in `ride-dispatch-testing`): fast, deterministic tests
//!
//! # Dyn Compatibility
//!
//! Methods return [`StoreFuture`] instead of using `async fn` so the traits
//! stay object safe.

use crate::error::StoreError;
use crate::geo::BoundingBox;
use crate::identity::{RideId, UserId};
use crate::presence::{DriverPresence, Heartbeat};
use crate::ride::{Ride, RideStatus};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by every storage operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Latest-location store, one row per driver.
pub trait PresenceStore: Send + Sync {
    /// Insert or overwrite the driver's presence.
    ///
    /// Sticky telemetry fields are merged as described on
    /// [`crate::presence::Telemetry::merged_with`]. Returns the stored row.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] fault if the store is unavailable.
    fn upsert(&self, heartbeat: Heartbeat) -> StoreFuture<'_, DriverPresence>;

    /// Load one driver's presence, live or not.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] fault if the store is unavailable.
    fn get(&self, driver_id: UserId) -> StoreFuture<'_, Option<DriverPresence>>;

    /// Drivers seen at or after `live_since` whose location lies inside `area`,
    /// most recently seen first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] fault if the store is unavailable.
    fn find_live_in_area(
        &self,
        area: BoundingBox,
        live_since: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<DriverPresence>>;

    /// Number of drivers seen at or after `live_since`, optionally restricted
    /// to `area`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] fault if the store is unavailable.
    fn count_live(
        &self,
        live_since: DateTime<Utc>,
        area: Option<BoundingBox>,
    ) -> StoreFuture<'_, u64>;

    /// The `limit` most recently seen live drivers anywhere.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] fault if the store is unavailable.
    fn recent_live(
        &self,
        live_since: DateTime<Utc>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<DriverPresence>>;
}

/// Ride table.
///
/// The store owns the one invariant that matters: at most one ride with no
/// `ended_at` per driver. [`RideStore::insert_offer`] must enforce it
/// atomically and report a violation as [`StoreError::OpenRideConflict`].
pub trait RideStore: Send + Sync {
    /// Bind a new offer to its driver.
    ///
    /// Within the same atomic unit, any of the driver's offers that lapsed
    /// before `ride.created_at` are first marked expired (with `ended_at` set
    /// to their deadline), so an expired offer never blocks a new bind.
    ///
    /// # Errors
    ///
    /// - [`StoreError::OpenRideConflict`]: the driver still has an open ride
    /// - any other variant: storage fault
    fn insert_offer(&self, ride: Ride) -> StoreFuture<'_, Ride>;

    /// Load a ride by id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] fault if the store is unavailable.
    fn get(&self, ride_id: RideId) -> StoreFuture<'_, Option<Ride>>;

    /// Persist `ride` only if the stored status still equals `expected`.
    ///
    /// Returns `false` when another writer got there first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] fault if the store is unavailable.
    fn update(&self, ride: Ride, expected: RideStatus) -> StoreFuture<'_, bool>;

    /// Subset of `driver_ids` that are busy at `as_of`: they have an open ride
    /// that is not a lapsed offer.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] fault if the store is unavailable.
    fn busy_drivers(
        &self,
        driver_ids: Vec<UserId>,
        as_of: DateTime<Utc>,
    ) -> StoreFuture<'_, HashSet<UserId>>;

    /// The driver's open rides that are not lapsed offers, newest first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] fault if the store is unavailable.
    fn open_rides_for_driver(
        &self,
        driver_id: UserId,
        as_of: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<Ride>>;

    /// The rider's most recent open ride that is not a lapsed offer.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] fault if the store is unavailable.
    fn open_ride_for_rider(
        &self,
        rider_id: UserId,
        as_of: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Ride>>;

    /// All rides requested by the rider, newest first, at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] fault if the store is unavailable.
    fn rides_for_rider(&self, rider_id: UserId, limit: usize) -> StoreFuture<'_, Vec<Ride>>;

    /// All rides bound to the driver, newest first, at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] fault if the store is unavailable.
    fn rides_for_driver(&self, driver_id: UserId, limit: usize) -> StoreFuture<'_, Vec<Ride>>;

    /// Persist `offered → expired` for every offer whose deadline is before
    /// `as_of`, setting `ended_at` to the deadline. Returns how many rides
    /// were expired.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] fault if the store is unavailable.
    fn expire_offers(&self, as_of: DateTime<Utc>) -> StoreFuture<'_, u64>;
}

/// Driver onboarding/payment collaborator.
pub trait DriverEligibility: Send + Sync {
    /// Whether the driver has completed the setup required to accept rides.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] fault if the collaborator is unreachable.
    fn is_eligible_to_accept_rides(&self, driver_id: UserId) -> StoreFuture<'_, bool>;
}
