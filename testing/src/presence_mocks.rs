//! In-memory presence store.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use chrono::{DateTime, Utc};
use ride_dispatch_core::geo::BoundingBox;
use ride_dispatch_core::identity::UserId;
use ride_dispatch_core::presence::{DriverPresence, Heartbeat};
use ride_dispatch_core::store::{PresenceStore, StoreFuture};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// `HashMap`-backed [`PresenceStore`].
///
/// # Example
///
/// ```
/// use ride_dispatch_testing::InMemoryPresenceStore;
/// use ride_dispatch_core::store::PresenceStore;
/// use ride_dispatch_core::{GeoPoint, Heartbeat, Telemetry, UserId, Utc};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryPresenceStore::new();
/// let driver_id = UserId::new();
/// store.upsert(Heartbeat {
///     driver_id,
///     location: GeoPoint::new(32.08, 34.78)?,
///     telemetry: Telemetry::default(),
///     seen_at: Utc::now(),
/// }).await?;
/// assert!(store.get(driver_id).await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryPresenceStore {
    rows: Arc<RwLock<HashMap<UserId, DriverPresence>>>,
}

impl InMemoryPresenceStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of drivers that ever reported.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().unwrap().len()
    }

    /// Whether no driver ever reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().unwrap().is_empty()
    }

    /// Overwrite a row directly, bypassing telemetry merging.
    pub fn seed(&self, presence: DriverPresence) {
        self.rows
            .write()
            .unwrap()
            .insert(presence.driver_id, presence);
    }

    fn live_sorted(
        &self,
        live_since: DateTime<Utc>,
        area: Option<BoundingBox>,
    ) -> Vec<DriverPresence> {
        let mut live: Vec<DriverPresence> = self
            .rows
            .read()
            .unwrap()
            .values()
            .filter(|p| p.last_seen >= live_since)
            .filter(|p| area.is_none_or(|a| a.contains(&p.location)))
            .cloned()
            .collect();
        live.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        live
    }
}

impl PresenceStore for InMemoryPresenceStore {
    fn upsert(&self, heartbeat: Heartbeat) -> StoreFuture<'_, DriverPresence> {
        Box::pin(async move {
            let mut rows = self.rows.write().unwrap();
            let stored = match rows.get_mut(&heartbeat.driver_id) {
                Some(existing) => {
                    existing.apply(heartbeat);
                    existing.clone()
                }
                None => {
                    let presence = DriverPresence::from_heartbeat(heartbeat);
                    rows.insert(presence.driver_id, presence.clone());
                    presence
                }
            };
            Ok(stored)
        })
    }

    fn get(&self, driver_id: UserId) -> StoreFuture<'_, Option<DriverPresence>> {
        Box::pin(async move { Ok(self.rows.read().unwrap().get(&driver_id).cloned()) })
    }

    fn find_live_in_area(
        &self,
        area: BoundingBox,
        live_since: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<DriverPresence>> {
        Box::pin(async move { Ok(self.live_sorted(live_since, Some(area))) })
    }

    fn count_live(
        &self,
        live_since: DateTime<Utc>,
        area: Option<BoundingBox>,
    ) -> StoreFuture<'_, u64> {
        Box::pin(async move { Ok(self.live_sorted(live_since, area).len() as u64) })
    }

    fn recent_live(
        &self,
        live_since: DateTime<Utc>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<DriverPresence>> {
        Box::pin(async move {
            let mut live = self.live_sorted(live_since, None);
            live.truncate(limit);
            Ok(live)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ride_dispatch_core::geo::GeoPoint;
    use ride_dispatch_core::presence::Telemetry;

    fn beat(driver_id: UserId, lat: f64, lng: f64, seen_at: DateTime<Utc>) -> Heartbeat {
        Heartbeat {
            driver_id,
            location: GeoPoint { lat, lng },
            telemetry: Telemetry::default(),
            seen_at,
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_single_row() {
        let store = InMemoryPresenceStore::new();
        let driver_id = UserId::new();
        let now = Utc::now();

        store.upsert(beat(driver_id, 32.0, 34.0, now)).await.unwrap();
        store
            .upsert(beat(driver_id, 32.1, 34.1, now + Duration::seconds(5)))
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        let row = store.get(driver_id).await.unwrap().unwrap();
        assert!((row.location.lat - 32.1).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn live_queries_filter_and_order_by_recency() {
        let store = InMemoryPresenceStore::new();
        let now = Utc::now();
        let older = UserId::new();
        let newer = UserId::new();
        let stale = UserId::new();
        let far = UserId::new();

        store.upsert(beat(older, 32.08, 34.78, now - Duration::seconds(30))).await.unwrap();
        store.upsert(beat(newer, 32.09, 34.79, now - Duration::seconds(5))).await.unwrap();
        store.upsert(beat(stale, 32.08, 34.78, now - Duration::minutes(5))).await.unwrap();
        store.upsert(beat(far, 40.0, 10.0, now)).await.unwrap();

        let area = BoundingBox::around(GeoPoint { lat: 32.08, lng: 34.78 }, 0.2, 0.2);
        let since = now - Duration::minutes(2);

        let found = store.find_live_in_area(area, since).await.unwrap();
        let ids: Vec<UserId> = found.iter().map(|p| p.driver_id).collect();
        assert_eq!(ids, vec![newer, older]);

        assert_eq!(store.count_live(since, None).await.unwrap(), 3);
        assert_eq!(store.count_live(since, Some(area)).await.unwrap(), 2);

        let recent = store.recent_live(since, 1).await.unwrap();
        assert_eq!(recent[0].driver_id, far);
    }
}
