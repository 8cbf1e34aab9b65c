//! Nearby-drivers diagnostic.
//!
//! Cosmetic only: counts and a nearest distance for rider UIs and operators.
//! Nothing here feeds dispatch decisions.

use crate::candidates::SearchTier;
use chrono::{DateTime, Duration, Utc};
use ride_dispatch_core::error::Result;
use ride_dispatch_core::geo::{BoundingBox, GeoPoint};
use ride_dispatch_core::presence::live_since;
use ride_dispatch_core::store::PresenceStore;
use serde::Serialize;

/// Half-size used when the caller gives none or a non-finite one.
pub const DEFAULT_HALF_SIZE: f64 = 0.2;

/// How many recent drivers are sampled for the nearest distance.
pub const NEAREST_SAMPLE: usize = 5;

/// Clamp a requested rectangle half-size to `[0.01, 1.0]`.
#[must_use]
pub fn clamp_half_size(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.clamp(0.01, 1.0),
        _ => DEFAULT_HALF_SIZE,
    }
}

/// What the nearby endpoint reports.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbySummary {
    /// Live drivers inside the requested rectangle
    pub count: u64,
    /// Live drivers anywhere
    pub recent_total: u64,
    /// Live drivers inside the widest search tier
    pub wide_count: u64,
    /// Distance to the closest of the most recently seen live drivers
    pub nearest_distance_km: Option<f64>,
    /// The requested rectangle after clamping
    pub bounds: BoundingBox,
}

/// Summarize live drivers around `center` at `now`.
///
/// `widest` is the last search tier, so `wide_count` tells an operator
/// whether a widened search would have found anyone.
///
/// # Errors
///
/// Returns a store fault converted to `DispatchError::Unavailable`.
pub async fn nearby(
    presence: &dyn PresenceStore,
    center: GeoPoint,
    half_width: Option<f64>,
    half_height: Option<f64>,
    widest: SearchTier,
    now: DateTime<Utc>,
    liveness_window: Duration,
) -> Result<NearbySummary> {
    center.validate()?;
    let since = live_since(now, liveness_window);
    let bounds = BoundingBox::around(
        center,
        clamp_half_size(half_width),
        clamp_half_size(half_height),
    );
    let wide = widest.area(center);

    let count = presence.count_live(since, Some(bounds)).await?;
    let recent_total = presence.count_live(since, None).await?;
    let wide_count = presence.count_live(since, Some(wide)).await?;

    let nearest_distance_km = presence
        .recent_live(since, NEAREST_SAMPLE)
        .await?
        .iter()
        .map(|p| center.haversine_km(&p.location))
        .min_by(f64::total_cmp);

    Ok(NearbySummary {
        count,
        recent_total,
        wide_count,
        nearest_distance_km,
        bounds,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ride_dispatch_core::environment::Clock;
    use ride_dispatch_core::identity::UserId;
    use ride_dispatch_core::presence::{DriverPresence, Telemetry};
    use ride_dispatch_testing::{InMemoryPresenceStore, test_clock};

    fn widest() -> SearchTier {
        SearchTier::new(1.0, 1.0)
    }

    #[test]
    fn half_size_is_clamped() {
        assert!((clamp_half_size(None) - 0.2).abs() < f64::EPSILON);
        assert!((clamp_half_size(Some(f64::NAN)) - 0.2).abs() < f64::EPSILON);
        assert!((clamp_half_size(Some(0.0)) - 0.01).abs() < f64::EPSILON);
        assert!((clamp_half_size(Some(5.0)) - 1.0).abs() < f64::EPSILON);
        assert!((clamp_half_size(Some(0.5)) - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn summarizes_live_drivers() {
        let now = test_clock().now();
        let store = InMemoryPresenceStore::new();
        let seed = |lat: f64, lng: f64, age: i64| {
            store.seed(DriverPresence {
                driver_id: UserId::new(),
                location: GeoPoint { lat, lng },
                telemetry: Telemetry::default(),
                last_seen: now - Duration::seconds(age),
            });
        };
        seed(32.09, 34.78, 5);
        seed(32.6, 34.78, 10);
        seed(45.0, 10.0, 15);
        seed(32.08, 34.78, 600);

        let center = GeoPoint::new(32.08, 34.78).unwrap();
        let summary = nearby(&store, center, None, None, widest(), now, Duration::minutes(2))
            .await
            .unwrap();

        assert_eq!(summary.count, 1);
        assert_eq!(summary.wide_count, 2);
        assert_eq!(summary.recent_total, 3);
        let nearest = summary.nearest_distance_km.unwrap();
        assert!(nearest > 1.0 && nearest < 1.2, "nearest was {nearest}");
    }

    #[tokio::test]
    async fn empty_area_has_no_nearest() {
        let store = InMemoryPresenceStore::new();
        let summary = nearby(
            &store,
            GeoPoint::new(0.0, 0.0).unwrap(),
            Some(0.1),
            Some(0.1),
            widest(),
            test_clock().now(),
            Duration::minutes(2),
        )
        .await
        .unwrap();

        assert_eq!(summary.count, 0);
        assert_eq!(summary.nearest_distance_km, None);
    }
}
