//! Driver presence tracking.
//!
//! Heartbeats overwrite the driver's single presence row. Liveness is never
//! stored; it is derived at read time from `last_seen` and the configured
//! window.

use crate::metrics;
use chrono::{DateTime, Duration, Utc};
use ride_dispatch_core::environment::Clock;
use ride_dispatch_core::error::{DispatchError, Result};
use ride_dispatch_core::geo::GeoPoint;
use ride_dispatch_core::identity::UserId;
use ride_dispatch_core::presence::{DriverPresence, Heartbeat, Telemetry};
use ride_dispatch_core::store::PresenceStore;
use serde::Serialize;
use std::sync::Arc;

/// Response to a heartbeat.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HeartbeatAck {
    /// Driver the heartbeat was recorded for
    pub driver_id: UserId,
    /// Recorded `last_seen`
    pub last_seen: DateTime<Utc>,
    /// Seconds until the client should report again
    pub next_heartbeat_secs: u64,
}

/// Records heartbeats and answers liveness questions.
#[derive(Clone)]
pub struct PresenceService {
    store: Arc<dyn PresenceStore>,
    clock: Arc<dyn Clock>,
    liveness_window: Duration,
    keepalive_secs: u64,
}

impl PresenceService {
    /// Create a presence service.
    #[must_use]
    pub fn new(
        store: Arc<dyn PresenceStore>,
        clock: Arc<dyn Clock>,
        liveness_window: Duration,
        keepalive_secs: u64,
    ) -> Self {
        Self {
            store,
            clock,
            liveness_window,
            keepalive_secs,
        }
    }

    /// Upsert the driver's presence with the current time.
    ///
    /// Telemetry is optional; omitted sticky fields keep their previous value.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidInput`]: coordinates out of range
    /// - [`DispatchError::Unavailable`]: the presence store failed
    pub async fn report_presence(
        &self,
        driver_id: UserId,
        location: GeoPoint,
        telemetry: Option<Telemetry>,
    ) -> Result<HeartbeatAck> {
        location.validate()?;

        let heartbeat = Heartbeat {
            driver_id,
            location,
            telemetry: telemetry.unwrap_or_default(),
            seen_at: self.clock.now(),
        };

        let stored = self.store.upsert(heartbeat).await.map_err(|e| {
            tracing::warn!(%driver_id, error = %e, "Failed to record heartbeat");
            metrics::record_storage_fault("presence.upsert");
            DispatchError::from(e)
        })?;

        metrics::record_heartbeat();
        tracing::trace!(%driver_id, lat = location.lat, lng = location.lng, "Heartbeat recorded");

        Ok(HeartbeatAck {
            driver_id,
            last_seen: stored.last_seen,
            next_heartbeat_secs: self.keepalive_secs,
        })
    }

    /// Whether the driver's last heartbeat lies within the liveness window
    /// at `as_of`. A driver with no presence row is not live.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Unavailable`] if the presence store failed.
    pub async fn is_live(&self, driver_id: UserId, as_of: DateTime<Utc>) -> Result<bool> {
        let presence = self.presence(driver_id).await?;
        Ok(presence.is_some_and(|p| p.is_live(as_of, self.liveness_window)))
    }

    /// The driver's stored presence, live or not.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Unavailable`] if the presence store failed.
    pub async fn presence(&self, driver_id: UserId) -> Result<Option<DriverPresence>> {
        self.store.get(driver_id).await.map_err(|e| {
            metrics::record_storage_fault("presence.get");
            DispatchError::from(e)
        })
    }

    /// The configured liveness window.
    #[must_use]
    pub const fn liveness_window(&self) -> Duration {
        self.liveness_window
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ride_dispatch_testing::{InMemoryPresenceStore, ManualClock};

    fn service(clock: &Arc<ManualClock>) -> PresenceService {
        PresenceService::new(
            Arc::new(InMemoryPresenceStore::new()),
            Arc::clone(clock) as Arc<dyn Clock>,
            Duration::minutes(2),
            10,
        )
    }

    #[tokio::test]
    async fn heartbeat_is_acknowledged_with_keepalive_hint() {
        let clock = Arc::new(ManualClock::default());
        let presence = service(&clock);
        let driver = UserId::new();

        let ack = presence
            .report_presence(driver, GeoPoint::new(32.08, 34.78).unwrap(), None)
            .await
            .unwrap();

        assert_eq!(ack.driver_id, driver);
        assert_eq!(ack.last_seen, clock.now());
        assert_eq!(ack.next_heartbeat_secs, 10);
    }

    #[tokio::test]
    async fn liveness_boundary_is_inclusive() {
        let clock = Arc::new(ManualClock::default());
        let presence = service(&clock);
        let driver = UserId::new();
        presence
            .report_presence(driver, GeoPoint::new(32.08, 34.78).unwrap(), None)
            .await
            .unwrap();

        let seen = clock.now();
        assert!(presence.is_live(driver, seen + Duration::minutes(2)).await.unwrap());
        assert!(
            !presence
                .is_live(driver, seen + Duration::minutes(2) + Duration::seconds(1))
                .await
                .unwrap()
        );
        assert!(!presence.is_live(UserId::new(), seen).await.unwrap());
    }

    #[tokio::test]
    async fn rejects_out_of_range_location() {
        let clock = Arc::new(ManualClock::default());
        let presence = service(&clock);

        let err = presence
            .report_presence(UserId::new(), GeoPoint { lat: 91.0, lng: 0.0 }, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidInput(_)));
    }
}
