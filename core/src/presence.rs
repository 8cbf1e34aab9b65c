//! Driver presence: the latest known location and liveness per driver.
//!
//! Presence is current state, not history. Every heartbeat overwrites the
//! previous row for that driver and staleness is decided at query time.

use crate::geo::GeoPoint;
use crate::identity::UserId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Optional device telemetry carried by a heartbeat.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Service type offered by the driver (e.g. "taxi", "van")
    pub service: Option<String>,
    /// GPS accuracy in metres
    pub accuracy_m: Option<f64>,
    /// Ground speed in km/h
    pub speed_kmh: Option<f64>,
    /// Heading in degrees from north
    pub heading_deg: Option<f64>,
    /// Client operating system
    pub device_os: Option<String>,
    /// Client application version
    pub app_version: Option<String>,
    /// Battery level, 0..=100
    pub battery_pct: Option<f64>,
}

impl Telemetry {
    /// Merge a newer report over this one.
    ///
    /// `service`, `device_os` and `app_version` are sticky: an omitted value
    /// keeps the previous one. Sensor readings are always replaced.
    #[must_use]
    pub fn merged_with(&self, newer: Telemetry) -> Self {
        Self {
            service: newer.service.or_else(|| self.service.clone()),
            accuracy_m: newer.accuracy_m,
            speed_kmh: newer.speed_kmh,
            heading_deg: newer.heading_deg,
            device_os: newer.device_os.or_else(|| self.device_os.clone()),
            app_version: newer.app_version.or_else(|| self.app_version.clone()),
            battery_pct: newer.battery_pct,
        }
    }
}

/// A single location report from a driver client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Reporting driver
    pub driver_id: UserId,
    /// Reported position
    pub location: GeoPoint,
    /// Optional telemetry
    pub telemetry: Telemetry,
    /// When the engine received the report
    pub seen_at: DateTime<Utc>,
}

/// Latest known presence of one driver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DriverPresence {
    /// Driver identity (one row per driver)
    pub driver_id: UserId,
    /// Last reported position
    pub location: GeoPoint,
    /// Last reported telemetry, after merging
    pub telemetry: Telemetry,
    /// Timestamp of the last heartbeat
    pub last_seen: DateTime<Utc>,
}

impl DriverPresence {
    /// Presence created by a driver's first heartbeat.
    #[must_use]
    pub fn from_heartbeat(heartbeat: Heartbeat) -> Self {
        Self {
            driver_id: heartbeat.driver_id,
            location: heartbeat.location,
            telemetry: heartbeat.telemetry,
            last_seen: heartbeat.seen_at,
        }
    }

    /// Overwrite this presence with a newer heartbeat.
    pub fn apply(&mut self, heartbeat: Heartbeat) {
        self.location = heartbeat.location;
        self.telemetry = self.telemetry.merged_with(heartbeat.telemetry);
        self.last_seen = heartbeat.seen_at;
    }

    /// `as_of - last_seen <= window`.
    #[must_use]
    pub fn is_live(&self, as_of: DateTime<Utc>, window: Duration) -> bool {
        as_of - self.last_seen <= window
    }
}

/// Oldest `last_seen` that still counts as live at `as_of`.
#[must_use]
pub fn live_since(as_of: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    as_of - window
}
