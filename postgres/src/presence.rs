//! `driver_presence` table.

use crate::{column, store_error};
use chrono::{DateTime, Utc};
use ride_dispatch_core::error::StoreError;
use ride_dispatch_core::geo::{BoundingBox, GeoPoint};
use ride_dispatch_core::identity::UserId;
use ride_dispatch_core::presence::{DriverPresence, Heartbeat, Telemetry};
use ride_dispatch_core::store::{PresenceStore, StoreFuture};
use sqlx::PgPool;
use sqlx::postgres::PgRow;
use uuid::Uuid;

const PRESENCE_COLUMNS: &str = "driver_id, lat, lng, service, accuracy_m, speed_kmh, heading_deg, \
     device_os, app_version, battery_pct, last_seen";

/// `PostgreSQL` [`PresenceStore`].
#[derive(Clone)]
pub struct PostgresPresenceStore {
    pool: PgPool,
}

impl PostgresPresenceStore {
    /// Create a presence store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Result<DriverPresence, StoreError> {
        Ok(DriverPresence {
            driver_id: UserId::from_uuid(column::<Uuid>(row, "driver_id")?),
            location: GeoPoint {
                lat: column(row, "lat")?,
                lng: column(row, "lng")?,
            },
            telemetry: Telemetry {
                service: column(row, "service")?,
                accuracy_m: column(row, "accuracy_m")?,
                speed_kmh: column(row, "speed_kmh")?,
                heading_deg: column(row, "heading_deg")?,
                device_os: column(row, "device_os")?,
                app_version: column(row, "app_version")?,
                battery_pct: column(row, "battery_pct")?,
            },
            last_seen: column(row, "last_seen")?,
        })
    }
}

impl PresenceStore for PostgresPresenceStore {
    fn upsert(&self, heartbeat: Heartbeat) -> StoreFuture<'_, DriverPresence> {
        Box::pin(async move {
            let Heartbeat {
                driver_id,
                location,
                telemetry,
                seen_at,
            } = heartbeat;

            let row = sqlx::query(&format!(
                r"
                INSERT INTO driver_presence ({PRESENCE_COLUMNS})
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (driver_id) DO UPDATE SET
                    lat = EXCLUDED.lat,
                    lng = EXCLUDED.lng,
                    service = COALESCE(EXCLUDED.service, driver_presence.service),
                    accuracy_m = EXCLUDED.accuracy_m,
                    speed_kmh = EXCLUDED.speed_kmh,
                    heading_deg = EXCLUDED.heading_deg,
                    device_os = COALESCE(EXCLUDED.device_os, driver_presence.device_os),
                    app_version = COALESCE(EXCLUDED.app_version, driver_presence.app_version),
                    battery_pct = EXCLUDED.battery_pct,
                    last_seen = EXCLUDED.last_seen
                RETURNING {PRESENCE_COLUMNS}
                "
            ))
            .bind(*driver_id.as_uuid())
            .bind(location.lat)
            .bind(location.lng)
            .bind(telemetry.service)
            .bind(telemetry.accuracy_m)
            .bind(telemetry.speed_kmh)
            .bind(telemetry.heading_deg)
            .bind(telemetry.device_os)
            .bind(telemetry.app_version)
            .bind(telemetry.battery_pct)
            .bind(seen_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| store_error("presence.upsert", e))?;

            Self::from_row(&row)
        })
    }

    fn get(&self, driver_id: UserId) -> StoreFuture<'_, Option<DriverPresence>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {PRESENCE_COLUMNS} FROM driver_presence WHERE driver_id = $1"
            ))
            .bind(*driver_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error("presence.get", e))?;

            row.as_ref().map(Self::from_row).transpose()
        })
    }

    fn find_live_in_area(
        &self,
        area: BoundingBox,
        live_since: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<DriverPresence>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                r"
                SELECT {PRESENCE_COLUMNS}
                FROM driver_presence
                WHERE last_seen >= $1
                  AND lat BETWEEN $2 AND $3
                  AND lng BETWEEN $4 AND $5
                ORDER BY last_seen DESC
                "
            ))
            .bind(live_since)
            .bind(area.min_lat)
            .bind(area.max_lat)
            .bind(area.min_lng)
            .bind(area.max_lng)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("presence.find_live_in_area", e))?;

            rows.iter().map(Self::from_row).collect()
        })
    }

    fn count_live(
        &self,
        live_since: DateTime<Utc>,
        area: Option<BoundingBox>,
    ) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let query = match area {
                Some(area) => sqlx::query_scalar::<_, i64>(
                    r"
                    SELECT COUNT(*)
                    FROM driver_presence
                    WHERE last_seen >= $1
                      AND lat BETWEEN $2 AND $3
                      AND lng BETWEEN $4 AND $5
                    ",
                )
                .bind(live_since)
                .bind(area.min_lat)
                .bind(area.max_lat)
                .bind(area.min_lng)
                .bind(area.max_lng),
                None => sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM driver_presence WHERE last_seen >= $1",
                )
                .bind(live_since),
            };

            let count = query
                .fetch_one(&self.pool)
                .await
                .map_err(|e| store_error("presence.count_live", e))?;

            Ok(u64::try_from(count).unwrap_or(0))
        })
    }

    fn recent_live(
        &self,
        live_since: DateTime<Utc>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<DriverPresence>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                r"
                SELECT {PRESENCE_COLUMNS}
                FROM driver_presence
                WHERE last_seen >= $1
                ORDER BY last_seen DESC
                LIMIT $2
                "
            ))
            .bind(live_since)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("presence.recent_live", e))?;

            rows.iter().map(Self::from_row).collect()
        })
    }
}
