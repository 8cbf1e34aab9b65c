//! `rides` table.
//!
//! The partial unique index `rides_one_open_per_driver` is the single
//! serialization point for assignment. A bind that trips it is reported as
//! [`StoreError::OpenRideConflict`] and the transaction is rolled back.

use crate::{column, store_error};
use chrono::{DateTime, Utc};
use ride_dispatch_core::error::StoreError;
use ride_dispatch_core::geo::GeoPoint;
use ride_dispatch_core::identity::{RideId, UserId};
use ride_dispatch_core::ride::{Fare, Ride, RideStatus};
use ride_dispatch_core::store::{RideStore, StoreFuture};
use sqlx::PgPool;
use sqlx::postgres::PgRow;
use std::collections::HashSet;
use uuid::Uuid;

const RIDE_COLUMNS: &str = "id, rider_id, driver_id, pickup_lat, pickup_lng, dropoff_lat, \
     dropoff_lng, dropoff_address, status, created_at, expires_at, driver_accepted_at, \
     rider_consented_at, started_at, ended_at, fare_amount_cents, fare_currency";

/// Open rides that still hold their driver: anything but a lapsed offer.
const BLOCKING: &str = "ended_at IS NULL AND NOT (status = 'offered' AND expires_at < $2)";

/// `PostgreSQL` [`RideStore`].
#[derive(Clone)]
pub struct PostgresRideStore {
    pool: PgPool,
}

impl PostgresRideStore {
    /// Create a ride store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Result<Ride, StoreError> {
        let dropoff = match (
            column::<Option<f64>>(row, "dropoff_lat")?,
            column::<Option<f64>>(row, "dropoff_lng")?,
        ) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        };
        let fare = match (
            column::<Option<i64>>(row, "fare_amount_cents")?,
            column::<Option<String>>(row, "fare_currency")?,
        ) {
            (Some(amount_cents), Some(currency)) => Some(Fare {
                amount_cents,
                currency,
            }),
            _ => None,
        };
        let status: String = column(row, "status")?;

        Ok(Ride {
            id: RideId::from_uuid(column::<Uuid>(row, "id")?),
            rider_id: UserId::from_uuid(column::<Uuid>(row, "rider_id")?),
            driver_id: UserId::from_uuid(column::<Uuid>(row, "driver_id")?),
            pickup: GeoPoint {
                lat: column(row, "pickup_lat")?,
                lng: column(row, "pickup_lng")?,
            },
            dropoff,
            dropoff_address: column(row, "dropoff_address")?,
            status: RideStatus::parse(&status)?,
            created_at: column(row, "created_at")?,
            expires_at: column(row, "expires_at")?,
            driver_accepted_at: column(row, "driver_accepted_at")?,
            rider_consented_at: column(row, "rider_consented_at")?,
            started_at: column(row, "started_at")?,
            ended_at: column(row, "ended_at")?,
            fare,
        })
    }

    async fn fetch_rides(
        &self,
        operation: &'static str,
        sql: &str,
        owner: UserId,
        bound: RideQueryBound,
    ) -> Result<Vec<Ride>, StoreError> {
        let query = sqlx::query(sql).bind(*owner.as_uuid());
        let query = match bound {
            RideQueryBound::AsOf(as_of) => query.bind(as_of),
            RideQueryBound::Limit(limit) => query.bind(i64::try_from(limit).unwrap_or(i64::MAX)),
        };
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error(operation, e))?;

        rows.iter().map(Self::from_row).collect()
    }
}

/// Second parameter of the per-owner ride queries.
enum RideQueryBound {
    AsOf(DateTime<Utc>),
    Limit(usize),
}

impl RideStore for PostgresRideStore {
    fn insert_offer(&self, ride: Ride) -> StoreFuture<'_, Ride> {
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| store_error("rides.insert_offer", e))?;

            let released = sqlx::query(
                r"
                UPDATE rides
                SET status = 'expired', ended_at = expires_at
                WHERE driver_id = $1
                  AND ended_at IS NULL
                  AND status = 'offered'
                  AND expires_at < $2
                ",
            )
            .bind(*ride.driver_id.as_uuid())
            .bind(ride.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| store_error("rides.release_lapsed", e))?
            .rows_affected();

            if released > 0 {
                tracing::debug!(
                    driver_id = %ride.driver_id,
                    released,
                    "Released lapsed offers before bind"
                );
                metrics::counter!("dispatch_offers_expired_total").increment(released);
            }

            let inserted = sqlx::query(&format!(
                r"
                INSERT INTO rides ({RIDE_COLUMNS})
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
                "
            ))
            .bind(*ride.id.as_uuid())
            .bind(*ride.rider_id.as_uuid())
            .bind(*ride.driver_id.as_uuid())
            .bind(ride.pickup.lat)
            .bind(ride.pickup.lng)
            .bind(ride.dropoff.map(|p| p.lat))
            .bind(ride.dropoff.map(|p| p.lng))
            .bind(ride.dropoff_address.clone())
            .bind(ride.status.as_str())
            .bind(ride.created_at)
            .bind(ride.expires_at)
            .bind(ride.driver_accepted_at)
            .bind(ride.rider_consented_at)
            .bind(ride.started_at)
            .bind(ride.ended_at)
            .bind(ride.fare.as_ref().map(|f| f.amount_cents))
            .bind(ride.fare.as_ref().map(|f| f.currency.clone()))
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => {}
                Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                    // Dropping the transaction rolls back the release as well.
                    return Err(StoreError::OpenRideConflict {
                        driver_id: ride.driver_id,
                    });
                }
                Err(e) => return Err(store_error("rides.insert_offer", e)),
            }

            tx.commit()
                .await
                .map_err(|e| store_error("rides.insert_offer", e))?;

            Ok(ride)
        })
    }

    fn get(&self, ride_id: RideId) -> StoreFuture<'_, Option<Ride>> {
        Box::pin(async move {
            let row = sqlx::query(&format!("SELECT {RIDE_COLUMNS} FROM rides WHERE id = $1"))
                .bind(*ride_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| store_error("rides.get", e))?;

            row.as_ref().map(Self::from_row).transpose()
        })
    }

    fn update(&self, ride: Ride, expected: RideStatus) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE rides
                SET status = $2,
                    driver_accepted_at = $3,
                    rider_consented_at = $4,
                    started_at = $5,
                    ended_at = $6,
                    fare_amount_cents = $7,
                    fare_currency = $8
                WHERE id = $1 AND status = $9
                ",
            )
            .bind(*ride.id.as_uuid())
            .bind(ride.status.as_str())
            .bind(ride.driver_accepted_at)
            .bind(ride.rider_consented_at)
            .bind(ride.started_at)
            .bind(ride.ended_at)
            .bind(ride.fare.as_ref().map(|f| f.amount_cents))
            .bind(ride.fare.as_ref().map(|f| f.currency.clone()))
            .bind(expected.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("rides.update", e))?;

            Ok(result.rows_affected() == 1)
        })
    }

    fn busy_drivers(
        &self,
        driver_ids: Vec<UserId>,
        as_of: DateTime<Utc>,
    ) -> StoreFuture<'_, HashSet<UserId>> {
        Box::pin(async move {
            if driver_ids.is_empty() {
                return Ok(HashSet::new());
            }
            let ids: Vec<Uuid> = driver_ids.iter().map(|id| *id.as_uuid()).collect();

            let busy: Vec<Uuid> = sqlx::query_scalar(&format!(
                "SELECT DISTINCT driver_id FROM rides WHERE driver_id = ANY($1) AND {BLOCKING}"
            ))
            .bind(ids)
            .bind(as_of)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("rides.busy_drivers", e))?;

            Ok(busy.into_iter().map(UserId::from_uuid).collect())
        })
    }

    fn open_rides_for_driver(
        &self,
        driver_id: UserId,
        as_of: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<Ride>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {RIDE_COLUMNS} FROM rides WHERE driver_id = $1 AND {BLOCKING} \
                 ORDER BY created_at DESC"
            );
            self.fetch_rides(
                "rides.open_rides_for_driver",
                &sql,
                driver_id,
                RideQueryBound::AsOf(as_of),
            )
            .await
        })
    }

    fn open_ride_for_rider(
        &self,
        rider_id: UserId,
        as_of: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Ride>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {RIDE_COLUMNS} FROM rides WHERE rider_id = $1 AND {BLOCKING} \
                 ORDER BY created_at DESC LIMIT 1"
            );
            let mut rides = self
                .fetch_rides(
                    "rides.open_ride_for_rider",
                    &sql,
                    rider_id,
                    RideQueryBound::AsOf(as_of),
                )
                .await?;
            Ok(rides.pop())
        })
    }

    fn rides_for_rider(&self, rider_id: UserId, limit: usize) -> StoreFuture<'_, Vec<Ride>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {RIDE_COLUMNS} FROM rides WHERE rider_id = $1 \
                 ORDER BY created_at DESC LIMIT $2"
            );
            self.fetch_rides(
                "rides.rides_for_rider",
                &sql,
                rider_id,
                RideQueryBound::Limit(limit),
            )
            .await
        })
    }

    fn rides_for_driver(&self, driver_id: UserId, limit: usize) -> StoreFuture<'_, Vec<Ride>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {RIDE_COLUMNS} FROM rides WHERE driver_id = $1 \
                 ORDER BY created_at DESC LIMIT $2"
            );
            self.fetch_rides(
                "rides.rides_for_driver",
                &sql,
                driver_id,
                RideQueryBound::Limit(limit),
            )
            .await
        })
    }

    fn expire_offers(&self, as_of: DateTime<Utc>) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE rides
                SET status = 'expired', ended_at = expires_at
                WHERE status = 'offered'
                  AND ended_at IS NULL
                  AND expires_at < $1
                ",
            )
            .bind(as_of)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("rides.expire_offers", e))?;

            Ok(result.rows_affected())
        })
    }
}
