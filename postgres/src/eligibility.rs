//! Payment setup lookups in the `drivers` table.

use crate::store_error;
use ride_dispatch_core::identity::UserId;
use ride_dispatch_core::store::{DriverEligibility, StoreFuture};
use sqlx::PgPool;

/// `PostgreSQL` [`DriverEligibility`].
///
/// A driver may accept rides once a payment link is configured and marked
/// active. Drivers with no row are not eligible.
#[derive(Clone)]
pub struct PostgresDriverEligibility {
    pool: PgPool,
}

impl PostgresDriverEligibility {
    /// Create an eligibility lookup over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DriverEligibility for PostgresDriverEligibility {
    fn is_eligible_to_accept_rides(&self, driver_id: UserId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let row: Option<(bool, Option<String>)> = sqlx::query_as(
                "SELECT payment_active, payment_link FROM drivers WHERE user_id = $1",
            )
            .bind(*driver_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error("drivers.eligibility", e))?;

            Ok(matches!(
                row,
                Some((true, Some(link))) if !link.trim().is_empty()
            ))
        })
    }
}
