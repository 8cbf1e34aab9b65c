//! `PostgreSQL` storage for the ride dispatch engine.
//!
//! This crate implements the storage traits from `ride-dispatch-core` on top of
//! sqlx:
//!
//! - [`PostgresPresenceStore`]: `driver_presence` upserts and live queries
//! - [`PostgresRideStore`]: the `rides` table, guarded by the partial unique
//!   index `rides_one_open_per_driver`
//! - [`PostgresDriverEligibility`]: payment setup lookups in `drivers`
//!
//! Timestamps are always bound from the engine's clock. Queries never call
//! `NOW()`, so the liveness window and offer deadlines are evaluated in one
//! place.
//!
//! # Example
//!
//! ```no_run
//! use ride_dispatch_postgres::{MIGRATOR, PostgresPresenceStore, PostgresRideStore};
//! use sqlx::PgPool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = PgPool::connect("postgres://localhost/ride_dispatch").await?;
//! MIGRATOR.run(&pool).await?;
//! let presence = PostgresPresenceStore::new(pool.clone());
//! let rides = PostgresRideStore::new(pool);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod eligibility;
mod presence;
mod rides;

pub use eligibility::PostgresDriverEligibility;
pub use presence::PostgresPresenceStore;
pub use rides::PostgresRideStore;

use ride_dispatch_core::error::StoreError;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgRow;
use sqlx::Row;

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Classify a sqlx error.
///
/// Connection-level failures become [`StoreError::Unavailable`] so the engine
/// can tell them apart from query errors.
pub(crate) fn store_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => {
            tracing::warn!(operation, error = %err, "Database unreachable");
            StoreError::Unavailable(format!("{operation}: {err}"))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(format!("{operation}: {err}"))
        }
        other => StoreError::Database(format!("{operation}: {other}")),
    }
}

/// Read one column, reporting decode failures as corrupt rows.
pub(crate) fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get::<T, _>(name)
        .map_err(|e| StoreError::Corrupt(format!("column {name}: {e}")))
}
