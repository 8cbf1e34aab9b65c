//! Offer expiry.
//!
//! Expiry is evaluated lazily on every read and transition through
//! [`is_expired`]. The [`ExpirySweeper`] additionally persists
//! `offered → expired` in the background so history queries see the final
//! status and drivers are released without waiting for the next bind.

use crate::metrics;
use chrono::{DateTime, Utc};
use ride_dispatch_core::environment::Clock;
use ride_dispatch_core::error::{DispatchError, Result};
use ride_dispatch_core::ride::Ride;
use ride_dispatch_core::store::RideStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// `ride.status == offered && now > ride.expires_at`.
#[must_use]
pub fn is_expired(ride: &Ride, now: DateTime<Utc>) -> bool {
    ride.is_offer_expired(now)
}

/// Periodically persists expiry for lapsed offers.
pub struct ExpirySweeper {
    rides: Arc<dyn RideStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl ExpirySweeper {
    /// Create a sweeper running every `interval` until `shutdown` fires.
    #[must_use]
    pub fn new(
        rides: Arc<dyn RideStore>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            rides,
            clock,
            interval,
            shutdown,
        }
    }

    /// Spawn the sweeper as a background task.
    ///
    /// A failed sweep is logged and retried on the next tick.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        info!(interval = ?self.interval, "Offer expiry sweeper started");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!("Offer expiry sweeper received shutdown signal");
                    break;
                }
                () = tokio::time::sleep(self.interval) => {
                    if let Err(e) = sweep_once(self.rides.as_ref(), self.clock.as_ref()).await {
                        warn!(error = %e, "Offer expiry sweep failed, retrying next tick");
                    }
                }
            }
        }

        info!("Offer expiry sweeper stopped");
    }
}

/// Expire every offer that lapsed before the clock's current time.
///
/// # Errors
///
/// Returns [`DispatchError::Unavailable`] if the ride store failed.
pub async fn sweep_once(rides: &dyn RideStore, clock: &dyn Clock) -> Result<u64> {
    let expired = rides.expire_offers(clock.now()).await.map_err(|e| {
        metrics::record_storage_fault("rides.expire_offers");
        DispatchError::from(e)
    })?;

    if expired > 0 {
        info!(expired, "Expired lapsed offers");
        metrics::record_offers_expired(expired);
    }
    Ok(expired)
}
