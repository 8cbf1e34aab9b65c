//! Events emitted by the ride lifecycle reducer.

use chrono::{DateTime, Utc};
use ride_dispatch_core::identity::{RideId, UserId};
use ride_dispatch_core::ride::Fare;
use serde::{Deserialize, Serialize};

/// A persisted change to a ride.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RideEvent {
    /// The bound driver accepted the offer.
    DriverAccepted {
        /// Ride
        ride_id: RideId,
        /// Accepting driver
        driver_id: UserId,
        /// When
        at: DateTime<Utc>,
    },

    /// Rider consent was recorded.
    RiderConsented {
        /// Ride
        ride_id: RideId,
        /// When
        at: DateTime<Utc>,
        /// Granted by the grace period rather than by the rider
        automatic: bool,
    },

    /// The driver picked the rider up.
    TripStarted {
        /// Ride
        ride_id: RideId,
        /// When
        at: DateTime<Utc>,
    },

    /// The trip ended.
    TripCompleted {
        /// Ride
        ride_id: RideId,
        /// When
        at: DateTime<Utc>,
        /// Settled fare, if reported
        fare: Option<Fare>,
    },

    /// An unaccepted offer passed its deadline.
    OfferExpired {
        /// Ride
        ride_id: RideId,
        /// The deadline that passed
        expires_at: DateTime<Utc>,
    },
}

impl RideEvent {
    /// Transition label used in metrics.
    #[must_use]
    pub const fn transition(&self) -> &'static str {
        match self {
            Self::DriverAccepted { .. } => "accept",
            Self::RiderConsented {
                automatic: true, ..
            } => "auto_consent",
            Self::RiderConsented { .. } => "consent",
            Self::TripStarted { .. } => "start",
            Self::TripCompleted { .. } => "complete",
            Self::OfferExpired { .. } => "expire",
        }
    }

    /// The ride this event belongs to.
    #[must_use]
    pub const fn ride_id(&self) -> RideId {
        match self {
            Self::DriverAccepted { ride_id, .. }
            | Self::RiderConsented { ride_id, .. }
            | Self::TripStarted { ride_id, .. }
            | Self::TripCompleted { ride_id, .. }
            | Self::OfferExpired { ride_id, .. } => *ride_id,
        }
    }
}
