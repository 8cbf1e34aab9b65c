//! Error taxonomy for the dispatch engine and its storage boundary.
//!
//! Two layers:
//!
//! - [`StoreError`]: what a storage adapter reports. A uniqueness conflict on
//!   the open-ride constraint is an ordinary, expected signal; everything else
//!   is a fault.
//! - [`DispatchError`]: what callers of the engine see. Business refusals
//!   (`NotFound`, `Forbidden`, `InvalidTransition`, `Expired`, `NotEligible`)
//!   are kept apart from `Unavailable`, which callers should retry with
//!   backoff and must never read as "no match".

use crate::identity::{RideId, UserId};
use crate::ride::RideStatus;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Errors reported by storage adapters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The driver already has an open, unexpired ride.
    ///
    /// Raised by the one-open-ride-per-driver uniqueness constraint when a
    /// concurrent assignment won the race.
    #[error("Driver {driver_id} already has an open ride")]
    OpenRideConflict {
        /// The driver that could not be bound
        driver_id: UserId,
    },

    /// Connection, pool or timeout failure.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Any other query failure.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored row could not be decoded.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether this is the expected constraint signal rather than a fault.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::OpenRideConflict { .. })
    }
}

/// Errors returned by engine operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// Referenced ride or driver does not exist.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Kind of resource ("ride", "driver")
        resource: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Actor is not allowed to perform this operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The ride's current state does not permit the transition.
    #[error("Cannot {action} a ride that is {from}")]
    InvalidTransition {
        /// Effective status at the time of the attempt
        from: RideStatus,
        /// Attempted operation
        action: &'static str,
    },

    /// The offer deadline has passed.
    #[error("Offer {ride_id} has expired")]
    Expired {
        /// The lapsed offer
        ride_id: RideId,
    },

    /// The onboarding/payment collaborator refused the driver.
    #[error("Driver {driver_id} must complete payment setup before accepting rides")]
    NotEligible {
        /// The refused driver
        driver_id: UserId,
    },

    /// Malformed request data (coordinates, fare, configuration).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage or transport fault.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl DispatchError {
    /// Shorthand for a missing ride.
    #[must_use]
    pub fn ride_not_found(ride_id: RideId) -> Self {
        Self::NotFound {
            resource: "ride",
            id: ride_id.to_string(),
        }
    }

    /// Whether the caller should retry the operation with backoff.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        match err {
            // Assignment consumes conflicts itself; anywhere else one is a
            // lost race and the caller retries.
            StoreError::OpenRideConflict { driver_id } => {
                Self::Unavailable(format!("Driver {driver_id} already has an open ride"))
            }
            StoreError::Unavailable(msg) | StoreError::Database(msg) | StoreError::Corrupt(msg) => {
                Self::Unavailable(msg)
            }
        }
    }
}
