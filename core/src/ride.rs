//! The ride record and its status.
//!
//! A ride is created in the `offered` state bound to exactly one driver and is
//! never deleted; `ended_at` is the terminal marker. While `ended_at` is unset
//! the ride is *open*, and at most one open ride may exist per driver.

use crate::error::{DispatchError, StoreError};
use crate::geo::GeoPoint;
use crate::identity::{RideId, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a ride.
///
/// ```text
/// offered → consented → enroute → onTrip → completed
/// offered → expired
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RideStatus {
    /// Bound to a driver, awaiting the driver's acceptance
    Offered,
    /// Driver accepted, awaiting rider consent
    Consented,
    /// Rider consented, driver on the way to pickup
    Enroute,
    /// Rider picked up
    #[serde(rename = "ontrip")]
    OnTrip,
    /// Trip finished
    Completed,
    /// Offer deadline passed without acceptance
    Expired,
}

impl RideStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Offered => "offered",
            Self::Consented => "consented",
            Self::Enroute => "enroute",
            Self::OnTrip => "ontrip",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }

    /// Parse status from database string.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if the string doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "offered" => Ok(Self::Offered),
            "consented" => Ok(Self::Consented),
            "enroute" => Ok(Self::Enroute),
            "ontrip" => Ok(Self::OnTrip),
            "completed" => Ok(Self::Completed),
            "expired" => Ok(Self::Expired),
            _ => Err(StoreError::Corrupt(format!("Invalid ride status: {s}"))),
        }
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Expired)
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fare settled by the driver at completion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fare {
    /// Amount in minor units (agorot, cents)
    pub amount_cents: i64,
    /// ISO 4217 currency code
    pub currency: String,
}

impl Fare {
    /// Create a validated fare.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidInput`] for a negative amount or a
    /// currency that is not three uppercase ASCII letters.
    pub fn new(amount_cents: i64, currency: impl Into<String>) -> Result<Self, DispatchError> {
        let currency = currency.into();
        if amount_cents < 0 {
            return Err(DispatchError::InvalidInput(format!(
                "fare amount must not be negative: {amount_cents}"
            )));
        }
        if currency.len() != 3 || !currency.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(DispatchError::InvalidInput(format!(
                "currency must be a 3-letter ISO code: {currency}"
            )));
        }
        Ok(Self {
            amount_cents,
            currency,
        })
    }
}

/// A ride from offer to completion or expiry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    /// Ride identity
    pub id: RideId,
    /// Requesting rider
    pub rider_id: UserId,
    /// Bound driver (assignment happens at creation)
    pub driver_id: UserId,
    /// Pickup location
    pub pickup: GeoPoint,
    /// Optional drop-off location
    pub dropoff: Option<GeoPoint>,
    /// Optional free-text drop-off address
    pub dropoff_address: Option<String>,
    /// Stored status (see [`Ride::effective_status`] for the read-time view)
    pub status: RideStatus,
    /// When the offer was created
    pub created_at: DateTime<Utc>,
    /// Offer acceptance deadline
    pub expires_at: DateTime<Utc>,
    /// When the driver accepted
    pub driver_accepted_at: Option<DateTime<Utc>>,
    /// When the rider consented (or consent was granted automatically)
    pub rider_consented_at: Option<DateTime<Utc>>,
    /// When the trip started
    pub started_at: Option<DateTime<Utc>>,
    /// Terminal marker; `None` while the ride is open
    pub ended_at: Option<DateTime<Utc>>,
    /// Settled fare, if the driver reported one
    pub fare: Option<Fare>,
}

impl Ride {
    /// Create a new offer bound to `driver_id`, expiring `ttl` after `created_at`.
    #[must_use]
    pub fn offer(
        rider_id: UserId,
        driver_id: UserId,
        pickup: GeoPoint,
        dropoff: Option<GeoPoint>,
        dropoff_address: Option<String>,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: RideId::new(),
            rider_id,
            driver_id,
            pickup,
            dropoff,
            dropoff_address,
            status: RideStatus::Offered,
            created_at,
            expires_at: created_at + ttl,
            driver_accepted_at: None,
            rider_consented_at: None,
            started_at: None,
            ended_at: None,
            fare: None,
        }
    }

    /// Whether the ride has no end marker yet.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Whether this is an unaccepted offer past its deadline at `now`.
    #[must_use]
    pub fn is_offer_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == RideStatus::Offered && now > self.expires_at
    }

    /// Status as observed at `now`: a lapsed offer reads as `Expired` even if
    /// no sweep has persisted that yet.
    #[must_use]
    pub fn effective_status(&self, now: DateTime<Utc>) -> RideStatus {
        if self.is_offer_expired(now) {
            RideStatus::Expired
        } else {
            self.status
        }
    }

    /// Whether this ride makes its driver busy at `now`.
    ///
    /// Lapsed offers never do, even before they are swept.
    #[must_use]
    pub fn blocks_driver(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && !self.is_offer_expired(now)
    }

    /// Copy of the ride with the read-time status applied.
    #[must_use]
    pub fn observed(&self, now: DateTime<Utc>) -> Self {
        let mut view = self.clone();
        view.status = self.effective_status(now);
        view
    }

    /// Whether `user_id` is the bound rider or driver.
    #[must_use]
    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.rider_id == user_id || self.driver_id == user_id
    }
}
