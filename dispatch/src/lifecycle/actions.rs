//! Actions accepted by the ride lifecycle reducer.

use ride_dispatch_core::identity::Actor;
use ride_dispatch_core::ride::Fare;

/// A requested change to one ride.
#[derive(Clone, Debug, PartialEq)]
pub enum RideAction {
    /// `offered → consented`, by the bound driver.
    Accept {
        /// Who is accepting
        actor: Actor,
        /// Answer from the onboarding/payment collaborator
        payment_ready: bool,
    },

    /// `consented → enroute`, by the bound rider.
    Consent {
        /// Who is consenting
        actor: Actor,
    },

    /// `enroute → ontrip`, by the bound driver.
    Start {
        /// Who is starting the trip
        actor: Actor,
    },

    /// `ontrip → completed`, by the bound driver.
    Complete {
        /// Who is completing the trip
        actor: Actor,
        /// Settled fare, if reported
        fare: Option<Fare>,
    },

    /// Persist `offered → expired` for a lapsed offer.
    Expire,

    /// Grant rider consent once the grace period after acceptance has passed.
    AutoConsent,
}

impl RideAction {
    /// Operation name used in errors and logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Accept { .. } => "accept",
            Self::Consent { .. } => "consent",
            Self::Start { .. } => "start",
            Self::Complete { .. } => "complete",
            Self::Expire => "expire",
            Self::AutoConsent => "auto_consent",
        }
    }
}
