//! # Ride Dispatch Core
//!
//! Core traits and types for the ride matching and lifecycle engine.
//!
//! This crate holds everything the engine and its storage adapters agree on:
//!
//! - **Identity**: [`UserId`], [`RideId`], [`Role`], [`Actor`]
//! - **Geometry**: [`GeoPoint`], [`BoundingBox`]
//! - **Presence**: [`DriverPresence`], [`Heartbeat`], [`Telemetry`]
//! - **Rides**: [`Ride`], [`RideStatus`], [`Fare`]
//! - **Reducer**: Pure function `(State, Action, Environment) → Result<Events>`
//! - **Environment**: Injected dependencies via traits ([`environment::Clock`])
//! - **Storage**: [`store::PresenceStore`], [`store::RideStore`],
//!   [`store::DriverEligibility`]
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell
//! - Storage owns the one invariant that matters (one open ride per driver)
//! - Dependency Injection via Environment
//! - Typed errors at every boundary
//!
//! ## Example
//!
//! ```ignore
//! use ride_dispatch_core::reducer::Reducer;
//!
//! impl Reducer for RideLifecycleReducer {
//!     type State = Ride;
//!     type Action = RideAction;
//!     type Environment = LifecycleEnvironment;
//!     type Event = RideEvent;
//!     type Error = DispatchError;
//!
//!     fn reduce(
//!         &self,
//!         ride: &mut Ride,
//!         action: RideAction,
//!         env: &LifecycleEnvironment,
//!     ) -> Result<SmallVec<[RideEvent; 2]>, DispatchError> {
//!         // Business logic goes here
//!         Ok(SmallVec::new())
//!     }
//! }
//! ```

#![forbid(unsafe_code)]

pub mod error;
pub mod geo;
pub mod identity;
pub mod presence;
pub mod ride;
pub mod store;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use error::{DispatchError, Result, StoreError};
pub use geo::{BoundingBox, GeoPoint};
pub use identity::{Actor, RideId, Role, RoleSet, UserId};
pub use presence::{DriverPresence, Heartbeat, Telemetry};
pub use ride::{Fare, Ride, RideStatus};
pub use smallvec::{SmallVec, smallvec};

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → Result<Events>`
///
/// They contain all business logic and are deterministic and testable. The
/// imperative shell around a reducer loads the state, runs the reducer, and
/// persists the result when events were produced.
pub mod reducer {
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    /// - `Event`: Facts emitted when the action changed the state
    /// - `Error`: Why an action was refused
    ///
    /// An `Ok` result with no events means the action was accepted but the
    /// state was already where the action wanted it (idempotent retry).
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Facts describing what the action changed
        type Event;

        /// Refusal reason
        type Error;

        /// Reduce an action into state changes and events
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns the events describing the change
        ///
        /// On `Err` the state must be left untouched.
        ///
        /// # Errors
        ///
        /// Returns the reducer's error type when the action is not permitted
        /// in the current state.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Result<SmallVec<[Self::Event; 2]>, Self::Error>;
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Liveness windows and offer deadlines are always evaluated against
    /// this clock, never against the database server's `NOW()`.
    ///
    /// # Examples
    ///
    /// ```
    /// use ride_dispatch_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::environment::{Clock, SystemClock};

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
