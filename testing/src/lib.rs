//! # Ride Dispatch Testing
//!
//! Test doubles for the ride dispatch engine.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - In-memory storage ([`InMemoryPresenceStore`], [`InMemoryRideStore`])
//! - A configurable onboarding collaborator ([`StaticEligibility`])
//! - Fault and race injection ([`FaultyRideStore`], [`GatedRideStore`])
//! - Given-When-Then reducer tests ([`ReducerTest`])
//!
//! ## Example
//!
//! ```ignore
//! use ride_dispatch_testing::{InMemoryPresenceStore, InMemoryRideStore, ManualClock, test_clock};
//!
//! #[tokio::test]
//! async fn offer_expires() {
//!     let clock = ManualClock::new(test_clock().now());
//!     let engine = test_engine(&clock);
//!     // ...
//!     clock.advance(chrono::Duration::minutes(3));
//! }
//! ```

use chrono::{DateTime, Duration, Utc};
use ride_dispatch_core::environment::Clock;

pub mod presence_mocks;
pub mod reducer_test;
pub mod ride_mocks;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Duration, Utc};
    use std::sync::{Arc, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use ride_dispatch_testing::mocks::FixedClock;
    /// use ride_dispatch_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Clock that only moves when told to.
    ///
    /// Clones share the same time, so a test can hold one handle and give
    /// another to the engine.
    ///
    /// ```
    /// use ride_dispatch_testing::mocks::ManualClock;
    /// use ride_dispatch_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = ManualClock::new(Utc::now());
    /// let engine_view = clock.clone();
    /// let before = engine_view.now();
    /// clock.advance(Duration::minutes(3));
    /// assert_eq!(engine_view.now() - before, Duration::minutes(3));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Start the clock at `time`.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Move the clock forward by `by`.
        #[allow(clippy::unwrap_used)]
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.write().unwrap();
            *time += by;
        }

        /// Jump to an absolute time.
        #[allow(clippy::unwrap_used)]
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.write().unwrap() = time;
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new(test_clock().now())
        }
    }

    impl Clock for ManualClock {
        #[allow(clippy::unwrap_used)]
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap()
        }
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, test_clock};
pub use presence_mocks::InMemoryPresenceStore;
pub use reducer_test::{ReducerTest, assertions};
pub use ride_mocks::{FaultyRideStore, GatedRideStore, InMemoryRideStore, StaticEligibility};
